//! Application-side view of forwarded messages.

use tokio::sync::broadcast::{self, error::RecvError};

use crate::protocol::{ByteOrder, Message, SensorReading};

/// Receives forwarded messages and interprets sensor payloads.
///
/// A slow observer never stalls the reader: when it falls more than the
/// channel capacity behind, the oldest messages are skipped and counted.
pub struct ReadingObserver {
    rx: broadcast::Receiver<Message>,
    order: ByteOrder,
    skipped: u64,
}

impl ReadingObserver {
    /// Wrap a receiver obtained from a dispatcher or session.
    pub fn new(rx: broadcast::Receiver<Message>, order: ByteOrder) -> Self {
        Self {
            rx,
            order,
            skipped: 0,
        }
    }

    /// Next forwarded message. `None` once the connection is gone.
    pub async fn next_message(&mut self) -> Option<Message> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(n)) => {
                    self.skipped += n;
                    tracing::warn!("Observer lagged, skipped {} messages", n);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next message that decodes as a sensor reading.
    ///
    /// Messages whose payload does not fit their id are logged and skipped.
    pub async fn next_reading(&mut self) -> Option<SensorReading> {
        loop {
            let message = self.next_message().await?;
            match SensorReading::decode(&message, self.order) {
                Ok(reading) => return Some(reading),
                Err(e) => tracing::warn!("Skipping undecodable reading: {}", e),
            }
        }
    }

    /// Messages lost to lag so far.
    #[inline]
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MessageBuilder, ReadingKind, Sensor, SensorValue};

    fn message(id: u8, fields: &[u8]) -> Message {
        let raw = MessageBuilder::default().encode(id, fields);
        Message::decode(raw, ByteOrder::BigEndian).unwrap()
    }

    #[tokio::test]
    async fn test_next_reading_decodes() {
        let (tx, rx) = broadcast::channel(4);
        let mut observer = ReadingObserver::new(rx, ByteOrder::BigEndian);

        tx.send(message(29, &61.5f32.to_be_bytes())).unwrap();

        let reading = observer.next_reading().await.unwrap();
        assert_eq!(reading.sensor, Sensor::Humidity);
        assert_eq!(reading.kind, ReadingKind::Live);
        assert_eq!(reading.value, SensorValue::Float(61.5));
    }

    #[tokio::test]
    async fn test_value_order_independent_of_framing() {
        // Lengths framed big-endian, value sent little-endian.
        let (tx, rx) = broadcast::channel(4);
        let mut observer = ReadingObserver::new(rx, ByteOrder::LittleEndian);

        tx.send(message(25, &21.5f32.to_le_bytes())).unwrap();

        let reading = observer.next_reading().await.unwrap();
        assert_eq!(reading.value, SensorValue::Float(21.5));
    }

    #[tokio::test]
    async fn test_next_reading_skips_short_payload() {
        let (tx, rx) = broadcast::channel(4);
        let mut observer = ReadingObserver::new(rx, ByteOrder::BigEndian);

        tx.send(message(25, &[1])).unwrap();
        tx.send(message(41, &[0x01, 0x00])).unwrap();

        let reading = observer.next_reading().await.unwrap();
        assert_eq!(reading.value, SensorValue::Integer(256));
    }

    #[tokio::test]
    async fn test_closed_channel_ends_stream() {
        let (tx, rx) = broadcast::channel::<Message>(4);
        let mut observer = ReadingObserver::new(rx, ByteOrder::BigEndian);
        drop(tx);
        assert!(observer.next_message().await.is_none());
    }

    #[tokio::test]
    async fn test_lag_drops_oldest() {
        let (tx, rx) = broadcast::channel(2);
        let mut observer = ReadingObserver::new(rx, ByteOrder::BigEndian);

        for code in [25u8, 26, 27, 29] {
            tx.send(message(code, &[0; 4])).unwrap();
        }

        let first = observer.next_message().await.unwrap();
        assert_eq!(first.id, 27);
        assert_eq!(observer.skipped(), 2);
    }
}
