//! Routing of decoded messages.
//!
//! The dispatcher owns no transport state. It turns raw frames into
//! [`Message`]s and decides, per id, whether the message updates liveness,
//! goes to observers, or is dropped.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::error::Result;
use crate::protocol::{ByteOrder, ConnectStatus, Message, MessageId, Sensor};
use crate::state::{ConnectionContext, LivenessState};

/// Default capacity of the observer channel.
pub const DEFAULT_OBSERVER_CAPACITY: usize = 256;

/// What happened to a dispatched message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Status response recorded in the connection context.
    Liveness,
    /// Sent to observers. `receivers` is 0 when nobody is subscribed.
    Forwarded { receivers: usize },
    /// Known id the client does not act on.
    Ignored(MessageId),
    /// Id with no known meaning.
    Unhandled(u8),
}

/// Routes messages for one connection.
pub struct Dispatcher {
    context: Arc<ConnectionContext>,
    observers: broadcast::Sender<Message>,
    order: ByteOrder,
}

impl Dispatcher {
    /// Create a dispatcher with its own observer channel.
    pub fn new(context: Arc<ConnectionContext>, order: ByteOrder, capacity: usize) -> Self {
        let (observers, _) = broadcast::channel(capacity.max(1));
        Self::with_sender(context, order, observers)
    }

    /// Create a dispatcher publishing to an existing observer channel.
    pub fn with_sender(
        context: Arc<ConnectionContext>,
        order: ByteOrder,
        observers: broadcast::Sender<Message>,
    ) -> Self {
        Self {
            context,
            observers,
            order,
        }
    }

    /// Subscribe to forwarded messages.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.observers.subscribe()
    }

    /// Byte order used to decode messages.
    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Unwrap, decode and dispatch one complete wire frame.
    ///
    /// # Errors
    ///
    /// Returns the framing or layout error for a frame that must be
    /// dropped. Nothing has been dispatched in that case.
    pub fn dispatch_frame(&self, frame: &[u8]) -> Result<Dispatch> {
        let message = Message::from_frame(frame, self.order)?;
        Ok(self.dispatch(message))
    }

    /// Route a validated message.
    pub fn dispatch(&self, message: Message) -> Dispatch {
        let id = message.kind();

        match id {
            MessageId::ConnectStatusResponse => {
                if let Ok(ConnectStatus {
                    wifi_connected: Some(connected),
                }) = ConnectStatus::decode(&message)
                {
                    self.context.set_device_wifi(connected);
                }
                self.context.set_liveness(LivenessState::ResponseReceived);
                Dispatch::Liveness
            }

            MessageId::Reading(
                Sensor::Temperature | Sensor::Humidity | Sensor::SoilMoisture1 | Sensor::SoilMoisture2,
                _,
            ) => {
                // send only fails when there are no receivers
                let receivers = self.observers.send(message).unwrap_or(0);
                if receivers == 0 {
                    tracing::trace!("No observers for {}", id);
                }
                Dispatch::Forwarded { receivers }
            }

            MessageId::Unhandled(code) => {
                tracing::debug!("Dropping message with unknown id {}", code);
                Dispatch::Unhandled(code)
            }

            other => {
                tracing::debug!("Ignoring {}", other);
                Dispatch::Ignored(other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FrameError, LinkError};
    use crate::protocol::{MessageBuilder, ReadingKind};

    fn setup() -> (Dispatcher, Arc<ConnectionContext>) {
        let ctx = Arc::new(ConnectionContext::new());
        let dispatcher = Dispatcher::new(ctx.clone(), ByteOrder::BigEndian, 16);
        (dispatcher, ctx)
    }

    fn frame(id: u8, fields: &[u8]) -> Vec<u8> {
        MessageBuilder::default().frame(id, fields).to_vec()
    }

    #[test]
    fn test_little_endian_dispatcher() {
        let ctx = Arc::new(ConnectionContext::new());
        let dispatcher = Dispatcher::new(ctx, ByteOrder::LittleEndian, 4);
        assert_eq!(dispatcher.byte_order(), ByteOrder::LittleEndian);

        // Length field in little-endian order: 5 bytes of fields + checksum.
        let wire = MessageBuilder::new(ByteOrder::LittleEndian).frame(25, &[0; 4]);
        assert_eq!(
            dispatcher.dispatch_frame(&wire).unwrap(),
            Dispatch::Forwarded { receivers: 0 }
        );

        let big = MessageBuilder::default().frame(25, &[0; 4]);
        assert!(matches!(
            dispatcher.dispatch_frame(&big),
            Err(LinkError::Protocol(_))
        ));
    }

    #[test]
    fn test_status_response_sets_liveness() {
        let (dispatcher, ctx) = setup();
        ctx.set_liveness(LivenessState::AwaitingResponse);

        let outcome = dispatcher.dispatch_frame(&frame(5, &[1])).unwrap();

        assert_eq!(outcome, Dispatch::Liveness);
        assert_eq!(ctx.liveness(), LivenessState::ResponseReceived);
        assert_eq!(ctx.device_wifi(), Some(true));
    }

    #[test]
    fn test_status_response_without_flag() {
        let (dispatcher, ctx) = setup();

        dispatcher.dispatch_frame(&frame(5, &[])).unwrap();

        assert_eq!(ctx.liveness(), LivenessState::ResponseReceived);
        assert_eq!(ctx.device_wifi(), None);
    }

    #[test]
    fn test_status_response_not_forwarded() {
        let (dispatcher, _ctx) = setup();
        let mut rx = dispatcher.subscribe();

        dispatcher.dispatch_frame(&frame(5, &[0])).unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_sensor_readings_forwarded_in_order() {
        let (dispatcher, _ctx) = setup();
        let mut rx = dispatcher.subscribe();

        for code in [25u8, 26, 27, 29, 37, 41, 48, 53, 59] {
            let outcome = dispatcher.dispatch_frame(&frame(code, &[0; 4])).unwrap();
            assert_eq!(outcome, Dispatch::Forwarded { receivers: 1 });
        }

        let received: Vec<u8> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|m| m.id)
            .collect();
        assert_eq!(received, vec![25, 26, 27, 29, 37, 41, 48, 53, 59]);
    }

    #[test]
    fn test_forwarded_message_is_complete() {
        let (dispatcher, _ctx) = setup();
        let mut rx = dispatcher.subscribe();

        let wire = frame(25, &21.0f32.to_be_bytes());
        dispatcher.dispatch_frame(&wire).unwrap();

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.kind(), MessageId::Reading(Sensor::Temperature, ReadingKind::Live));
        assert_eq!(msg.as_bytes()[0], 25);
        assert_eq!(msg.payload.len(), 4);
    }

    #[test]
    fn test_forward_without_observers() {
        let (dispatcher, _ctx) = setup();
        let outcome = dispatcher.dispatch_frame(&frame(29, &[0; 4])).unwrap();
        assert_eq!(outcome, Dispatch::Forwarded { receivers: 0 });
    }

    #[test]
    fn test_known_ids_ignored() {
        let (dispatcher, ctx) = setup();
        let mut rx = dispatcher.subscribe();

        for code in [20u8, 23, 24, 33, 44, 46, 47] {
            let outcome = dispatcher.dispatch_frame(&frame(code, &[0; 4])).unwrap();
            assert_eq!(outcome, Dispatch::Ignored(MessageId::from_code(code)));
        }

        assert!(rx.try_recv().is_err());
        assert_eq!(ctx.liveness(), LivenessState::NoResponse);
    }

    #[test]
    fn test_unknown_id_is_unhandled() {
        let (dispatcher, _ctx) = setup();
        let outcome = dispatcher.dispatch_frame(&frame(200, &[])).unwrap();
        assert_eq!(outcome, Dispatch::Unhandled(200));
    }

    #[test]
    fn test_corrupt_frame_is_error() {
        let (dispatcher, ctx) = setup();
        let mut wire = frame(5, &[1]);
        wire[2] ^= 0x01;

        let err = dispatcher.dispatch_frame(&wire).unwrap_err();
        assert!(matches!(
            err,
            LinkError::Frame(FrameError::ChecksumMismatch { .. })
        ));
        assert_eq!(ctx.liveness(), LivenessState::NoResponse);
    }
}
