//! Message layout, building and payload interpretation.
//!
//! Unstuffed layout:
//! ```text
//! ┌────┬────────────────┬─────────────────────┬──────────┐
//! │ id │ payload_length │ fields              │ checksum │
//! │ 1  │ 4              │ payload_length - 1  │ 1        │
//! └────┴────────────────┴─────────────────────┴──────────┘
//! ```
//!
//! `payload_length` counts the fields plus the checksum byte.

use bytes::{BufMut, Bytes, BytesMut};

use super::frame::{unwrap_frame, wrap_frame};
use super::message_id::{MessageId, ReadingKind, Sensor, STATUS_REQUEST, WIFI_CONNECT_REQUEST};
use super::wire_format::{checksum, ByteOrder, CHECKSUM_SIZE, HEADER_SIZE, MIN_MESSAGE_SIZE};
use crate::error::{LinkError, Result};

/// A decoded message. Checksum-validated when built by [`Message::from_frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Raw id byte.
    pub id: u8,
    /// Declared length of fields plus checksum.
    pub payload_length: u32,
    /// Type-specific fields.
    pub payload: Bytes,
    /// Trailing checksum byte.
    pub checksum: u8,
    raw: Bytes,
}

impl Message {
    /// Check the layout of an unstuffed message.
    ///
    /// The checksum is not verified here; [`Message::from_frame`] is the
    /// validating entry point for bytes taken off the wire.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::Protocol` if the message is shorter than the
    /// fixed header or the declared length disagrees with the byte count.
    pub fn decode(raw: Bytes, order: ByteOrder) -> Result<Self> {
        if raw.len() < MIN_MESSAGE_SIZE {
            return Err(LinkError::Protocol(format!(
                "Message of {} bytes is shorter than the {} byte minimum",
                raw.len(),
                MIN_MESSAGE_SIZE
            )));
        }

        let payload_length = order
            .read_u32(&raw[1..HEADER_SIZE])
            .ok_or_else(|| LinkError::Protocol("Truncated length field".to_string()))?;
        let actual = raw.len() - HEADER_SIZE;
        if payload_length as usize != actual {
            return Err(LinkError::Protocol(format!(
                "Declared payload length {} but {} bytes follow the header",
                payload_length, actual
            )));
        }

        let end = raw.len() - CHECKSUM_SIZE;
        Ok(Self {
            id: raw[0],
            payload_length,
            payload: raw.slice(HEADER_SIZE..end),
            checksum: raw[end],
            raw,
        })
    }

    /// Unwrap a wire frame and decode the message inside it.
    pub fn from_frame(frame: &[u8], order: ByteOrder) -> Result<Self> {
        let raw = unwrap_frame(frame)?;
        Self::decode(raw, order)
    }

    /// Resolve the id byte.
    #[inline]
    pub fn kind(&self) -> MessageId {
        MessageId::from_code(self.id)
    }

    /// The complete unstuffed message, id through checksum.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Cheap clone of the complete unstuffed message.
    #[inline]
    pub fn raw(&self) -> Bytes {
        self.raw.clone()
    }
}

/// Builds outbound messages in a fixed byte order.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageBuilder {
    order: ByteOrder,
}

impl MessageBuilder {
    /// Create a builder using `order` for every length field.
    pub fn new(order: ByteOrder) -> Self {
        Self { order }
    }

    /// Byte order in use.
    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Lay out `id | payload_length | fields | checksum` without framing.
    pub fn encode(&self, id: u8, fields: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(MIN_MESSAGE_SIZE + fields.len());
        buf.put_u8(id);
        self.order
            .put_u32(&mut buf, (fields.len() + CHECKSUM_SIZE) as u32);
        buf.put_slice(fields);
        let sum = checksum(&buf);
        buf.put_u8(sum);
        buf.freeze()
    }

    /// Encode and wrap into a wire frame.
    pub fn frame(&self, id: u8, fields: &[u8]) -> Bytes {
        wrap_frame(&self.encode(id, fields))
    }

    /// Wi-Fi credential submission, ready for the wire.
    ///
    /// Fields: `ssid_len(4) | password_len(4) | ssid | password`, lengths in
    /// UTF-8 bytes.
    pub fn wifi_connect(&self, ssid: &str, password: &str) -> Bytes {
        let mut fields = BytesMut::with_capacity(8 + ssid.len() + password.len());
        self.order.put_u32(&mut fields, ssid.len() as u32);
        self.order.put_u32(&mut fields, password.len() as u32);
        fields.put_slice(ssid.as_bytes());
        fields.put_slice(password.as_bytes());
        self.frame(WIFI_CONNECT_REQUEST, &fields)
    }

    /// Status request (no fields), ready for the wire.
    pub fn status_request(&self) -> Bytes {
        self.frame(STATUS_REQUEST, &[])
    }
}

/// Credentials carried by a Wi-Fi connect request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

impl WifiCredentials {
    /// Parse the fields of a Wi-Fi connect request.
    pub fn decode(message: &Message, order: ByteOrder) -> Result<Self> {
        if message.kind() != MessageId::WifiConnectRequest {
            return Err(LinkError::Protocol(format!(
                "Expected Wi-Fi connect request, got {}",
                message.kind()
            )));
        }

        let p = &message.payload;
        let ssid_len = order.read_u32(p);
        let password_len = p.get(4..).and_then(|rest| order.read_u32(rest));
        let (ssid_len, password_len) = match (ssid_len, password_len) {
            (Some(s), Some(w)) => (s as usize, w as usize),
            _ => {
                return Err(LinkError::Protocol(
                    "Wi-Fi request too short for length fields".to_string(),
                ))
            }
        };

        let body = &p[8..];
        if body.len() != ssid_len + password_len {
            return Err(LinkError::Protocol(format!(
                "Wi-Fi lengths {} + {} do not match {} credential bytes",
                ssid_len,
                password_len,
                body.len()
            )));
        }

        let (ssid, password) = body.split_at(ssid_len);
        let text = |bytes: &[u8]| {
            String::from_utf8(bytes.to_vec())
                .map_err(|e| LinkError::Protocol(format!("Credential is not UTF-8: {}", e)))
        };

        Ok(Self {
            ssid: text(ssid)?,
            password: text(password)?,
        })
    }
}

/// Device answer to a status request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectStatus {
    /// Whether the device reports an active Wi-Fi connection, if it said.
    pub wifi_connected: Option<bool>,
}

impl ConnectStatus {
    /// Read the status flag from a connect-status response.
    pub fn decode(message: &Message) -> Result<Self> {
        if message.kind() != MessageId::ConnectStatusResponse {
            return Err(LinkError::Protocol(format!(
                "Expected connect status response, got {}",
                message.kind()
            )));
        }
        Ok(Self {
            wifi_connected: message.payload.first().map(|&flag| flag == 1),
        })
    }
}

/// Value carried by a sensor message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorValue {
    Float(f32),
    Integer(i16),
}

impl SensorValue {
    /// Value widened to `f64` for display.
    pub fn as_f64(self) -> f64 {
        match self {
            SensorValue::Float(v) => f64::from(v),
            SensorValue::Integer(v) => f64::from(v),
        }
    }
}

/// A sensor value with the sensor and reading kind it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub sensor: Sensor,
    pub kind: ReadingKind,
    pub value: SensorValue,
}

impl SensorReading {
    /// Interpret a sensor message.
    ///
    /// Soil-moisture channel 2 reports a raw `i16`; every other sensor
    /// reports an `f32`. The value sits at the start of the fields.
    pub fn decode(message: &Message, order: ByteOrder) -> Result<Self> {
        let (sensor, kind) = match message.kind() {
            MessageId::Reading(sensor, kind) => (sensor, kind),
            other => {
                return Err(LinkError::Protocol(format!(
                    "{} does not carry a sensor reading",
                    other
                )))
            }
        };

        let value = match sensor {
            Sensor::SoilMoisture2 => order.read_i16(&message.payload).map(SensorValue::Integer),
            _ => order.read_f32(&message.payload).map(SensorValue::Float),
        }
        .ok_or_else(|| {
            LinkError::Protocol(format!(
                "{} payload of {} bytes is too short",
                message.kind(),
                message.payload.len()
            ))
        })?;

        Ok(Self {
            sensor,
            kind,
            value,
        })
    }
}
