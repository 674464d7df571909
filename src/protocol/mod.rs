//! Protocol module - wire format, framing, and message types.
//!
//! This module implements the device link protocol:
//! - Byte-stuffing and the two's-complement checksum
//! - SOP/EOP frame wrapping and validation
//! - Frame buffer for reassembling frames from a byte stream
//! - Message layout, ids and payload interpretation

mod frame;
mod frame_buffer;
mod message;
mod message_id;
mod wire_format;

pub use frame::{unwrap_frame, wrap_frame, Frame};
pub use frame_buffer::{FrameBuffer, ReassemblyState, DEFAULT_MAX_FRAME_SIZE};
pub use message::{
    ConnectStatus, Message, MessageBuilder, SensorReading, SensorValue, WifiCredentials,
};
pub use message_id::{
    MessageId, ReadingKind, Sensor, CONNECT_STATUS_RESPONSE, STATUS_REQUEST,
    WIFI_CONNECT_REQUEST,
};
pub use wire_format::{
    checksum, is_reserved, stuff, unstuff, verify_checksum, ByteOrder, CHECKSUM_SIZE, EOP,
    EOP_STUFF, ESCAPE, ESCAPE_STUFF, HEADER_SIZE, MIN_MESSAGE_SIZE, SOP, SOP_STUFF,
};
