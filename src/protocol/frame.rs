//! Frame wrapping and unwrapping.
//!
//! A [`Frame`] is the delimited, still-stuffed unit seen on the wire.
//! Uses `bytes::Bytes` so frames can be handed between tasks without copying.
//!
//! # Example
//!
//! ```
//! use plantmon_link::protocol::{checksum, unwrap_frame, wrap_frame};
//!
//! let mut msg = vec![0x02, 0, 0, 0, 1];
//! msg.push(checksum(&msg));
//!
//! let wire = wrap_frame(&msg);
//! assert_eq!(wire[0], 0x7E);
//! assert_eq!(*wire.last().unwrap(), 0x7F);
//! assert_eq!(&unwrap_frame(&wire).unwrap()[..], &msg[..]);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{checksum, is_reserved, stuff, unstuff, EOP, SOP};
use crate::error::FrameError;

/// A complete wire frame, SOP and EOP included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Wrap raw wire bytes. No validation happens until [`Frame::decode`].
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    /// Create a frame from a slice (copies data).
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(bytes),
        }
    }

    /// Full wire representation.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the frame, returning its wire bytes.
    #[inline]
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Length on the wire.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check whether the frame holds no bytes at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Strip markers, unstuff and verify the checksum.
    pub fn decode(&self) -> Result<Bytes, FrameError> {
        unwrap_frame(&self.bytes)
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Stuff an unframed message and add the SOP/EOP markers.
pub fn wrap_frame(unframed: &[u8]) -> Bytes {
    let reserved = unframed.iter().filter(|&&b| is_reserved(b)).count();
    let mut out = BytesMut::with_capacity(unframed.len() + reserved + 2);
    out.put_u8(SOP);
    out.put_slice(&stuff(unframed));
    out.put_u8(EOP);
    out.freeze()
}

/// Validate a complete frame and return its unstuffed contents.
///
/// Checks, in order: leading SOP, trailing EOP, stuffing, checksum.
pub fn unwrap_frame(frame: &[u8]) -> Result<Bytes, FrameError> {
    match frame.first() {
        Some(&SOP) => {}
        _ => return Err(FrameError::MissingStart),
    }
    if frame.len() < 2 || frame[frame.len() - 1] != EOP {
        return Err(FrameError::MissingEnd);
    }

    let message = unstuff(&frame[1..frame.len() - 1])?;

    let residue = checksum(&message);
    if residue != 0 {
        return Err(FrameError::ChecksumMismatch { residue });
    }

    Ok(message)
}
