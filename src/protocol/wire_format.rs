//! Wire format: reserved bytes, byte-stuffing and checksums.
//!
//! Every message travels as:
//! ```text
//! ┌─────┬──────────────────────────────────────────────────┬─────┐
//! │ SOP │ stuffed( id | length | fields ... | checksum )   │ EOP │
//! │0x7E │ 1 byte  4 bytes   variable        1 byte         │0x7F │
//! └─────┴──────────────────────────────────────────────────┴─────┘
//! ```
//!
//! Inside the stuffed body the three reserved values never appear on their
//! own. Each is replaced by `ESCAPE` followed by its stuff code:
//!
//! | literal | on the wire |
//! |---------|-------------|
//! | `0x7E`  | `0x7D 0x5E` |
//! | `0x7F`  | `0x7D 0x5F` |
//! | `0x7D`  | `0x7D 0x5D` |

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::UnstuffError;

/// Start-of-packet marker.
pub const SOP: u8 = 0x7E;

/// End-of-packet marker.
pub const EOP: u8 = 0x7F;

/// Escape byte introducing a stuffed pair.
pub const ESCAPE: u8 = 0x7D;

/// Stuff code standing in for a literal `SOP`.
pub const SOP_STUFF: u8 = 0x5E;

/// Stuff code standing in for a literal `EOP`.
pub const EOP_STUFF: u8 = 0x5F;

/// Stuff code standing in for a literal `ESCAPE`.
pub const ESCAPE_STUFF: u8 = 0x5D;

/// Size of the id plus length header (unstuffed).
pub const HEADER_SIZE: usize = 5;

/// Size of the trailing checksum.
pub const CHECKSUM_SIZE: usize = 1;

/// Smallest valid unstuffed message: header plus checksum.
pub const MIN_MESSAGE_SIZE: usize = HEADER_SIZE + CHECKSUM_SIZE;

/// Byte order applied to every multi-byte field of a session.
///
/// Device firmware revisions disagree on this, so it is chosen once per
/// session and used for both directions. The default matches firmware that
/// writes length fields big-endian.
///
/// Some firmware writes lengths big-endian but sensor values little-endian.
/// For those devices keep the session on `BigEndian` and read values with
/// `ReadingObserver::new(session.subscribe(), ByteOrder::LittleEndian)`,
/// since the observer's order only applies to sensor values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

impl ByteOrder {
    /// Append a `u32` in this byte order.
    #[inline]
    pub fn put_u32(self, buf: &mut BytesMut, value: u32) {
        match self {
            ByteOrder::BigEndian => buf.put_u32(value),
            ByteOrder::LittleEndian => buf.put_u32_le(value),
        }
    }

    /// Read a `u32` from the front of `buf`.
    ///
    /// Returns `None` if fewer than 4 bytes are available.
    pub fn read_u32(self, mut buf: &[u8]) -> Option<u32> {
        if buf.len() < 4 {
            return None;
        }
        Some(match self {
            ByteOrder::BigEndian => buf.get_u32(),
            ByteOrder::LittleEndian => buf.get_u32_le(),
        })
    }

    /// Read an IEEE-754 `f32` from the front of `buf`.
    pub fn read_f32(self, buf: &[u8]) -> Option<f32> {
        self.read_u32(buf).map(f32::from_bits)
    }

    /// Read an `i16` from the front of `buf`.
    pub fn read_i16(self, mut buf: &[u8]) -> Option<i16> {
        if buf.len() < 2 {
            return None;
        }
        Some(match self {
            ByteOrder::BigEndian => buf.get_i16(),
            ByteOrder::LittleEndian => buf.get_i16_le(),
        })
    }
}

/// Check whether a byte must be escaped inside a frame body.
#[inline]
pub fn is_reserved(byte: u8) -> bool {
    matches!(byte, SOP | EOP | ESCAPE)
}

/// Escape every reserved byte in `data`.
///
/// # Example
///
/// ```
/// use plantmon_link::protocol::stuff;
///
/// let stuffed = stuff(&[0x01, 0x7E, 0x02]);
/// assert_eq!(&stuffed[..], &[0x01, 0x7D, 0x5E, 0x02]);
/// ```
pub fn stuff(data: &[u8]) -> Bytes {
    let extra = data.iter().filter(|&&b| is_reserved(b)).count();
    let mut out = BytesMut::with_capacity(data.len() + extra);

    for &byte in data {
        match byte {
            SOP => out.put_slice(&[ESCAPE, SOP_STUFF]),
            EOP => out.put_slice(&[ESCAPE, EOP_STUFF]),
            ESCAPE => out.put_slice(&[ESCAPE, ESCAPE_STUFF]),
            other => out.put_u8(other),
        }
    }

    out.freeze()
}

/// Reverse [`stuff`] on a body whose SOP/EOP markers are already stripped.
///
/// # Errors
///
/// - [`UnstuffError::EscapeAtEnd`] if the body ends with `ESCAPE`
/// - [`UnstuffError::InvalidEscapeSequence`] if `ESCAPE` precedes an
///   unknown code
pub fn unstuff(body: &[u8]) -> Result<Bytes, UnstuffError> {
    let mut out = BytesMut::with_capacity(body.len());
    let mut i = 0;

    while i < body.len() {
        let byte = body[i];
        if byte != ESCAPE {
            out.put_u8(byte);
            i += 1;
            continue;
        }

        let code = *body.get(i + 1).ok_or(UnstuffError::EscapeAtEnd)?;
        let literal = match code {
            SOP_STUFF => SOP,
            EOP_STUFF => EOP,
            ESCAPE_STUFF => ESCAPE,
            _ => return Err(UnstuffError::InvalidEscapeSequence { position: i, code }),
        };
        out.put_u8(literal);
        i += 2;
    }

    Ok(out.freeze())
}

/// Two's-complement checksum: the byte that brings the modulo-256 sum of
/// `data` to zero.
///
/// # Example
///
/// ```
/// use plantmon_link::protocol::checksum;
///
/// let mut msg = vec![0x02, 0, 0, 0, 1];
/// msg.push(checksum(&msg));
/// assert_eq!(checksum(&msg), 0);
/// ```
#[inline]
pub fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    (!sum).wrapping_add(1)
}

/// Check that a message including its trailing checksum sums to zero.
#[inline]
pub fn verify_checksum(message: &[u8]) -> bool {
    checksum(message) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stuff_passthrough() {
        let data = [0x00, 0x01, 0x5E, 0x5F, 0x5D, 0x80, 0xFF];
        assert_eq!(&stuff(&data)[..], &data);
    }

    #[test]
    fn test_stuff_all_reserved() {
        let stuffed = stuff(&[SOP, EOP, ESCAPE]);
        assert_eq!(
            &stuffed[..],
            &[ESCAPE, SOP_STUFF, ESCAPE, EOP_STUFF, ESCAPE, ESCAPE_STUFF]
        );
    }

    #[test]
    fn test_stuff_empty() {
        assert!(stuff(&[]).is_empty());
    }

    #[test]
    fn test_unstuff_reverses_stuff() {
        let data = [0x7D, 0x7E, 0x7F, 0x5D, 0x00, 0x7D, 0x7D];
        let stuffed = stuff(&data);
        assert_eq!(&unstuff(&stuffed).unwrap()[..], &data);
    }

    #[test]
    fn test_unstuff_escape_at_end() {
        assert_eq!(
            unstuff(&[0x01, 0x02, ESCAPE]),
            Err(UnstuffError::EscapeAtEnd)
        );
        assert_eq!(unstuff(&[ESCAPE]), Err(UnstuffError::EscapeAtEnd));
    }

    #[test]
    fn test_unstuff_invalid_escape() {
        assert_eq!(
            unstuff(&[0x01, ESCAPE, 0x41, 0x02]),
            Err(UnstuffError::InvalidEscapeSequence {
                position: 1,
                code: 0x41
            })
        );
    }

    #[test]
    fn test_unstuff_escaped_escape_followed_by_code_byte() {
        // 0x7D 0x5D is a literal escape; the following 0x5E is plain data.
        let out = unstuff(&[ESCAPE, ESCAPE_STUFF, SOP_STUFF]).unwrap();
        assert_eq!(&out[..], &[ESCAPE, SOP_STUFF]);
    }

    #[test]
    fn test_checksum_empty_is_zero() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_checksum_known_values() {
        assert_eq!(checksum(&[0x01]), 0xFF);
        assert_eq!(checksum(&[0x80, 0x80]), 0x00);
        assert_eq!(checksum(&[0x02, 0x00, 0x00, 0x00, 0x01]), 0xFD);
    }

    #[test]
    fn test_verify_checksum() {
        let mut msg = vec![0x10, 0x20, 0xF0, 0x33];
        msg.push(checksum(&msg));
        assert!(verify_checksum(&msg));

        msg[1] ^= 0x04;
        assert!(!verify_checksum(&msg));
    }

    #[test]
    fn test_byte_order_u32() {
        let mut be = BytesMut::new();
        ByteOrder::BigEndian.put_u32(&mut be, 0x0102_0304);
        assert_eq!(&be[..], &[1, 2, 3, 4]);

        let mut le = BytesMut::new();
        ByteOrder::LittleEndian.put_u32(&mut le, 0x0102_0304);
        assert_eq!(&le[..], &[4, 3, 2, 1]);

        assert_eq!(ByteOrder::BigEndian.read_u32(&be), Some(0x0102_0304));
        assert_eq!(ByteOrder::LittleEndian.read_u32(&le), Some(0x0102_0304));
        assert_eq!(ByteOrder::BigEndian.read_u32(&[1, 2, 3]), None);
    }

    #[test]
    fn test_byte_order_f32_and_i16() {
        let bits = 21.5f32.to_bits();
        assert_eq!(
            ByteOrder::LittleEndian.read_f32(&bits.to_le_bytes()),
            Some(21.5)
        );
        assert_eq!(
            ByteOrder::BigEndian.read_f32(&bits.to_be_bytes()),
            Some(21.5)
        );
        assert_eq!(ByteOrder::BigEndian.read_i16(&[0xFF, 0x38]), Some(-200));
        assert_eq!(ByteOrder::LittleEndian.read_i16(&[0x38, 0xFF]), Some(-200));
        assert_eq!(ByteOrder::LittleEndian.read_i16(&[0x38]), None);
    }

    #[test]
    fn test_byte_order_default() {
        assert_eq!(ByteOrder::default(), ByteOrder::BigEndian);
    }
}
