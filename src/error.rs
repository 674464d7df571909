//! Error types for plantmon-link.

use thiserror::Error;

/// Failure while reversing byte-stuffing on a frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UnstuffError {
    /// The body ended with a lone escape byte.
    #[error("escape byte at end of frame body")]
    EscapeAtEnd,

    /// An escape byte was followed by something other than a stuff code.
    #[error("invalid escape sequence 0x7D 0x{code:02X} at offset {position}")]
    InvalidEscapeSequence { position: usize, code: u8 },
}

/// Failure while unwrapping a complete wire frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// First byte was not the start-of-packet marker.
    #[error("frame does not begin with SOP")]
    MissingStart,

    /// Last byte was not the end-of-packet marker.
    #[error("frame does not end with EOP")]
    MissingEnd,

    /// Body could not be unstuffed.
    #[error("unstuff failed: {0}")]
    Unstuff(#[from] UnstuffError),

    /// Bytes did not sum to zero modulo 256.
    #[error("checksum mismatch (residue 0x{residue:02X})")]
    ChecksumMismatch { residue: u8 },
}

/// Main error type for all link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A received frame was malformed or corrupted.
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Message layout did not match what its id requires.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - outbound queue full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,

    /// Device stopped answering status requests.
    #[error("Device unresponsive after {attempts} status checks")]
    LivenessLost { attempts: u32 },
}

/// Result type alias using LinkError.
pub type Result<T> = std::result::Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unstuff_error_display() {
        let err = UnstuffError::InvalidEscapeSequence {
            position: 3,
            code: 0x41,
        };
        assert_eq!(
            err.to_string(),
            "invalid escape sequence 0x7D 0x41 at offset 3"
        );
    }

    #[test]
    fn test_frame_error_from_unstuff() {
        let err: FrameError = UnstuffError::EscapeAtEnd.into();
        assert_eq!(err, FrameError::Unstuff(UnstuffError::EscapeAtEnd));

        let link: LinkError = err.into();
        assert!(link.to_string().contains("escape byte at end"));
    }
}
