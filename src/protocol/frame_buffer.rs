//! Frame buffer for reassembling frames from a byte stream.
//!
//! Uses `bytes::BytesMut` for the accumulator.
//! Implements a state machine driven one byte at a time, since SOP and EOP
//! may fall anywhere inside a read:
//! - `WaitingForStart`: discard bytes until SOP
//! - `AccumulatingUntilEnd`: collect bytes until EOP, then emit
//!
//! Stuffing guarantees a bare EOP only ever appears as a terminator, so no
//! escape tracking is needed here.
//!
//! # Example
//!
//! ```
//! use plantmon_link::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! assert!(buffer.push(&[0x00, 0x7E, 0x01, 0x02]).is_empty());
//! let frames = buffer.push(&[0x03, 0x7F]);
//!
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].as_bytes(), &[0x7E, 0x01, 0x02, 0x03, 0x7F]);
//! ```

use bytes::BytesMut;

use super::wire_format::{EOP, SOP};
use super::Frame;

/// Default maximum frame size on the wire (markers included).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4096;

/// Reassembly state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyState {
    /// Discarding bytes until a start marker.
    WaitingForStart,
    /// Inside a frame, waiting for the end marker.
    AccumulatingUntilEnd,
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// One instance per connection, driven by a single reader.
#[derive(Debug)]
pub struct FrameBuffer {
    /// Bytes of the frame in progress, SOP included.
    buffer: BytesMut,
    /// Current parsing state.
    state: ReassemblyState,
    /// Frames longer than this are discarded.
    max_frame_size: usize,
    /// Number of oversized frames discarded so far.
    dropped: u64,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default size limit.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new frame buffer with a custom size limit.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_frame_size.min(DEFAULT_MAX_FRAME_SIZE)),
            state: ReassemblyState::WaitingForStart,
            max_frame_size: max_frame_size.max(2),
            dropped: 0,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Frames are returned in the order their EOP markers appear. Partial
    /// data is kept for the next push; an empty slice is a no-op.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();

        for &byte in data {
            match self.state {
                ReassemblyState::WaitingForStart => {
                    if byte == SOP {
                        self.buffer.clear();
                        self.buffer.extend_from_slice(&[byte]);
                        self.state = ReassemblyState::AccumulatingUntilEnd;
                    }
                }
                ReassemblyState::AccumulatingUntilEnd => {
                    self.buffer.extend_from_slice(&[byte]);

                    if byte == EOP {
                        let frame = self.buffer.split().freeze();
                        self.state = ReassemblyState::WaitingForStart;
                        frames.push(Frame::new(frame));
                    } else if self.buffer.len() >= self.max_frame_size {
                        self.dropped += 1;
                        tracing::warn!(
                            "Discarding partial frame of {} bytes without EOP (limit {})",
                            self.buffer.len(),
                            self.max_frame_size
                        );
                        self.reset();
                    }
                }
            }
        }

        frames
    }

    /// Current reassembly state.
    #[inline]
    pub fn state(&self) -> ReassemblyState {
        self.state
    }

    /// Get the number of buffered bytes of the frame in progress.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if no partial frame is buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of frames discarded for exceeding the size limit.
    #[inline]
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    /// Discard any partial frame and wait for the next SOP.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = ReassemblyState::WaitingForStart;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
