//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForLength`: Need at least 4 bytes
//! - `WaitingForPayload`: Length parsed, need N more payload bytes
//!
//! The declared length is validated before anything is reserved for it, so
//! a corrupted prefix such as `0xFFFFFFFF` is rejected without allocating.
//!
//! # Example
//!
//! ```
//! use cne_client::protocol::{build_frame, FrameBuffer};
//!
//! let mut buffer = FrameBuffer::new();
//! let wire = build_frame(b"abc");
//!
//! assert!(buffer.push(&wire[..2]).unwrap().is_empty());
//! let frames = buffer.push(&wire[2..]).unwrap();
//! assert_eq!(frames[0].payload(), b"abc");
//! ```

use bytes::{Buf, Bytes, BytesMut};

use super::frame::check_frame_size;
use super::wire_format::{DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE};
use super::Frame;
use crate::error::Result;

/// Initial read buffer capacity.
const INITIAL_CAPACITY: usize = 16 * 1024;

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the complete length prefix.
    WaitingForLength,
    /// Length parsed, waiting for payload bytes.
    WaitingForPayload { remaining: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed payload size.
    max_frame_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default maximum frame size.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new frame buffer with a custom maximum frame size.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            state: State::WaitingForLength,
            max_frame_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns `FrameTooLarge` if a length prefix exceeds the maximum. The
    /// stream has no resynchronisation point after that, so callers should
    /// drop the connection.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.extend(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Buffer data without extracting frames.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract the next complete frame, if one is buffered.
    ///
    /// Frames ahead of an oversized length prefix are still returned by
    /// earlier calls before the error surfaces.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.state {
                State::WaitingForLength => {
                    if self.buffer.len() < LENGTH_PREFIX_SIZE {
                        return Ok(None);
                    }

                    let declared = u32::from_be_bytes([
                        self.buffer[0],
                        self.buffer[1],
                        self.buffer[2],
                        self.buffer[3],
                    ]) as usize;
                    check_frame_size(declared, self.max_frame_size)?;

                    self.buffer.advance(LENGTH_PREFIX_SIZE);

                    if declared == 0 {
                        return Ok(Some(Frame::new(Bytes::new())));
                    }
                    self.state = State::WaitingForPayload {
                        remaining: declared,
                    };
                }

                State::WaitingForPayload { remaining } => {
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }

                    let payload = self.buffer.split_to(remaining).freeze();
                    self.state = State::WaitingForLength;
                    return Ok(Some(Frame::new(payload)));
                }
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// True when a frame has been started but not completed.
    pub fn is_mid_frame(&self) -> bool {
        !self.buffer.is_empty() || matches!(self.state, State::WaitingForPayload { .. })
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForLength;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForLength => "WaitingForLength",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
