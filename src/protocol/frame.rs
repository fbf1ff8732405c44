//! Frame types and payload classification.
//!
//! A [`Frame`] is one length-delimited unit as read off the socket. Its
//! payload is classified into an [`InboundMessage`] by the dispatcher.
//! Uses `bytes::Bytes` so bodies are shared, not copied.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use cne_client::protocol::{build_frame, solicited_payload, Frame, InboundMessage};
//!
//! let payload = solicited_payload(42, 0, b"ok");
//! let wire = build_frame(&payload);
//! assert_eq!(wire.len(), 4 + payload.len());
//!
//! let frame = Frame::new(Bytes::from(payload));
//! match frame.classify().unwrap() {
//!     InboundMessage::Solicited { serial, status, body } => {
//!         assert_eq!(serial, 42);
//!         assert_eq!(status, 0);
//!         assert_eq!(&body[..], b"ok");
//!     }
//!     _ => unreachable!(),
//! }
//! ```

use bytes::{BufMut, Bytes};

use super::wire_format::{ResponseCategory, LENGTH_PREFIX_SIZE, REQUEST_HEADER_SIZE};
use crate::codec::PayloadReader;
use crate::error::{CneError, Result};

/// A complete inbound frame (length prefix already stripped).
#[derive(Debug, Clone)]
pub struct Frame {
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame from its payload.
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Classify the payload as a solicited reply or an unsolicited event.
    pub fn classify(&self) -> Result<InboundMessage> {
        InboundMessage::decode(self.payload.clone())
    }
}

/// Response payload after the category discriminant has been read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Reply to the request carrying `serial`.
    Solicited { serial: u32, status: i32, body: Bytes },
    /// Daemon-initiated event; `event` is the raw event code.
    Unsolicited { event: i32, body: Bytes },
}

impl InboundMessage {
    /// Decode a response payload.
    pub fn decode(payload: Bytes) -> Result<Self> {
        let mut reader = PayloadReader::new(payload);
        let category = ResponseCategory::from_code(reader.get_i32()?)?;
        match category {
            ResponseCategory::Solicited => {
                let serial = reader.get_u32()?;
                let status = reader.get_i32()?;
                Ok(Self::Solicited {
                    serial,
                    status,
                    body: reader.into_rest(),
                })
            }
            ResponseCategory::Unsolicited => {
                let event = reader.get_i32()?;
                Ok(Self::Unsolicited {
                    event,
                    body: reader.into_rest(),
                })
            }
        }
    }
}

/// A request payload as seen by the daemon side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestView {
    /// Raw request type code.
    pub request_type: i32,
    /// Correlation serial.
    pub serial: u32,
    /// Request-specific fields.
    pub body: Bytes,
}

impl RequestView {
    /// Split a request payload into type, serial and body.
    pub fn decode(payload: Bytes) -> Result<Self> {
        if payload.len() < REQUEST_HEADER_SIZE {
            return Err(CneError::Protocol(format!(
                "Request payload of {} bytes is shorter than its header",
                payload.len()
            )));
        }
        let mut reader = PayloadReader::new(payload);
        let request_type = reader.get_i32()?;
        let serial = reader.get_u32()?;
        Ok(Self {
            request_type,
            serial,
            body: reader.into_rest(),
        })
    }
}

/// Reject a payload larger than `max` bytes.
#[inline]
pub fn check_frame_size(size: usize, max: u32) -> Result<()> {
    if size > max as usize {
        return Err(CneError::FrameTooLarge { size, max });
    }
    Ok(())
}

/// Encode the 4-byte Big Endian length prefix.
#[inline]
pub fn encode_length(len: usize) -> [u8; LENGTH_PREFIX_SIZE] {
    (len as u32).to_be_bytes()
}

/// Build a complete frame (prefix + payload) as a single byte vector.
///
/// The writer task uses scatter/gather I/O instead; this is for peers and
/// tests that want a contiguous buffer.
pub fn build_frame(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.extend_from_slice(&encode_length(payload.len()));
    buf.extend_from_slice(payload);
    buf
}

/// Build a request payload (type, serial, body).
pub fn request_payload(request_type: i32, serial: u32, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(REQUEST_HEADER_SIZE + body.len());
    buf.put_i32(request_type);
    buf.put_u32(serial);
    buf.put_slice(body);
    buf
}

/// Build a solicited response payload.
pub fn solicited_payload(serial: u32, status: i32, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + body.len());
    buf.put_i32(ResponseCategory::Solicited.code());
    buf.put_u32(serial);
    buf.put_i32(status);
    buf.put_slice(body);
    buf
}

/// Build an unsolicited event payload.
pub fn unsolicited_payload(event: i32, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + body.len());
    buf.put_i32(ResponseCategory::Unsolicited.code());
    buf.put_i32(event);
    buf.put_slice(body);
    buf
}
