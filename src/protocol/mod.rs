//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the daemon socket protocol:
//! - 4-byte length prefix framing
//! - Frame buffer for accumulating partial reads
//! - Two-phase stream reader
//! - Request/event discriminants

mod frame;
mod frame_buffer;
mod reader;
mod wire_format;

pub use frame::{
    build_frame, check_frame_size, encode_length, request_payload, solicited_payload,
    unsolicited_payload, Frame, InboundMessage, RequestView,
};
pub use frame_buffer::FrameBuffer;
pub use reader::read_frame;
pub use wire_format::{
    EventType, Rat, RequestType, ResponseCategory, DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE,
    PROTOCOL_VERSION, REQUEST_HEADER_SIZE, STATUS_SUCCESS,
};
