//! Codec module - field marshalling for frame bodies.
//!
//! - [`PayloadWriter`] - appends `s32` integers and length-prefixed strings
//! - [`PayloadReader`] - reads them back, failing on truncation
//!
//! Codecs work on `bytes` buffers so a request body can be written straight
//! into the pooled frame buffer.

mod parcel;

pub use parcel::{PayloadReader, PayloadWriter};
