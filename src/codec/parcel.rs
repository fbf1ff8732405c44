//! Field marshalling for request and response bodies.
//!
//! Bodies are flat sequences of fields:
//! - integers: `s32` Big Endian
//! - booleans: `s32` 0 or 1
//! - strings: `s32` byte length followed by UTF-8 bytes, `-1` for absent
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use cne_client::codec::{PayloadReader, PayloadWriter};
//!
//! let mut buf = BytesMut::new();
//! PayloadWriter::new(&mut buf).put_i32(7).put_str("wlan0");
//!
//! let mut reader = PayloadReader::new(buf.freeze());
//! assert_eq!(reader.get_i32().unwrap(), 7);
//! assert_eq!(reader.get_string().unwrap(), "wlan0");
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CneError, Result};

/// Appends fields to a body buffer.
pub struct PayloadWriter<'a> {
    buf: &'a mut BytesMut,
}

impl<'a> PayloadWriter<'a> {
    /// Wrap a buffer; fields are appended after any existing content.
    pub fn new(buf: &'a mut BytesMut) -> Self {
        Self { buf }
    }

    /// Append a signed 32-bit integer.
    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32(value);
        self
    }

    /// Append an unsigned 32-bit value in its `s32` wire slot.
    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32(value);
        self
    }

    /// Append a boolean as 0/1.
    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.put_i32(i32::from(value))
    }

    /// Append a length-prefixed string.
    pub fn put_str(&mut self, value: &str) -> &mut Self {
        self.buf.put_i32(value.len() as i32);
        self.buf.put_slice(value.as_bytes());
        self
    }

    /// Append an optional string; `None` is written as length -1.
    pub fn put_opt_str(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(s) => self.put_str(s),
            None => self.put_i32(-1),
        }
    }
}

/// Reads fields from a received body.
#[derive(Debug, Clone)]
pub struct PayloadReader {
    buf: Bytes,
}

impl PayloadReader {
    /// Wrap a body.
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    /// Bytes not consumed yet.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Consume the reader, returning the unread bytes.
    pub fn into_rest(self) -> Bytes {
        self.buf
    }

    /// Read a signed 32-bit integer.
    pub fn get_i32(&mut self) -> Result<i32> {
        self.need(4, "s32")?;
        Ok(self.buf.get_i32())
    }

    /// Read an unsigned 32-bit value from an `s32` slot.
    pub fn get_u32(&mut self) -> Result<u32> {
        self.need(4, "u32")?;
        Ok(self.buf.get_u32())
    }

    /// Read a 0/1 boolean. Any non-zero value is `true`.
    pub fn get_bool(&mut self) -> Result<bool> {
        Ok(self.get_i32()? != 0)
    }

    /// Read a string that must be present.
    pub fn get_string(&mut self) -> Result<String> {
        self.get_opt_string()?
            .ok_or_else(|| CneError::Protocol("Expected string, found null".to_string()))
    }

    /// Read an optional string (length -1 is `None`).
    pub fn get_opt_string(&mut self) -> Result<Option<String>> {
        let len = self.get_i32()?;
        if len == -1 {
            return Ok(None);
        }
        if len < 0 {
            return Err(CneError::Protocol(format!("Negative string length {}", len)));
        }
        let len = len as usize;
        self.need(len, "string bytes")?;
        let raw = self.buf.split_to(len);
        String::from_utf8(raw.to_vec())
            .map(Some)
            .map_err(|_| CneError::Protocol("String is not valid UTF-8".to_string()))
    }

    fn need(&self, n: usize, what: &str) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(CneError::Protocol(format!(
                "Truncated payload: need {} bytes for {}, have {}",
                n,
                what,
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}
