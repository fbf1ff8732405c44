//! Blocking-style frame reader.
//!
//! [`read_frame`] reads exactly one frame from an async stream using a
//! strict two-phase protocol: exactly 4 length bytes, then exactly `length`
//! payload bytes. Partial reads are retried by `read_exact`. A stream that
//! closes before or inside a frame is end-of-stream, never a partial frame.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::frame::check_frame_size;
use super::wire_format::LENGTH_PREFIX_SIZE;
use crate::error::Result;

/// Read one frame payload.
///
/// Returns `Ok(None)` on end-of-stream (including a peer that closed
/// mid-frame).
///
/// # Errors
///
/// `FrameTooLarge` if the declared length exceeds `max_frame_size`; nothing
/// is allocated for the declared length in that case. I/O errors other than
/// EOF are propagated.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: u32) -> Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    if !read_fully(reader, &mut prefix).await? {
        return Ok(None);
    }

    let declared = u32::from_be_bytes(prefix) as usize;
    check_frame_size(declared, max_frame_size)?;

    let mut payload = BytesMut::zeroed(declared);
    if !read_fully(reader, &mut payload).await? {
        tracing::debug!(declared, "Stream closed mid-frame");
        return Ok(None);
    }
    Ok(Some(payload.freeze()))
}

/// Fill `buf` completely. Returns `false` on EOF.
async fn read_fully<R>(reader: &mut R, buf: &mut [u8]) -> Result<bool>
where
    R: AsyncRead + Unpin,
{
    if buf.is_empty() {
        return Ok(true);
    }
    match reader.read_exact(buf).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}
