//! Dedicated writer task for outbound frames.
//!
//! Callers never touch the socket's write half. They hand frames to a
//! writer task through a bounded mpsc channel; the task batches whatever is
//! queued into a single vectored write.
//!
//! # Architecture
//!
//! ```text
//! caller 1 ─┐
//! caller 2 ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► socket
//! caller N ─┘
//! ```
//!
//! A full queue makes [`WriterHandle::send`] wait. Frames are never
//! dropped: every queued request owes the daemon's one-response contract.

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{CneError, Result};
use crate::protocol::{
    check_frame_size, encode_length, request_payload, RequestType, LENGTH_PREFIX_SIZE,
};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written to the socket.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Encoded length prefix.
    pub length: [u8; LENGTH_PREFIX_SIZE],
    /// Payload bytes.
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Wrap a payload without a size check.
    #[inline]
    pub fn new(payload: Bytes) -> Self {
        Self {
            length: encode_length(payload.len()),
            payload,
        }
    }

    /// Total size on the wire (prefix + payload).
    #[inline]
    pub fn size(&self) -> usize {
        LENGTH_PREFIX_SIZE + self.payload.len()
    }
}

/// Frame a payload, rejecting it if it exceeds `max_frame_size`.
pub fn encode_checked(payload: Bytes, max_frame_size: u32) -> Result<OutboundFrame> {
    check_frame_size(payload.len(), max_frame_size)?;
    Ok(OutboundFrame::new(payload))
}

/// Frame a request built from its parts.
pub fn encode_request(
    request_type: RequestType,
    serial: u32,
    body: &[u8],
    max_frame_size: u32,
) -> Result<OutboundFrame> {
    let payload = request_payload(request_type.code(), serial, body);
    encode_checked(Bytes::from(payload), max_frame_size)
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// Cheaply cloneable; each connection gets a fresh one.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    pending: Arc<AtomicUsize>,
}

impl WriterHandle {
    /// Queue a frame, waiting while the queue is full.
    ///
    /// Fails with `PeerUnavailable` once the writer task has exited.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.tx.send(frame).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            CneError::PeerUnavailable
        })
    }

    /// Frames queued but not yet written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// True once the writer task has stopped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The `JoinHandle` resolves when every handle is dropped (clean exit) or
/// the socket write fails.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle {
        tx,
        pending: pending.clone(),
    };
    let task = tokio::spawn(writer_loop(rx, writer, pending));

    (handle, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
    loop {
        let first = match rx.recv().await {
            Some(f) => f,
            None => {
                let _ = writer.shutdown().await;
                return Ok(());
            }
        };

        batch.clear();
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        if let Err(e) = write_batch(&mut writer, &batch).await {
            tracing::debug!("Writer stopped after failed write of {} frames: {}", batch_size, e);
            return Err(e);
        }
        pending.fetch_sub(batch_size, Ordering::Release);
        tracing::trace!("Wrote {} frames", batch_size);
    }
}

/// Write a batch of frames with `write_vectored`, continuing after partial
/// writes.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(CneError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data after the first `skip_bytes`.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for frame in batch {
        for part in [&frame.length[..], &frame.payload[..]] {
            let end = offset + part.len();
            if !part.is_empty() && skip_bytes < end {
                let start = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&part[start..]));
            }
            offset = end;
        }
    }

    slices
}
