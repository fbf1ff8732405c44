//! Request objects and their buffer pool.
//!
//! [`RequestPool::obtain`] hands out a [`PendingRequest`] whose payload
//! buffer already holds the `type, serial` header; the caller appends the
//! body with [`PendingRequest::body`]. [`RequestPool::release`] returns the
//! buffer to a bounded free list once the request is resolved.
//!
//! Pooling only saves allocations. Serial allocation lives in
//! [`SerialAllocator`] under its own lock.
//!
//! # Usage
//!
//! ```
//! use cne_client::protocol::RequestType;
//! use cne_client::request::RequestPool;
//!
//! let pool = RequestPool::new(4);
//! let mut req = pool.obtain(RequestType::DeregisterRole);
//! req.body().put_i32(7);
//! assert_eq!(req.serial(), 0);
//! assert_eq!(req.payload_len(), 12);
//! pool.release(req);
//! assert_eq!(pool.idle_buffers(), 1);
//! ```

use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::serial::SerialAllocator;
use crate::codec::{PayloadReader, PayloadWriter};
use crate::error::Result;
use crate::protocol::RequestType;

/// Default number of idle buffers kept for reuse.
pub const DEFAULT_POOL_CAPACITY: usize = 4;

/// Capacity of a freshly allocated request buffer.
const BUFFER_CAPACITY: usize = 256;

/// Successful solicited response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Request this answers.
    pub request_type: RequestType,
    /// Serial the response carried.
    pub serial: u32,
    /// Result fields after the status code.
    pub body: Bytes,
}

impl Response {
    /// Reader positioned at the first result field.
    pub fn reader(&self) -> PayloadReader {
        PayloadReader::new(self.body.clone())
    }
}

/// Channel end that receives the outcome of a request.
pub type Responder = oneshot::Sender<Result<Response>>;

/// A request from creation until resolution.
#[derive(Debug)]
pub struct PendingRequest {
    serial: u32,
    epoch: u64,
    request_type: RequestType,
    payload: BytesMut,
    created_at: Instant,
    responder: Option<Responder>,
}

impl PendingRequest {
    /// Serial number.
    #[inline]
    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Connection epoch the serial was allocated in.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Request type.
    #[inline]
    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    /// Time since the request was obtained.
    #[inline]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Writer that appends body fields after the header.
    pub fn body(&mut self) -> PayloadWriter<'_> {
        PayloadWriter::new(&mut self.payload)
    }

    /// Append pre-encoded body bytes.
    pub fn append(&mut self, body: &[u8]) {
        self.payload.extend_from_slice(body);
    }

    /// Encoded payload length so far (header + body).
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Detach the encoded payload for sending. The buffer keeps its spare
    /// capacity so it can be recycled after resolution.
    pub fn take_payload(&mut self) -> Bytes {
        self.payload.split().freeze()
    }

    /// Attach the channel that will receive the outcome.
    pub fn set_responder(&mut self, responder: Responder) {
        self.responder = Some(responder);
    }

    /// True while an outcome can still be delivered.
    pub fn has_responder(&self) -> bool {
        self.responder.is_some()
    }

    /// Deliver the outcome. Returns `false` if the request was already
    /// resolved or the caller stopped waiting.
    pub fn resolve(&mut self, outcome: Result<Response>) -> bool {
        match self.responder.take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }
}

/// Serial allocator plus a bounded free list of payload buffers.
#[derive(Debug)]
pub struct RequestPool {
    serials: SerialAllocator,
    free: Mutex<Vec<BytesMut>>,
    capacity: usize,
}

impl RequestPool {
    /// Create a pool keeping at most `capacity` idle buffers.
    pub fn new(capacity: usize) -> Self {
        Self {
            serials: SerialAllocator::new(),
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Obtain a request with the next serial and its header written.
    pub fn obtain(&self, request_type: RequestType) -> PendingRequest {
        let mut payload = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(BUFFER_CAPACITY));
        payload.clear();

        let (epoch, serial) = self.serials.next();
        payload.put_i32(request_type.code());
        payload.put_u32(serial);

        PendingRequest {
            serial,
            epoch,
            request_type,
            payload,
            created_at: Instant::now(),
            responder: None,
        }
    }

    /// Return a resolved request's buffer to the free list.
    pub fn release(&self, req: PendingRequest) {
        let mut payload = req.payload;
        payload.clear();
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(payload);
        }
    }

    /// Start a new connection epoch; serials restart at 0.
    pub fn begin_epoch(&self, epoch: u64) {
        self.serials.reset(epoch);
    }

    /// The serial allocator.
    pub fn serials(&self) -> &SerialAllocator {
        &self.serials
    }

    /// Number of idle buffers.
    pub fn idle_buffers(&self) -> usize {
        self.free.lock().len()
    }
}

impl Default for RequestPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}
