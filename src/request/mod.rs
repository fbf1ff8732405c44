//! Request module - serials, request objects and the outstanding table.
//!
//! - [`SerialAllocator`] - per-epoch correlation numbers
//! - [`RequestPool`] - hands out [`PendingRequest`]s, recycles buffers
//! - [`OutstandingTable`] - requests awaiting a solicited response

mod outstanding;
mod pool;
mod serial;

pub use outstanding::OutstandingTable;
pub use pool::{PendingRequest, RequestPool, Responder, Response, DEFAULT_POOL_CAPACITY};
pub use serial::SerialAllocator;
