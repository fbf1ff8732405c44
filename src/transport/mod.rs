//! Transport module - daemon socket and connection lifecycle.
//!
//! - [`Connector`] opens byte streams ([`UnixConnector`] for the daemon)
//! - [`ConnectionManager`] runs the connect / read / reconnect loop

mod manager;
mod socket;

pub use manager::{ConnectionManager, LinkState};
pub use socket::{BoxFuture, BoxedStream, Connector, LinkStream, UnixConnector};
