//! # cne-client
//!
//! Async Rust client for a connectivity-engine daemon (`cnd`).
//!
//! The daemon speaks a length-prefixed request/response/event protocol over
//! a local stream socket. This crate multiplexes that socket: requests are
//! correlated by serial, unsolicited events are dispatched to registration
//! state, and the connection is kept alive forever with fixed-backoff
//! reconnects.
//!
//! ## Architecture
//!
//! - **Framing**: `[u32 BE length][payload]`, see [`protocol`]
//! - **Requests**: pooled buffers, per-epoch serials, see [`request`]
//! - **Transport**: connect loop, read loop, writer task, see [`transport`]
//! - **Registrations**: roles bound to a [`PeerHandle`], candidate RATs,
//!   QoS flows, see [`registration`]
//!
//! ## Example
//!
//! ```ignore
//! use cne_client::{CneClient, PeerHandle, RoleRequest};
//!
//! #[tokio::main]
//! async fn main() -> cne_client::Result<()> {
//!     let client = CneClient::builder()
//!         .socket_path("/dev/socket/cnd")
//!         .start()?;
//!
//!     let id = client.register_role(RoleRequest::new(1), PeerHandle::new())?;
//!     // ... wait for Notice::LinkAvailable, then:
//!     client.report_link_satisfaction(id, true).await?;
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod info;
pub mod notify;
pub mod protocol;
pub mod registration;
pub mod request;
pub mod transport;
pub mod writer;

mod client;
mod dispatch;

pub use client::{ClientBuilder, CneClient};
pub use config::ClientConfig;
pub use error::{CneError, Result};
pub use info::{BatteryInfo, WlanInfo, WwanInfo};
pub use notify::{ChannelNotifier, LogNotifier, LossReason, Notice, Notifier};
pub use protocol::{EventType, Rat, RequestType};
pub use registration::{FlowId, PeerHandle, QosSpec, QosState, RegistrationId, RoleRequest};
pub use request::Response;
pub use transport::LinkState;
