//! Error types for cne-client.

use thiserror::Error;

use crate::protocol::RequestType;
use crate::registration::{FlowId, RegistrationId};

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum CneError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Frame exceeds the configured maximum frame size.
    #[error("Frame of {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: u32 },

    /// Protocol error (malformed payload, unknown category, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The daemon is not reachable, or the connection was reset while the
    /// request was outstanding.
    #[error("Peer unavailable")]
    PeerUnavailable,

    /// The daemon answered with a non-success status.
    #[error("{request:?} failed with status {status}")]
    RequestFailed { request: RequestType, status: i32 },

    /// No response arrived within the allotted time.
    #[error("{request:?} (serial {serial}) timed out")]
    Timeout { request: RequestType, serial: u32 },

    /// Registration id is not (or no longer) in the registration table.
    #[error("Unknown registration {0}")]
    UnknownRegistration(RegistrationId),

    /// Registration exists but is not in the active state.
    #[error("Registration {0} is not active")]
    RegistrationNotActive(RegistrationId),

    /// Operation requires a notification that has not been delivered yet.
    #[error("Registration {0} has not been notified yet")]
    NotYetNotified(RegistrationId),

    /// Every candidate RAT has already been tried.
    #[error("No untried candidates left for registration {0}")]
    NoMoreCandidates(RegistrationId),

    /// QoS flow is not tracked for the registration.
    #[error("Unknown QoS flow {0}")]
    UnknownQosFlow(FlowId),

    /// The client has been shut down.
    #[error("Client shut down")]
    Shutdown,
}

/// Result type alias using CneError.
pub type Result<T> = std::result::Result<T, CneError>;
