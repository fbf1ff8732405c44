//! Registration module - roles, RAT arbitration, liveness and QoS flows.
//!
//! - [`RegistrationTable`] - synchronous state, one mutex in the client
//! - [`PeerHandle`] - liveness signal bound to each registration
//! - [`QosTable`] - flows owned by registrations
//! - `lifecycle` - the async operations driving all of the above

pub(crate) mod lifecycle;
mod liveness;
mod qos;
mod table;

pub use liveness::PeerHandle;
pub use qos::{FlowId, QosSpec, QosState, QosTable, QosTracker};
pub use table::{
    notice, Candidate, CompatibleRats, Confirmation, LinkChange, Registration, RegistrationId,
    RegistrationSnapshot, RegistrationState, RegistrationTable, RoleRequest,
    REGISTRATION_ID_SENTINEL,
};
