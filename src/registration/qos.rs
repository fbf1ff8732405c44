//! QoS flow trackers.
//!
//! Flows are keyed by the id the daemon assigns when it grants a flow, and
//! each one is owned by exactly one registration. Tearing a registration
//! down drops every flow it owns.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::table::RegistrationId;
use crate::codec::PayloadWriter;

/// Daemon-assigned QoS flow identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowId(pub u32);

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flow#{}", self.0)
    }
}

/// What a caller asks for when requesting a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QosSpec {
    /// Traffic class understood by the daemon.
    pub flow_class: i32,
    /// Requested bandwidth in kbit/s.
    pub bandwidth_kbps: i32,
    /// Optional packet filter expression.
    #[serde(default)]
    pub filter: Option<String>,
}

impl QosSpec {
    pub(crate) fn encode(&self, w: &mut PayloadWriter<'_>) {
        w.put_i32(self.flow_class)
            .put_i32(self.bandwidth_kbps)
            .put_opt_str(self.filter.as_deref());
    }
}

/// Flow state as reported by `QosStatus` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosState {
    /// Granted, not yet confirmed active.
    Requested,
    Activated,
    Suspended,
    Released,
    Failed,
}

impl QosState {
    /// Map a `QosStatus` event code. Unknown codes yield `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Activated),
            1 => Some(Self::Suspended),
            2 => Some(Self::Released),
            3 => Some(Self::Failed),
            _ => None,
        }
    }

    /// True for states after which the daemon no longer holds the flow.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Released | Self::Failed)
    }
}

/// One tracked flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QosTracker {
    pub flow: FlowId,
    pub registration: RegistrationId,
    pub spec: QosSpec,
    pub state: QosState,
}

/// All tracked flows.
#[derive(Debug, Default)]
pub struct QosTable {
    flows: HashMap<FlowId, QosTracker>,
}

impl QosTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a granted flow.
    pub fn insert(&mut self, flow: FlowId, registration: RegistrationId, spec: QosSpec) {
        self.flows.insert(
            flow,
            QosTracker {
                flow,
                registration,
                spec,
                state: QosState::Requested,
            },
        );
    }

    pub fn get(&self, flow: FlowId) -> Option<&QosTracker> {
        self.flows.get(&flow)
    }

    /// Apply a status update. Terminal states drop the tracker.
    ///
    /// Returns the owning registration, or `None` for an untracked flow.
    pub fn update(&mut self, flow: FlowId, state: QosState) -> Option<RegistrationId> {
        let owner = {
            let tracker = self.flows.get_mut(&flow)?;
            tracker.state = state;
            tracker.registration
        };
        if state.is_terminal() {
            self.flows.remove(&flow);
        }
        Some(owner)
    }

    /// Stop tracking `flow` if `registration` owns it.
    pub fn remove_owned(&mut self, registration: RegistrationId, flow: FlowId) -> Option<QosTracker> {
        match self.flows.get(&flow) {
            Some(t) if t.registration == registration => self.flows.remove(&flow),
            _ => None,
        }
    }

    /// Drop every flow owned by `registration`; returns how many went.
    pub fn remove_all_for(&mut self, registration: RegistrationId) -> usize {
        let before = self.flows.len();
        self.flows.retain(|_, t| t.registration != registration);
        before - self.flows.len()
    }

    /// Flows owned by `registration`, sorted.
    pub fn flows_for(&self, registration: RegistrationId) -> Vec<FlowId> {
        let mut flows: Vec<FlowId> = self
            .flows
            .values()
            .filter(|t| t.registration == registration)
            .map(|t| t.flow)
            .collect();
        flows.sort_unstable();
        flows
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn clear(&mut self) {
        self.flows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> QosSpec {
        QosSpec {
            flow_class: 1,
            bandwidth_kbps: 512,
            filter: None,
        }
    }

    #[test]
    fn test_terminal_update_drops_tracker() {
        let mut table = QosTable::new();
        table.insert(FlowId(7), RegistrationId(1), spec());

        assert_eq!(table.update(FlowId(7), QosState::Activated), Some(RegistrationId(1)));
        assert_eq!(table.get(FlowId(7)).unwrap().state, QosState::Activated);

        assert_eq!(table.update(FlowId(7), QosState::Released), Some(RegistrationId(1)));
        assert!(table.is_empty());
        assert_eq!(table.update(FlowId(7), QosState::Activated), None);
    }

    #[test]
    fn test_remove_owned_checks_owner() {
        let mut table = QosTable::new();
        table.insert(FlowId(7), RegistrationId(1), spec());
        assert!(table.remove_owned(RegistrationId(2), FlowId(7)).is_none());
        assert!(table.remove_owned(RegistrationId(1), FlowId(7)).is_some());
    }

    #[test]
    fn test_remove_all_for_registration() {
        let mut table = QosTable::new();
        table.insert(FlowId(1), RegistrationId(1), spec());
        table.insert(FlowId(2), RegistrationId(1), spec());
        table.insert(FlowId(3), RegistrationId(2), spec());

        assert_eq!(table.flows_for(RegistrationId(1)), vec![FlowId(1), FlowId(2)]);
        assert_eq!(table.remove_all_for(RegistrationId(1)), 2);
        assert_eq!(table.len(), 1);
        assert!(table.flows_for(RegistrationId(1)).is_empty());
    }

    #[test]
    fn test_qos_state_codes() {
        assert_eq!(QosState::from_code(0), Some(QosState::Activated));
        assert_eq!(QosState::from_code(3), Some(QosState::Failed));
        assert_eq!(QosState::from_code(9), None);
        assert!(QosState::Failed.is_terminal());
        assert!(!QosState::Suspended.is_terminal());
    }
}
