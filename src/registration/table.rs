//! Registration table: roles, candidate RATs, notice bits, owned QoS flows.
//!
//! Everything here is synchronous state manipulation. The table sits behind
//! one mutex in the client; the async side (requests, liveness watches,
//! notifications) lives in `lifecycle` and never holds the lock across an
//! await.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::qos::{FlowId, QosSpec, QosTable};
use crate::codec::{PayloadReader, PayloadWriter};
use crate::error::{CneError, Result};
use crate::protocol::Rat;

/// Registration ids wrap back to 1 when the counter reaches this value.
pub const REGISTRATION_ID_SENTINEL: u32 = 0x7FFF_FFFF;

/// Notice bits recorded per registration.
pub mod notice {
    /// `LinkAvailable` has been delivered for the current active RAT.
    pub const LINK_AVAILABLE: u32 = 0b0000_0001;
    /// A better RAT was offered and is awaiting switch/reject.
    pub const BETTER_LINK: u32 = 0b0000_0010;

    /// Check if a specific notice bit is set.
    #[inline]
    pub fn has_notice(bits: u32, notice: u32) -> bool {
        bits & notice != 0
    }
}

/// Client-side registration identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(pub u32);

impl RegistrationId {
    /// Wire representation.
    #[inline]
    pub fn code(self) -> i32 {
        self.0 as i32
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reg#{}", self.0)
    }
}

/// A role registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRequest {
    /// Role code understood by the daemon.
    pub role: i32,
    /// Owning process id.
    #[serde(default)]
    pub pid: i32,
    /// Forward link bandwidth in kbit/s.
    #[serde(default)]
    pub forward_bandwidth_kbps: i32,
    /// Reverse link bandwidth in kbit/s.
    #[serde(default)]
    pub reverse_bandwidth_kbps: i32,
}

impl RoleRequest {
    pub fn new(role: i32) -> Self {
        Self {
            role,
            pid: std::process::id() as i32,
            forward_bandwidth_kbps: 0,
            reverse_bandwidth_kbps: 0,
        }
    }

    /// Set requested bandwidths.
    pub fn bandwidth(mut self, forward_kbps: i32, reverse_kbps: i32) -> Self {
        self.forward_bandwidth_kbps = forward_kbps;
        self.reverse_bandwidth_kbps = reverse_kbps;
        self
    }

    pub(crate) fn encode(&self, id: RegistrationId, w: &mut PayloadWriter<'_>) {
        w.put_i32(id.code())
            .put_i32(self.role)
            .put_i32(self.pid)
            .put_i32(self.forward_bandwidth_kbps)
            .put_i32(self.reverse_bandwidth_kbps);
    }
}

/// Lifecycle state. Removal from the table is the terminal (gone) state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    PendingRegister,
    Active,
    PendingDeregister,
}

/// One candidate RAT offered by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub rat: Rat,
    pub tried: bool,
}

/// Decoded `GetCompatibleRats` result: `s32 active, s32 count, count * s32 rat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibleRats {
    pub active: Rat,
    pub candidates: Vec<Rat>,
}

impl CompatibleRats {
    pub fn decode(mut reader: PayloadReader) -> Result<Self> {
        let active = Rat::from_code(reader.get_i32()?);
        let count = reader.get_i32()?;
        if count < 0 || count as usize > reader.remaining() / 4 {
            return Err(CneError::Protocol(format!("Bad candidate count {}", count)));
        }
        let candidates = (0..count)
            .map(|_| reader.get_i32().map(Rat::from_code))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { active, candidates })
    }
}

/// A client registration.
#[derive(Debug)]
pub struct Registration {
    id: RegistrationId,
    role: RoleRequest,
    state: RegistrationState,
    candidates: Vec<Candidate>,
    active: Option<Rat>,
    pending_switch: Option<Rat>,
    notices: u32,
    unbind: CancellationToken,
}

impl Registration {
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn role(&self) -> &RoleRequest {
        &self.role
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    pub fn active(&self) -> Option<Rat> {
        self.active
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn has_notice(&self, bit: u32) -> bool {
        notice::has_notice(self.notices, bit)
    }

    fn mark_tried(&mut self, rat: Rat) {
        for c in self.candidates.iter_mut().filter(|c| c.rat == rat) {
            c.tried = true;
        }
    }

    fn apply_candidates(&mut self, options: CompatibleRats) {
        self.candidates = options
            .candidates
            .into_iter()
            .map(|rat| Candidate { rat, tried: false })
            .collect();
        self.active = Some(options.active);
        self.mark_tried(options.active);
        self.pending_switch = None;
        self.notices = notice::LINK_AVAILABLE;
    }

    /// First untried candidate in received order, skipping the active one.
    fn next_candidate(&self) -> Option<Rat> {
        self.candidates
            .iter()
            .find(|c| !c.tried && Some(c.rat) != self.active)
            .map(|c| c.rat)
    }

    fn clear_switch(&mut self) {
        self.pending_switch = None;
        self.notices &= !notice::BETTER_LINK;
    }

    fn require_notice(&self, bit: u32) -> Result<()> {
        if self.has_notice(bit) {
            Ok(())
        } else {
            Err(CneError::NotYetNotified(self.id))
        }
    }

    fn snapshot(&self, qos: &QosTable) -> RegistrationSnapshot {
        RegistrationSnapshot {
            id: self.id,
            role: self.role.clone(),
            state: self.state,
            candidates: self.candidates.clone(),
            active: self.active,
            pending_switch: self.pending_switch,
            notices: self.notices,
            qos_flows: qos.flows_for(self.id),
        }
    }
}

/// Point-in-time copy of a registration for callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationSnapshot {
    pub id: RegistrationId,
    pub role: RoleRequest,
    pub state: RegistrationState,
    pub candidates: Vec<Candidate>,
    pub active: Option<Rat>,
    pub pending_switch: Option<Rat>,
    pub notices: u32,
    pub qos_flows: Vec<FlowId>,
}

impl RegistrationSnapshot {
    /// RATs marked tried, in received order.
    pub fn tried(&self) -> Vec<Rat> {
        self.candidates
            .iter()
            .filter(|c| c.tried)
            .map(|c| c.rat)
            .collect()
    }
}

/// How a confirmed decision changes the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkChange {
    /// Stay on the active RAT.
    Keep,
    /// Move to the next untried candidate.
    Fallback,
    /// Move to the offered better RAT.
    Switch,
    /// Stay put and drop the offer.
    Decline,
}

/// What `ConfirmRat` should carry after a link decision.
///
/// Deciding does not touch the table; [`RegistrationTable::commit`] applies
/// the change once the daemon has acknowledged it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub rat: Rat,
    pub satisfied: bool,
    pub change: LinkChange,
}

/// All registrations plus their QoS flows.
#[derive(Debug)]
pub struct RegistrationTable {
    next_id: u32,
    entries: HashMap<RegistrationId, Registration>,
    qos: QosTable,
}

impl RegistrationTable {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: HashMap::new(),
            qos: QosTable::new(),
        }
    }

    fn allocate_id(&mut self) -> RegistrationId {
        loop {
            let id = RegistrationId(self.next_id);
            self.next_id = if self.next_id + 1 >= REGISTRATION_ID_SENTINEL {
                1
            } else {
                self.next_id + 1
            };
            if !self.entries.contains_key(&id) {
                return id;
            }
        }
    }

    /// Add a registration in `PendingRegister`. `unbind` stops its liveness
    /// watch when the registration goes away.
    pub fn insert(&mut self, role: RoleRequest, unbind: CancellationToken) -> RegistrationId {
        let id = self.allocate_id();
        self.entries.insert(
            id,
            Registration {
                id,
                role,
                state: RegistrationState::PendingRegister,
                candidates: Vec::new(),
                active: None,
                pending_switch: None,
                notices: 0,
                unbind,
            },
        );
        id
    }

    pub fn get(&self, id: RegistrationId) -> Option<&Registration> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: RegistrationId) -> bool {
        self.entries.contains_key(&id)
    }

    fn active_mut(&mut self, id: RegistrationId) -> Result<&mut Registration> {
        let reg = self
            .entries
            .get_mut(&id)
            .ok_or(CneError::UnknownRegistration(id))?;
        if reg.state != RegistrationState::Active {
            return Err(CneError::RegistrationNotActive(id));
        }
        Ok(reg)
    }

    /// Check that `id` exists and is `Active`.
    pub fn ensure_active(&mut self, id: RegistrationId) -> Result<()> {
        self.active_mut(id).map(|_| ())
    }

    /// `PendingRegister -> Active` after the daemon accepted the role.
    pub fn activate(&mut self, id: RegistrationId) -> Result<()> {
        let reg = self
            .entries
            .get_mut(&id)
            .ok_or(CneError::UnknownRegistration(id))?;
        if reg.state != RegistrationState::PendingRegister {
            return Err(CneError::RegistrationNotActive(id));
        }
        reg.state = RegistrationState::Active;
        Ok(())
    }

    /// Store the daemon's candidate list and mark the link as announced.
    /// Returns the active RAT.
    pub fn apply_candidates(&mut self, id: RegistrationId, options: CompatibleRats) -> Result<Rat> {
        let reg = self.active_mut(id)?;
        let active = options.active;
        reg.apply_candidates(options);
        Ok(active)
    }

    fn active_ref(&self, id: RegistrationId) -> Result<&Registration> {
        let reg = self
            .entries
            .get(&id)
            .ok_or(CneError::UnknownRegistration(id))?;
        if reg.state != RegistrationState::Active {
            return Err(CneError::RegistrationNotActive(id));
        }
        Ok(reg)
    }

    /// Decide what to confirm after the caller judged the active link.
    ///
    /// Not satisfied picks the next untried candidate; with none left this
    /// fails with `NoMoreCandidates`.
    pub fn link_satisfaction(&self, id: RegistrationId, satisfied: bool) -> Result<Confirmation> {
        let reg = self.active_ref(id)?;
        reg.require_notice(notice::LINK_AVAILABLE)?;
        let current = reg.active.ok_or(CneError::NotYetNotified(id))?;
        if satisfied {
            return Ok(Confirmation {
                rat: current,
                satisfied: true,
                change: LinkChange::Keep,
            });
        }
        let rat = reg.next_candidate().ok_or(CneError::NoMoreCandidates(id))?;
        Ok(Confirmation {
            rat,
            satisfied: false,
            change: LinkChange::Fallback,
        })
    }

    /// Accept the offered better RAT.
    pub fn accept_switch(&self, id: RegistrationId) -> Result<Confirmation> {
        let reg = self.active_ref(id)?;
        reg.require_notice(notice::BETTER_LINK)?;
        let rat = reg.pending_switch.ok_or(CneError::NotYetNotified(id))?;
        Ok(Confirmation {
            rat,
            satisfied: true,
            change: LinkChange::Switch,
        })
    }

    /// Decline the offered better RAT; the current one is re-confirmed.
    pub fn reject_switch(&self, id: RegistrationId) -> Result<Confirmation> {
        let reg = self.active_ref(id)?;
        reg.require_notice(notice::BETTER_LINK)?;
        let current = reg.active.ok_or(CneError::NotYetNotified(id))?;
        Ok(Confirmation {
            rat: current,
            satisfied: true,
            change: LinkChange::Decline,
        })
    }

    /// Apply a decision the daemon acknowledged.
    pub fn commit(&mut self, id: RegistrationId, decision: Confirmation) -> Result<()> {
        let reg = self.active_mut(id)?;
        match decision.change {
            LinkChange::Keep => {}
            LinkChange::Fallback => {
                reg.active = Some(decision.rat);
                reg.mark_tried(decision.rat);
                reg.notices |= notice::LINK_AVAILABLE;
            }
            LinkChange::Switch => {
                reg.active = Some(decision.rat);
                reg.mark_tried(decision.rat);
                reg.notices |= notice::LINK_AVAILABLE;
                if reg.pending_switch == Some(decision.rat) {
                    reg.clear_switch();
                }
            }
            LinkChange::Decline => reg.clear_switch(),
        }
        Ok(())
    }

    /// `RatLost`: drop the active link if it matches. Returns true if the
    /// registration's state changed.
    pub fn rat_lost(&mut self, id: RegistrationId, rat: Rat) -> bool {
        let Ok(reg) = self.active_mut(id) else {
            return false;
        };
        if reg.active != Some(rat) {
            return false;
        }
        reg.active = None;
        reg.notices &= !notice::LINK_AVAILABLE;
        if reg.pending_switch == Some(rat) {
            reg.clear_switch();
        }
        true
    }

    /// `MorePreferredRatAvailable`: remember the offer. Returns false for a
    /// registration that is gone or not active.
    pub fn offer_better_link(&mut self, id: RegistrationId, rat: Rat) -> bool {
        let Ok(reg) = self.active_mut(id) else {
            return false;
        };
        reg.pending_switch = Some(rat);
        reg.notices |= notice::BETTER_LINK;
        true
    }

    /// Start deregistering: `-> PendingDeregister` and unbind the liveness
    /// watch. Returns the previous state.
    pub fn begin_deregister(&mut self, id: RegistrationId) -> Result<RegistrationState> {
        let reg = self
            .entries
            .get_mut(&id)
            .ok_or(CneError::UnknownRegistration(id))?;
        let previous = reg.state;
        if previous == RegistrationState::PendingDeregister {
            return Err(CneError::RegistrationNotActive(id));
        }
        reg.state = RegistrationState::PendingDeregister;
        reg.unbind.cancel();
        Ok(previous)
    }

    /// Remove a registration, its liveness watch and its QoS flows.
    pub fn remove(&mut self, id: RegistrationId) -> Option<Registration> {
        let reg = self.entries.remove(&id)?;
        reg.unbind.cancel();
        let flows = self.qos.remove_all_for(id);
        tracing::debug!("Removed {} with {} QoS flows", id, flows);
        Some(reg)
    }

    /// Remove everything (transport reset). Returns the removed ids, sorted.
    pub fn teardown_all(&mut self) -> Vec<RegistrationId> {
        let mut ids: Vec<RegistrationId> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        for reg in self.entries.values() {
            reg.unbind.cancel();
        }
        self.entries.clear();
        self.qos.clear();
        ids
    }

    /// Track a granted flow. Fails if the registration is gone or not
    /// active anymore.
    pub fn track_qos(&mut self, id: RegistrationId, flow: FlowId, spec: QosSpec) -> Result<()> {
        self.active_mut(id)?;
        self.qos.insert(flow, id, spec);
        Ok(())
    }

    pub fn qos(&self) -> &QosTable {
        &self.qos
    }

    pub fn qos_mut(&mut self) -> &mut QosTable {
        &mut self.qos
    }

    pub fn snapshot(&self, id: RegistrationId) -> Option<RegistrationSnapshot> {
        self.entries.get(&id).map(|r| r.snapshot(&self.qos))
    }

    /// Snapshots of every registration, sorted by id.
    pub fn snapshots(&self) -> Vec<RegistrationSnapshot> {
        let mut all: Vec<_> = self.entries.values().map(|r| r.snapshot(&self.qos)).collect();
        all.sort_by_key(|s| s.id);
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RegistrationTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use rstest::rstest;

    fn active_with(candidates: &[Rat], active: Rat) -> (RegistrationTable, RegistrationId) {
        let mut table = RegistrationTable::new();
        let id = table.insert(RoleRequest::new(1), CancellationToken::new());
        table.activate(id).unwrap();
        table
            .apply_candidates(
                id,
                CompatibleRats {
                    active,
                    candidates: candidates.to_vec(),
                },
            )
            .unwrap();
        (table, id)
    }

    #[test]
    fn test_ids_start_at_one_and_skip_in_use() {
        let mut table = RegistrationTable::new();
        let a = table.insert(RoleRequest::new(1), CancellationToken::new());
        assert_eq!(a, RegistrationId(1));

        table.next_id = REGISTRATION_ID_SENTINEL - 1;
        let b = table.insert(RoleRequest::new(1), CancellationToken::new());
        assert_eq!(b, RegistrationId(REGISTRATION_ID_SENTINEL - 1));
        // Wraps past the sentinel and skips id 1, which is still in use.
        let c = table.insert(RoleRequest::new(1), CancellationToken::new());
        assert_eq!(c, RegistrationId(2));
    }

    #[test]
    fn test_not_satisfied_walks_candidates_in_order() {
        let (mut table, id) = active_with(&[Rat::Wwan, Rat::Wlan], Rat::Wwan);
        assert_eq!(table.snapshot(id).unwrap().tried(), vec![Rat::Wwan]);

        let c = table.link_satisfaction(id, false).unwrap();
        assert_eq!(
            c,
            Confirmation {
                rat: Rat::Wlan,
                satisfied: false,
                change: LinkChange::Fallback
            }
        );
        table.commit(id, c).unwrap();
        let snap = table.snapshot(id).unwrap();
        assert_eq!(snap.active, Some(Rat::Wlan));
        assert_eq!(snap.tried(), vec![Rat::Wwan, Rat::Wlan]);

        let err = table.link_satisfaction(id, false).unwrap_err();
        assert!(matches!(err, CneError::NoMoreCandidates(_)));
        assert_eq!(table.snapshot(id).unwrap().active, Some(Rat::Wlan));
    }

    #[test]
    fn test_unnamed_rat_stays_untried_after_fallback() {
        let (mut table, id) = active_with(&[Rat::Wwan, Rat::Wlan, Rat::Other(2)], Rat::Wwan);

        let c = table.link_satisfaction(id, false).unwrap();
        assert_eq!(c.rat, Rat::Wlan);
        table.commit(id, c).unwrap();

        let snap = table.snapshot(id).unwrap();
        assert_eq!(snap.active, Some(Rat::Wlan));
        assert_eq!(snap.tried(), vec![Rat::Wwan, Rat::Wlan]);
        assert!(snap
            .candidates
            .iter()
            .any(|c| c.rat == Rat::Other(2) && !c.tried));
    }

    #[test]
    fn test_uncommitted_decision_leaves_state() {
        let (table, id) = active_with(&[Rat::Wwan, Rat::Wlan], Rat::Wwan);

        // Deciding twice without a commit picks the same fallback.
        let first = table.link_satisfaction(id, false).unwrap();
        let second = table.link_satisfaction(id, false).unwrap();
        assert_eq!(first, second);

        let snap = table.snapshot(id).unwrap();
        assert_eq!(snap.active, Some(Rat::Wwan));
        assert_eq!(snap.tried(), vec![Rat::Wwan]);
    }

    #[test]
    fn test_satisfied_confirms_active() {
        let (mut table, id) = active_with(&[Rat::Wlan], Rat::Wlan);
        let c = table.link_satisfaction(id, true).unwrap();
        assert_eq!(
            c,
            Confirmation {
                rat: Rat::Wlan,
                satisfied: true,
                change: LinkChange::Keep
            }
        );
        table.commit(id, c).unwrap();
        assert_eq!(table.snapshot(id).unwrap().active, Some(Rat::Wlan));
    }

    #[rstest]
    #[case::satisfaction(0)]
    #[case::switch(1)]
    #[case::reject(2)]
    fn test_operations_before_notice_fail(#[case] op: u8) {
        let mut table = RegistrationTable::new();
        let id = table.insert(RoleRequest::new(1), CancellationToken::new());
        table.activate(id).unwrap();

        let err = match op {
            0 => table.link_satisfaction(id, true).map(|_| ()),
            1 => table.accept_switch(id).map(|_| ()),
            _ => table.reject_switch(id).map(|_| ()),
        }
        .unwrap_err();
        assert!(matches!(err, CneError::NotYetNotified(r) if r == id));
    }

    #[test]
    fn test_operations_on_pending_registration_fail() {
        let mut table = RegistrationTable::new();
        let id = table.insert(RoleRequest::new(1), CancellationToken::new());
        let err = table.link_satisfaction(id, true).unwrap_err();
        assert!(matches!(err, CneError::RegistrationNotActive(_)));
        let err = table.link_satisfaction(RegistrationId(99), true).unwrap_err();
        assert!(matches!(err, CneError::UnknownRegistration(_)));
    }

    #[test]
    fn test_better_link_switch_and_reject() {
        let (mut table, id) = active_with(&[Rat::Wwan, Rat::Wlan], Rat::Wwan);

        assert!(table.offer_better_link(id, Rat::Wlan));
        let decline = table.reject_switch(id).unwrap();
        assert_eq!(decline.rat, Rat::Wwan);
        assert_eq!(decline.change, LinkChange::Decline);
        table.commit(id, decline).unwrap();
        assert!(matches!(
            table.accept_switch(id).unwrap_err(),
            CneError::NotYetNotified(_)
        ));

        assert!(table.offer_better_link(id, Rat::Wlan));
        let switch = table.accept_switch(id).unwrap();
        assert_eq!(switch.rat, Rat::Wlan);
        // Still offered until the switch is committed.
        assert_eq!(table.snapshot(id).unwrap().pending_switch, Some(Rat::Wlan));

        table.commit(id, switch).unwrap();
        let snap = table.snapshot(id).unwrap();
        assert_eq!(snap.active, Some(Rat::Wlan));
        assert_eq!(snap.pending_switch, None);
        assert!(notice::has_notice(snap.notices, notice::LINK_AVAILABLE));
        assert!(!notice::has_notice(snap.notices, notice::BETTER_LINK));
    }

    #[test]
    fn test_rat_lost_clears_link_notice() {
        let (mut table, id) = active_with(&[Rat::Wlan], Rat::Wlan);
        assert!(!table.rat_lost(id, Rat::Wwan));
        assert!(table.rat_lost(id, Rat::Wlan));
        let snap = table.snapshot(id).unwrap();
        assert_eq!(snap.active, None);
        assert!(!notice::has_notice(snap.notices, notice::LINK_AVAILABLE));
        assert!(!table.rat_lost(RegistrationId(42), Rat::Wlan));
    }

    #[test]
    fn test_remove_cascades_qos_and_unbinds() {
        let mut table = RegistrationTable::new();
        let unbind = CancellationToken::new();
        let id = table.insert(RoleRequest::new(1), unbind.clone());
        table.activate(id).unwrap();
        let spec = QosSpec {
            flow_class: 1,
            bandwidth_kbps: 64,
            filter: None,
        };
        table.track_qos(id, FlowId(10), spec.clone()).unwrap();
        table.track_qos(id, FlowId(11), spec).unwrap();

        assert!(table.remove(id).is_some());
        assert!(unbind.is_cancelled());
        assert!(table.qos().is_empty());
        assert!(!table.contains(id));
    }

    #[test]
    fn test_begin_deregister_once() {
        let mut table = RegistrationTable::new();
        let unbind = CancellationToken::new();
        let id = table.insert(RoleRequest::new(1), unbind.clone());
        assert_eq!(
            table.begin_deregister(id).unwrap(),
            RegistrationState::PendingRegister
        );
        assert!(unbind.is_cancelled());
        assert!(table.begin_deregister(id).is_err());
        assert!(table.ensure_active(id).is_err());
    }

    #[test]
    fn test_teardown_all() {
        let mut table = RegistrationTable::new();
        let a = table.insert(RoleRequest::new(1), CancellationToken::new());
        let b = table.insert(RoleRequest::new(2), CancellationToken::new());
        assert_eq!(table.teardown_all(), vec![a, b]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_compatible_rats_decode() {
        let mut buf = BytesMut::new();
        PayloadWriter::new(&mut buf)
            .put_i32(Rat::Wlan.code())
            .put_i32(2)
            .put_i32(Rat::Wlan.code())
            .put_i32(Rat::Wwan.code());
        let options = CompatibleRats::decode(PayloadReader::new(buf.freeze())).unwrap();
        assert_eq!(options.active, Rat::Wlan);
        assert_eq!(options.candidates, vec![Rat::Wlan, Rat::Wwan]);
    }

    #[test]
    fn test_compatible_rats_keeps_unnamed_codes() {
        let mut buf = BytesMut::new();
        PayloadWriter::new(&mut buf)
            .put_i32(0)
            .put_i32(3)
            .put_i32(0)
            .put_i32(1)
            .put_i32(2);
        let options = CompatibleRats::decode(PayloadReader::new(buf.freeze())).unwrap();
        assert_eq!(options.active, Rat::Wwan);
        assert_eq!(options.candidates, vec![Rat::Wwan, Rat::Wlan, Rat::Other(2)]);
    }

    #[test]
    fn test_compatible_rats_rejects_bad_count() {
        let mut buf = BytesMut::new();
        PayloadWriter::new(&mut buf).put_i32(0).put_i32(1000);
        assert!(CompatibleRats::decode(PayloadReader::new(buf.freeze())).is_err());
    }
}
