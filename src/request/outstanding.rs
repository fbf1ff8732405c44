//! Table of requests awaiting a solicited response.
//!
//! Shared by callers (insert) and the read loop (take). Every critical
//! section is a single map operation. The table also owns the connection
//! epoch: advancing the epoch and draining the table happen under one lock,
//! so a request obtained in an older epoch can never be inserted into a
//! newer one.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::pool::PendingRequest;
use crate::error::CneError;

#[derive(Debug, Default)]
struct TableState {
    epoch: u64,
    requests: HashMap<u32, PendingRequest>,
}

/// Outstanding requests keyed by serial.
#[derive(Debug, Default)]
pub struct OutstandingTable {
    state: Mutex<TableState>,
}

impl OutstandingTable {
    /// Create an empty table at epoch 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a request.
    ///
    /// # Errors
    ///
    /// Hands the request back with `PeerUnavailable` if it belongs to an
    /// earlier epoch, or with a protocol error if its serial is already
    /// outstanding.
    pub fn insert(&self, req: PendingRequest) -> Result<(), (PendingRequest, CneError)> {
        let mut state = self.state.lock();
        if req.epoch() != state.epoch {
            return Err((req, CneError::PeerUnavailable));
        }
        if state.requests.contains_key(&req.serial()) {
            let err = CneError::Protocol(format!("Serial {} already outstanding", req.serial()));
            return Err((req, err));
        }
        state.requests.insert(req.serial(), req);
        Ok(())
    }

    /// Remove and return the request with `serial`.
    pub fn take(&self, serial: u32) -> Option<PendingRequest> {
        self.state.lock().requests.remove(&serial)
    }

    /// Remove the request with `serial` only if `epoch` is still current.
    pub fn take_in_epoch(&self, serial: u32, epoch: u64) -> Option<PendingRequest> {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return None;
        }
        state.requests.remove(&serial)
    }

    /// Advance to a new epoch and return every request of the old one.
    pub fn advance_epoch(&self) -> (u64, Vec<PendingRequest>) {
        let mut state = self.state.lock();
        state.epoch += 1;
        let drained = state.requests.drain().map(|(_, req)| req).collect();
        (state.epoch, drained)
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.state.lock().requests.len()
    }

    /// True if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Outstanding serials, sorted (for diagnostics).
    pub fn serials(&self) -> Vec<u32> {
        let mut serials: Vec<u32> = self.state.lock().requests.keys().copied().collect();
        serials.sort_unstable();
        serials
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestType;
    use crate::request::RequestPool;

    #[test]
    fn test_insert_and_take() {
        let pool = RequestPool::default();
        let table = OutstandingTable::new();

        table.insert(pool.obtain(RequestType::Init)).unwrap();
        table.insert(pool.obtain(RequestType::RegisterRole)).unwrap();
        assert_eq!(table.serials(), vec![0, 1]);

        let req = table.take(1).unwrap();
        assert_eq!(req.request_type(), RequestType::RegisterRole);
        assert!(table.take(1).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_duplicate_serial_rejected() {
        let pool = RequestPool::default();
        let table = OutstandingTable::new();
        table.insert(pool.obtain(RequestType::Init)).unwrap();

        pool.begin_epoch(0);
        let (req, err) = table.insert(pool.obtain(RequestType::Init)).unwrap_err();
        assert_eq!(req.serial(), 0);
        assert!(matches!(err, CneError::Protocol(_)));
    }

    #[test]
    fn test_advance_epoch_drains() {
        let pool = RequestPool::default();
        let table = OutstandingTable::new();
        for _ in 0..3 {
            table.insert(pool.obtain(RequestType::Init)).unwrap();
        }

        let (epoch, drained) = table.advance_epoch();
        assert_eq!(epoch, 1);
        assert_eq!(drained.len(), 3);
        assert!(table.is_empty());
    }

    #[test]
    fn test_stale_epoch_rejected() {
        let pool = RequestPool::default();
        let table = OutstandingTable::new();
        let stale = pool.obtain(RequestType::Init);

        let (epoch, _) = table.advance_epoch();
        let (req, err) = table.insert(stale).unwrap_err();
        assert!(matches!(err, CneError::PeerUnavailable));
        assert_eq!(req.epoch(), 0);

        pool.begin_epoch(epoch);
        table.insert(pool.obtain(RequestType::Init)).unwrap();
    }

    #[test]
    fn test_take_in_epoch_ignores_reused_serial() {
        let pool = RequestPool::default();
        let table = OutstandingTable::new();
        let old = pool.obtain(RequestType::Init);
        let (old_serial, old_epoch) = (old.serial(), old.epoch());
        table.insert(old).unwrap();

        let (epoch, _) = table.advance_epoch();
        pool.begin_epoch(epoch);
        table.insert(pool.obtain(RequestType::ConfirmRat)).unwrap();

        assert!(table.take_in_epoch(old_serial, old_epoch).is_none());
        let req = table.take_in_epoch(0, epoch).unwrap();
        assert_eq!(req.request_type(), RequestType::ConfirmRat);
    }
}
