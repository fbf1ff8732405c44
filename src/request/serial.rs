//! Serial number allocation.
//!
//! Serials correlate solicited responses with requests. They are unique
//! while outstanding within one connection epoch and restart at 0 when a
//! new connection is established. The counter sits behind its own lock,
//! separate from the buffer pool.

use parking_lot::Mutex;

#[derive(Debug)]
struct SerialState {
    epoch: u64,
    next: u32,
}

/// Monotonic serial counter scoped to a connection epoch.
#[derive(Debug)]
pub struct SerialAllocator {
    state: Mutex<SerialState>,
}

impl SerialAllocator {
    /// Create an allocator at epoch 0, serial 0.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SerialState { epoch: 0, next: 0 }),
        }
    }

    /// Allocate the next serial, returning it with the epoch it belongs to.
    pub fn next(&self) -> (u64, u32) {
        let mut state = self.state.lock();
        let serial = state.next;
        state.next = state.next.wrapping_add(1);
        (state.epoch, serial)
    }

    /// Start a new epoch; the next serial handed out is 0.
    pub fn reset(&self, epoch: u64) {
        let mut state = self.state.lock();
        state.epoch = epoch;
        state.next = 0;
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Serial that the next call to [`next`](Self::next) will return.
    pub fn peek(&self) -> u32 {
        self.state.lock().next
    }
}

impl Default for SerialAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_sequential_serials() {
        let serials = SerialAllocator::new();
        assert_eq!(serials.next(), (0, 0));
        assert_eq!(serials.next(), (0, 1));
        assert_eq!(serials.peek(), 2);
    }

    #[test]
    fn test_reset_restarts_at_zero() {
        let serials = SerialAllocator::new();
        serials.next();
        serials.next();
        serials.reset(3);
        assert_eq!(serials.epoch(), 3);
        assert_eq!(serials.next(), (3, 0));
    }

    #[test]
    fn test_concurrent_serials_are_distinct() {
        let serials = Arc::new(SerialAllocator::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let serials = serials.clone();
                std::thread::spawn(move || (0..500).map(|_| serials.next().1).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for t in threads {
            for serial in t.join().unwrap() {
                assert!(seen.insert(serial), "serial {} handed out twice", serial);
            }
        }
        assert_eq!(seen.len(), 8 * 500);
    }
}
