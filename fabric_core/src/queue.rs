//! # Bounded UDP Peer Queue
//!
//! The source's `model.QueueS` is a hand-rolled intrusive linked list with a
//! `max` cap, FIFO eviction, and an iterator whose fan-out loop has a real
//! bug (`e.Next()` used as a statement never advances `e`, see
//! SPEC_FULL.md's design notes). `BoundedAddrQueue` keeps the same contract
//! — insertion-ordered, capped, idempotent admission, `Renew` clears — on
//! top of a plain `VecDeque`, whose iterator can't repeat that mistake.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Mutex;

pub struct BoundedAddrQueue {
    max: usize,
    inner: Mutex<VecDeque<SocketAddr>>,
}

impl BoundedAddrQueue {
    pub fn new(max: usize) -> Self {
        Self { max, inner: Mutex::new(VecDeque::with_capacity(max)) }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.inner.lock().expect("queue lock poisoned").contains(addr)
    }

    /// Admits `addr`. A no-op if already admitted (not re-ordered to the
    /// back). Evicts the oldest entry first if already at `max`.
    pub fn push(&self, addr: SocketAddr) {
        let mut guard = self.inner.lock().expect("queue lock poisoned");
        if guard.contains(&addr) {
            return;
        }
        if guard.len() >= self.max && self.max > 0 {
            guard.pop_front();
        }
        if self.max > 0 {
            guard.push_back(addr);
        }
    }

    pub fn front(&self) -> Option<SocketAddr> {
        self.inner.lock().expect("queue lock poisoned").front().copied()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears every admitted peer — the `__FLUSH` control packet's effect.
    pub fn renew(&self) {
        self.inner.lock().expect("queue lock poisoned").clear();
    }

    /// Snapshot of every admitted address, front-to-back, for fan-out. A
    /// snapshot (rather than holding the lock across the UDP writes the
    /// caller is about to do) keeps `push`/`renew` from blocking on I/O.
    pub fn snapshot(&self) -> Vec<SocketAddr> {
        self.inner.lock().expect("queue lock poisoned").iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn fifo_eviction_at_capacity() {
        let q = BoundedAddrQueue::new(3);
        for p in [1, 2, 3, 4] {
            q.push(addr(p));
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.snapshot(), vec![addr(2), addr(3), addr(4)]);
    }

    #[test]
    fn push_on_contained_addr_is_a_noop() {
        let q = BoundedAddrQueue::new(3);
        q.push(addr(1));
        q.push(addr(2));
        q.push(addr(1));
        assert_eq!(q.snapshot(), vec![addr(1), addr(2)], "re-pushing does not reorder");
    }

    #[test]
    fn renew_clears_everything_and_is_idempotent() {
        let q = BoundedAddrQueue::new(2);
        q.push(addr(1));
        q.push(addr(2));
        q.renew();
        assert!(q.is_empty());
        q.renew();
        assert!(q.is_empty());
    }

    #[test]
    fn length_never_exceeds_max_under_any_admission_sequence() {
        let q = BoundedAddrQueue::new(5);
        for p in 0..100u16 {
            q.push(addr(p));
            assert!(q.len() <= q.max());
        }
    }
}
