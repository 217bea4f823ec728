//! # Remote Readiness Cell
//!
//! In the Go source, `UDPForward`, `TCP2UDPForward` and `UART2UDPForward` all
//! close over a bare `remoteConn` variable: one goroutine (the remote
//! endpoint's `Open` handler) assigns it, another (the local side's
//! `Message` handler) reads it, with no synchronization at all. That's a
//! data race — see SPEC_FULL.md's design notes for the source bug this
//! fixes.
//!
//! `ReadyCell` is the synchronized replacement: a write-once-per-lifetime
//! slot built on [`arc_swap::ArcSwapOption`]. The remote's `Open` handler
//! calls [`ReadyCell::set`]; the local side's `Message` handler calls
//! [`ReadyCell::get`] and drops the datagram/bytes if the remote isn't up
//! yet, matching the source's intended (if accidentally-racy) behavior.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

pub struct ReadyCell<T>(ArcSwapOption<T>);

impl<T> ReadyCell<T> {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self(ArcSwapOption::from(None)))
    }

    /// Publishes the handle. Only the first call has any effect — later
    /// calls are no-ops, since a remote endpoint opens exactly once per
    /// forwarder-pair lifetime.
    pub fn set(&self, value: T) {
        self.0.compare_and_swap(&None::<Arc<T>>, Some(Arc::new(value)));
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.0.load_full()
    }

    pub fn is_ready(&self) -> bool {
        self.0.load().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty_and_publishes_once() {
        let cell = ReadyCell::<u32>::empty();
        assert!(cell.get().is_none());
        cell.set(7);
        assert_eq!(*cell.get().unwrap(), 7);
        cell.set(9);
        assert_eq!(*cell.get().unwrap(), 7, "first publish wins");
    }
}
