//! # Connection Registry
//!
//! The source's `model.SyncMapHub` wraps a `sync.Map` keyed by remote
//! address, storing a `{Tag, Conn}` pair per live connection. `RegistryByAddr`
//! is the same shape behind a plain `Mutex<HashMap<..>>` — the hub only ever
//! grows/shrinks one entry at a time and is read for iteration (broadcast),
//! so a lock held for the duration of one call is simpler than a concurrent
//! map and carries no real cost here.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

/// One logical connection held in the registry.
#[derive(Clone)]
pub struct ClientRecord<C> {
    /// Empty means "generic connection", matching the source's `Tag: ""`.
    pub tag: String,
    pub conn: C,
}

impl<C> ClientRecord<C> {
    pub fn generic(conn: C) -> Self {
        Self { tag: String::new(), conn }
    }

    pub fn tagged(tag: impl Into<String>, conn: C) -> Self {
        Self { tag: tag.into(), conn }
    }
}

/// Thread-safe `remote address -> ClientRecord` map for connection-oriented
/// transports (TCP, WS).
pub struct RegistryByAddr<C> {
    tag: String,
    inner: Mutex<HashMap<SocketAddr, ClientRecord<C>>>,
}

impl<C: Clone> RegistryByAddr<C> {
    pub fn init(tag: impl Into<String>) -> Self {
        Self { tag: tag.into(), inner: Mutex::new(HashMap::new()) }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn set(&self, addr: SocketAddr, rec: ClientRecord<C>) {
        self.inner.lock().expect("registry lock poisoned").insert(addr, rec);
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<ClientRecord<C>> {
        self.inner.lock().expect("registry lock poisoned").get(addr).cloned()
    }

    pub fn del(&self, addr: &SocketAddr) -> Option<ClientRecord<C>> {
        self.inner.lock().expect("registry lock poisoned").remove(addr)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates a consistent snapshot of `(rank, addr, record)`. `f` returning
    /// `false` stops iteration early, matching the source's `Iterator`.
    pub fn iter<F>(&self, mut f: F)
    where
        F: FnMut(usize, &SocketAddr, &ClientRecord<C>) -> bool,
    {
        let snapshot: Vec<(SocketAddr, ClientRecord<C>)> = {
            let guard = self.inner.lock().expect("registry lock poisoned");
            guard.iter().map(|(addr, rec)| (*addr, rec.clone())).collect()
        };
        for (rank, (addr, rec)) in snapshot.iter().enumerate() {
            if !f(rank, addr, rec) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn set_get_del_roundtrip() {
        let reg: RegistryByAddr<u32> = RegistryByAddr::init("test");
        assert!(reg.is_empty());
        reg.set(addr(1), ClientRecord::generic(42));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(&addr(1)).unwrap().conn, 42);
        let removed = reg.del(&addr(1)).unwrap();
        assert_eq!(removed.conn, 42);
        assert!(reg.is_empty());
    }

    #[test]
    fn iterator_can_stop_early() {
        let reg: RegistryByAddr<u32> = RegistryByAddr::init("test");
        for i in 0..5 {
            reg.set(addr(i), ClientRecord::generic(i as u32));
        }
        let mut seen = 0;
        reg.iter(|rank, _addr, _rec| {
            seen = rank + 1;
            rank < 1
        });
        assert_eq!(seen, 2);
    }

    #[test]
    fn registry_size_returns_to_baseline_after_close() {
        let reg: RegistryByAddr<u32> = RegistryByAddr::init("test");
        let before = reg.len();
        reg.set(addr(9), ClientRecord::generic(1));
        reg.del(&addr(9));
        assert_eq!(reg.len(), before);
    }
}
