//! In-process `SessionStore` implementation.
//!
//! The `ttl_secs` an entry is saved with mirrors the TTL a real Redis/etcd
//! store would attach to the `session:<uuid>` / `imei-index:<imei>` keys;
//! this in-process store doesn't expire entries on its own clock, since
//! `find_idle`/`delete` (driven by the registry's TTL sweeper) is the
//! authoritative eviction path specified for the session registry.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use super::SessionStore;
use crate::session::DeviceSession;

#[derive(Default)]
struct Inner {
    by_id: HashMap<u128, DeviceSession>,
    by_imei: HashMap<String, u128>,
}

/// `Arc<Mutex<HashMap<..>>>`-backed [`SessionStore`]. Stands in for the
/// external key-value store of `session:<uuid>` / `imei-index:<imei>`
/// without a network dependency.
#[derive(Clone)]
pub struct MemorySessionStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySessionStore {
    /// Creates an empty store. `ttl_secs` documents the TTL a real backend
    /// would attach to each key; eviction itself is driven by the
    /// registry's TTL sweeper via [`SessionStore::find_idle`].
    #[must_use]
    pub fn new(ttl_secs: u64) -> Self {
        let _ = ttl_secs;
        Self { inner: Arc::new(Mutex::new(Inner::default())) }
    }
}

impl SessionStore for MemorySessionStore {
    #[allow(clippy::expect_used)]
    fn save(&self, session: &DeviceSession) {
        let mut inner = self.inner.lock().expect("session store mutex poisoned");
        inner.by_imei.insert(session.imei.clone(), session.id);
        inner.by_id.insert(session.id, session.clone());
    }

    #[allow(clippy::expect_used)]
    fn load_by_id(&self, id: u128) -> Option<DeviceSession> {
        let inner = self.inner.lock().expect("session store mutex poisoned");
        inner.by_id.get(&id).cloned()
    }

    #[allow(clippy::expect_used)]
    fn load_by_imei(&self, imei: &str) -> Option<DeviceSession> {
        let inner = self.inner.lock().expect("session store mutex poisoned");
        let id = *inner.by_imei.get(imei)?;
        inner.by_id.get(&id).cloned()
    }

    #[allow(clippy::expect_used)]
    fn delete(&self, id: u128) {
        let mut inner = self.inner.lock().expect("session store mutex poisoned");
        if let Some(session) = inner.by_id.remove(&id) {
            inner.by_imei.remove(&session.imei);
        }
    }

    #[allow(clippy::expect_used)]
    fn find_idle(&self, now_secs: u64, threshold: Duration) -> Vec<u128> {
        let inner = self.inner.lock().expect("session store mutex poisoned");
        inner
            .by_id
            .values()
            .filter(|session| session.idle_for_secs(now_secs) > threshold.as_secs())
            .map(|session| session.id)
            .collect()
    }

    #[allow(clippy::expect_used)]
    fn len(&self) -> usize {
        let inner = self.inner.lock().expect("session store mutex poisoned");
        inner.by_id.len()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    use super::*;

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 5023)
    }

    fn session(id: u128, imei: &str, now_secs: u64) -> DeviceSession {
        DeviceSession::new(id, imei.to_string(), 1, addr(), now_secs)
    }

    #[test]
    fn save_then_load_by_id_and_imei() {
        let store = MemorySessionStore::new(600);
        let s = session(1, "123456789012345", 1000);
        store.save(&s);

        assert_eq!(store.load_by_id(1), Some(s.clone()));
        assert_eq!(store.load_by_imei("123456789012345"), Some(s));
    }

    #[test]
    fn load_missing_returns_none() {
        let store = MemorySessionStore::new(600);
        assert_eq!(store.load_by_id(999), None);
        assert_eq!(store.load_by_imei("000000000000000"), None);
    }

    #[test]
    fn delete_removes_both_indices() {
        let store = MemorySessionStore::new(600);
        let s = session(1, "123456789012345", 1000);
        store.save(&s);
        store.delete(1);

        assert_eq!(store.load_by_id(1), None);
        assert_eq!(store.load_by_imei("123456789012345"), None);
    }

    #[test]
    fn find_idle_returns_sessions_past_threshold() {
        let store = MemorySessionStore::new(10_000);
        let s = session(1, "123456789012345", 1000);
        store.save(&s);

        assert!(store.find_idle(1000 + 600, Duration::from_secs(600)).is_empty());
        assert_eq!(store.find_idle(1000 + 601, Duration::from_secs(600)), vec![1]);
    }

    #[test]
    fn empty_sweeper_call_is_safe() {
        let store = MemorySessionStore::new(600);
        assert!(store.find_idle(0, Duration::from_secs(600)).is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn save_overwrites_previous_entry_for_same_id() {
        let store = MemorySessionStore::new(600);
        let mut s = session(1, "123456789012345", 1000);
        store.save(&s);
        s.last_activity_secs = 2000;
        store.save(&s);

        assert_eq!(store.len(), 1);
        assert_eq!(store.load_by_id(1).map(|s| s.last_activity_secs), Some(2000));
    }
}
