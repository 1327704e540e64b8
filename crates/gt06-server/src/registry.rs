//! Session registry: the triple-indexed mapping from IMEI and connection
//! identity to a persisted [`DeviceSession`].
//!
//! Two of the three indices (`by_id`, `by_imei`) live behind the
//! [`SessionStore`] trait; `by_connection` is process-local only, since
//! connections are ephemeral and meaningless across a restart. Composite
//! operations (`create_or_rebind`, `remove_by_connection`, `evict`) that
//! read-then-write across indices take a single registry-wide lock rather
//! than a per-IMEI one - simpler to reason about, and still linearizable,
//! at the cost of serializing unrelated IMEIs during the critical section.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use gt06_core::Environment;

use crate::{session::DeviceSession, storage::SessionStore};

/// Process-wide session registry. Cheap to clone - the connection-binding
/// map and the store handle are both already reference-counted.
pub struct SessionRegistry<S, E>
where
    S: SessionStore,
    E: Environment,
{
    store: S,
    env: E,
    by_connection: Arc<Mutex<HashMap<u64, u128>>>,
    /// Serializes the composite read-then-write operations below.
    critical_section: Arc<Mutex<()>>,
}

impl<S, E> Clone for SessionRegistry<S, E>
where
    S: SessionStore,
    E: Environment,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            env: self.env.clone(),
            by_connection: Arc::clone(&self.by_connection),
            critical_section: Arc::clone(&self.critical_section),
        }
    }
}

impl<S, E> SessionRegistry<S, E>
where
    S: SessionStore,
    E: Environment,
{
    /// Creates a registry backed by `store`, using `env` for session-id
    /// generation.
    pub fn new(store: S, env: E) -> Self {
        Self {
            store,
            env,
            by_connection: Arc::new(Mutex::new(HashMap::new())),
            critical_section: Arc::new(Mutex::new(())),
        }
    }

    /// If a session exists for `imei`, rebinds it to `connection_id` and
    /// refreshes its activity; otherwise creates a fresh session. Either
    /// way the returned session is persisted before this call returns.
    #[allow(clippy::expect_used)]
    pub fn create_or_rebind(
        &self,
        imei: &str,
        connection_id: u64,
        remote_address: SocketAddr,
        now_secs: u64,
    ) -> DeviceSession {
        let _guard = self.critical_section.lock().expect("registry lock poisoned");

        let session = match self.store.load_by_imei(imei) {
            Some(mut existing) => {
                existing.rebind(connection_id, remote_address, now_secs);
                existing
            },
            None => {
                let id = self.env.random_u128();
                DeviceSession::new(id, imei.to_string(), connection_id, remote_address, now_secs)
            },
        };

        self.store.save(&session);
        self.by_connection
            .lock()
            .expect("connection map poisoned")
            .insert(connection_id, session.id);
        session
    }

    /// Looks up the session currently bound to `connection_id`.
    #[allow(clippy::expect_used)]
    pub fn get_by_connection(&self, connection_id: u64) -> Option<DeviceSession> {
        let id = *self.by_connection.lock().expect("connection map poisoned").get(&connection_id)?;
        self.store.load_by_id(id)
    }

    /// Looks up a session by IMEI.
    pub fn get_by_imei(&self, imei: &str) -> Option<DeviceSession> {
        self.store.load_by_imei(imei)
    }

    /// Looks up a session by its opaque id.
    pub fn get_by_id(&self, id: u128) -> Option<DeviceSession> {
        self.store.load_by_id(id)
    }

    /// Persists `session`, refreshing its TTL.
    pub fn save(&self, session: &DeviceSession) {
        self.store.save(session);
    }

    /// Releases the connection binding for `connection_id` without
    /// destroying the session record. The record persists until the TTL
    /// sweeper calls [`Self::evict`]. Returns the unbound session, if one
    /// was bound to this connection.
    #[allow(clippy::expect_used)]
    pub fn remove_by_connection(&self, connection_id: u64) -> Option<DeviceSession> {
        let _guard = self.critical_section.lock().expect("registry lock poisoned");

        let id = self.by_connection.lock().expect("connection map poisoned").remove(&connection_id)?;
        let mut session = self.store.load_by_id(id)?;
        session.unbind();
        self.store.save(&session);
        Some(session)
    }

    /// Ids of sessions idle for longer than `threshold`, as of `now_secs`.
    /// Delegates to the underlying store; see [`SessionStore::find_idle`].
    pub fn find_idle(&self, now_secs: u64, threshold: Duration) -> Vec<u128> {
        self.store.find_idle(now_secs, threshold)
    }

    /// Removes a session entirely from all three indices. Called by the
    /// TTL sweeper once a session has been reported idle.
    #[allow(clippy::expect_used)]
    pub fn evict(&self, id: u128) -> Option<DeviceSession> {
        let _guard = self.critical_section.lock().expect("registry lock poisoned");

        let session = self.store.load_by_id(id)?;
        self.store.delete(id);

        let mut by_connection = self.by_connection.lock().expect("connection map poisoned");
        if let Some(connection_id) = session.connection_id {
            by_connection.remove(&connection_id);
        }

        Some(session)
    }

    /// Total number of sessions currently persisted.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// True if no sessions are persisted.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
