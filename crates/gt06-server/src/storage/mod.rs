//! Session persistence abstraction.
//!
//! Stands in for the external key-value store of the `session:<uuid>` /
//! `imei-index:<imei>` layout: a trait-based seam so the registry never
//! depends on a concrete backend. Synchronous, like the upstream frame/MLS
//! storage abstraction this crate's layout is modeled on, to keep the trait
//! simple to implement and to mock.

mod memory;

use std::time::Duration;

pub use memory::MemorySessionStore;

use crate::session::DeviceSession;

/// Persistence abstraction for device sessions.
///
/// Must be `Clone` (passed to multiple driver instances/tasks), `Send +
/// Sync` (thread-safe), and synchronous. A production implementation would
/// back this with Redis/etcd and serialize [`DeviceSession`] JSON-
/// equivalently at the `session:<uuid>` / `imei-index:<imei>` keys; the
/// in-process [`MemorySessionStore`] is the shipped stand-in.
///
/// # Panics
///
/// Implementations may panic if an internal synchronization primitive is
/// poisoned (a thread panicked while holding a lock). Acceptable for the
/// in-process implementation; a production backend should instead surface
/// `RegistryUnavailable`-style degradation (reads return empty, writes log
/// and continue) at the call site, not panic.
pub trait SessionStore: Clone + Send + Sync + 'static {
    /// Persists `session`, refreshing its TTL.
    fn save(&self, session: &DeviceSession);

    /// Looks up a session by its opaque id.
    fn load_by_id(&self, id: u128) -> Option<DeviceSession>;

    /// Looks up a session by IMEI.
    fn load_by_imei(&self, imei: &str) -> Option<DeviceSession>;

    /// Removes a session record entirely (used by the TTL sweeper and
    /// explicit session destruction; a disconnect alone only unbinds the
    /// connection, it does not delete the record).
    fn delete(&self, id: u128);

    /// Returns ids of sessions whose idle time exceeds `threshold`,
    /// measured against `now_secs`. The caller supplies `now_secs` (rather
    /// than the store reading wall-clock time itself) so this stays
    /// testable against [`gt06_core::Environment`].
    fn find_idle(&self, now_secs: u64, threshold: Duration) -> Vec<u128>;

    /// Total number of sessions currently stored. For diagnostics/tests.
    fn len(&self) -> usize;

    /// True if no sessions are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
