//! The device session record.
//!
//! A `DeviceSession` is the single logical record per device IMEI, owned
//! exclusively by the [`crate::registry::SessionRegistry`]. Connections never
//! own a session - they hold a connection-short-id that the registry maps
//! to one, and that mapping is reassigned wholesale on reconnect.

use std::{collections::HashMap, net::SocketAddr};

use gt06_core::DeviceVariant;

/// The single logical record per device, reachable by id, by IMEI, and
/// (while the owning connection is live) by connection-short-id.
///
/// Shape mirrors the `session:<uuid>` record a real KV-backed
/// [`crate::storage::SessionStore`] would serialize JSON-equivalently; the
/// in-process [`crate::storage::MemorySessionStore`] keeps it as a plain
/// struct since it never crosses a serialization boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSession {
    /// Opaque session identifier, generated once at first login.
    pub id: u128,
    /// The device's 15-digit IMEI.
    pub imei: String,
    /// Short identifier of the connection currently bound to this session.
    /// `None` if the owning connection has disconnected but the session
    /// record has not yet been evicted by TTL.
    pub connection_id: Option<u64>,
    /// Peer address of the bound connection, if any.
    pub remote_address: Option<SocketAddr>,
    /// Unix timestamp (seconds) the session was first created.
    pub created_at_secs: u64,
    /// Unix timestamp (seconds) of the most recent activity.
    pub last_activity_secs: u64,
    /// Whether the bound connection has completed login.
    pub authenticated: bool,
    /// Device sub-family, classified once at login and never recomputed.
    pub device_variant: Option<DeviceVariant>,
    /// Implementation-defined string metadata (e.g. firmware version tags).
    pub attributes: HashMap<String, String>,
    /// Whether a V5 status-advisory log has already fired for this session.
    pub has_received_status_advice: bool,
    /// Whether this session has ever produced a decoded location fix.
    pub has_received_location: bool,
    /// Server-side monotonic sequence number for outbound command frames,
    /// per §4.3 ("server-side monotonic per session, starting at 1").
    pub command_serial: u16,
}

impl DeviceSession {
    /// Creates a freshly-bound session for `imei` at `now_secs`.
    #[must_use]
    pub fn new(id: u128, imei: String, connection_id: u64, remote_address: SocketAddr, now_secs: u64) -> Self {
        Self {
            id,
            imei,
            connection_id: Some(connection_id),
            remote_address: Some(remote_address),
            created_at_secs: now_secs,
            last_activity_secs: now_secs,
            authenticated: true,
            device_variant: None,
            attributes: HashMap::new(),
            has_received_status_advice: false,
            has_received_location: false,
            command_serial: 0,
        }
    }

    /// Advances and returns the next outbound command serial for this
    /// session.
    pub fn next_command_serial(&mut self) -> u16 {
        self.command_serial = self.command_serial.wrapping_add(1);
        self.command_serial
    }

    /// Rebinds this session to a new connection, refreshing activity.
    ///
    /// Used on reconnect: the session id, IMEI, and accumulated flags
    /// survive; only the connection binding and address change.
    pub fn rebind(&mut self, connection_id: u64, remote_address: SocketAddr, now_secs: u64) {
        self.connection_id = Some(connection_id);
        self.remote_address = Some(remote_address);
        self.authenticated = true;
        self.last_activity_secs = now_secs;
    }

    /// Releases the connection binding without destroying the session
    /// record itself. Called when the owning connection closes; the TTL
    /// sweeper owns record destruction.
    pub fn unbind(&mut self) {
        self.connection_id = None;
        self.remote_address = None;
    }

    /// Seconds since the session's last recorded activity.
    #[must_use]
    pub fn idle_for_secs(&self, now_secs: u64) -> u64 {
        now_secs.saturating_sub(self.last_activity_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 5023)
    }

    #[test]
    fn new_session_is_authenticated_and_bound() {
        let session = DeviceSession::new(1, "123456789012345".to_string(), 7, addr(), 1000);
        assert!(session.authenticated);
        assert_eq!(session.connection_id, Some(7));
        assert_eq!(session.created_at_secs, 1000);
        assert_eq!(session.last_activity_secs, 1000);
    }

    #[test]
    fn rebind_updates_connection_and_keeps_identity() {
        let mut session = DeviceSession::new(1, "123456789012345".to_string(), 7, addr(), 1000);
        session.rebind(9, addr(), 2000);

        assert_eq!(session.id, 1);
        assert_eq!(session.imei, "123456789012345");
        assert_eq!(session.connection_id, Some(9));
        assert_eq!(session.last_activity_secs, 2000);
    }

    #[test]
    fn unbind_clears_connection_but_not_identity() {
        let mut session = DeviceSession::new(1, "123456789012345".to_string(), 7, addr(), 1000);
        session.unbind();

        assert_eq!(session.connection_id, None);
        assert_eq!(session.remote_address, None);
        assert_eq!(session.imei, "123456789012345");
    }

    #[test]
    fn idle_for_secs_saturates_at_zero() {
        let session = DeviceSession::new(1, "123456789012345".to_string(), 7, addr(), 1000);
        assert_eq!(session.idle_for_secs(1500), 500);
        assert_eq!(session.idle_for_secs(500), 0);
    }
}
