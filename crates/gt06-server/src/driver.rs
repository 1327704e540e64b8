//! Gateway driver: wires the codec and connection state machine to the
//! session registry and telemetry emitter.
//!
//! [`gt06_core::Connection`] is pure - it returns [`ConnectionAction`]s and
//! never touches the registry or the bus. `GatewayDriver` is the one place
//! those actions get turned into registry mutations and telemetry
//! publishes, and into [`GatewayAction`]s for the per-connection task to
//! execute (write a frame, close the socket, emit a log line).

use std::{net::SocketAddr, ops::Sub, time::Duration};

use gt06_core::{
    connection::{Connection, ConnectionAction, ConnectionConfig, ConnectionEvent},
    ConnectionError, Environment, UnparsableKind,
};
pub use gt06_core::LogLevel;
use gt06_proto::frame::Frame;

use crate::{
    registry::SessionRegistry,
    storage::SessionStore,
    telemetry::{CellFix, LocationFix, SessionEvent, TelemetryEmitter},
};

/// Gateway-level configuration: just the connection timeouts today, but a
/// distinct type from [`ConnectionConfig`] so the runtime layer (CLI,
/// registry TTLs) has a place to grow independently of the protocol layer.
#[derive(Debug, Clone)]
pub struct GatewayDriverConfig {
    /// Per-connection handshake/idle timeouts.
    pub connection: ConnectionConfig,
}

impl Default for GatewayDriverConfig {
    fn default() -> Self {
        Self { connection: ConnectionConfig::default() }
    }
}

/// Actions the per-connection task must execute. Unlike [`ConnectionAction`]
/// these have already had their registry/telemetry side effects applied -
/// the task only needs to push bytes, close the socket, or emit a log.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayAction {
    /// Write this frame back to the device.
    SendFrame(Frame),
    /// Close the connection with this reason.
    Close {
        /// Human-readable close reason, for logging.
        reason: String,
    },
    /// Log a diagnostic message at the given level.
    Log {
        /// Severity.
        level: LogLevel,
        /// Message text.
        message: String,
    },
}

/// Ties a [`SessionRegistry`] and a [`TelemetryEmitter`] to the pure
/// connection state machine. One driver instance is shared (cloned) across
/// every per-connection task in the process.
pub struct GatewayDriver<S, E, T>
where
    S: SessionStore,
    E: Environment,
    T: TelemetryEmitter,
{
    registry: SessionRegistry<S, E>,
    telemetry: T,
}

impl<S, E, T> Clone for GatewayDriver<S, E, T>
where
    S: SessionStore,
    E: Environment,
    T: TelemetryEmitter,
{
    fn clone(&self) -> Self {
        Self { registry: self.registry.clone(), telemetry: self.telemetry.clone() }
    }
}

impl<S, E, T> GatewayDriver<S, E, T>
where
    S: SessionStore,
    E: Environment,
    T: TelemetryEmitter,
{
    /// Creates a driver over `registry` and `telemetry`.
    pub fn new(registry: SessionRegistry<S, E>, telemetry: T) -> Self {
        Self { registry, telemetry }
    }

    /// The backing session registry, for the TTL sweeper and diagnostics.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry<S, E> {
        &self.registry
    }

    /// Drives `conn`'s state machine with `frame` and applies the registry/
    /// telemetry side effects of any resulting event.
    ///
    /// # Errors
    ///
    /// Propagates [`ConnectionError::AuthRequired`] verbatim: a non-login
    /// frame on an unauthenticated connection. Per §4.5/§7, the caller must
    /// not ACK and should simply log-and-continue rather than close the
    /// connection - a flaky device retrying login is expected, not fatal.
    pub fn handle_frame<I>(
        &self,
        connection_id: u64,
        remote_address: SocketAddr,
        conn: &mut Connection<I>,
        frame: &Frame,
        now: I,
        now_secs: u64,
    ) -> Result<Vec<GatewayAction>, ConnectionError>
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        let actions = conn.handle_frame(frame, now)?;
        let mut out = Vec::with_capacity(actions.len());

        for action in actions {
            match action {
                ConnectionAction::SendFrame(frame) => out.push(GatewayAction::SendFrame(frame)),
                ConnectionAction::Log { level, message } => {
                    out.push(GatewayAction::Log { level, message });
                },
                ConnectionAction::Close { reason } => {
                    self.on_connection_closed(connection_id);
                    out.push(GatewayAction::Close { reason });
                },
                ConnectionAction::Emit(event) => {
                    out.extend(self.handle_event(connection_id, remote_address, &*conn, event, now_secs));
                },
            }
        }

        Ok(out)
    }

    /// Runs periodic connection maintenance (idle/handshake timeout) and
    /// applies the same registry side effects a transport-level close would.
    pub fn tick<I>(&self, connection_id: u64, conn: &mut Connection<I>, now: I) -> Vec<GatewayAction>
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        conn.tick(now)
            .into_iter()
            .map(|action| match action {
                ConnectionAction::Close { reason } => {
                    self.on_connection_closed(connection_id);
                    GatewayAction::Close { reason }
                },
                ConnectionAction::SendFrame(frame) => GatewayAction::SendFrame(frame),
                ConnectionAction::Log { level, message } => GatewayAction::Log { level, message },
                ConnectionAction::Emit(_) => {
                    unreachable!("tick() never emits a session event")
                },
            })
            .collect()
    }

    /// Releases the connection's session binding and publishes a
    /// disconnect event, if a session was bound. Called for every path
    /// that ends a connection: idle timeout, I/O error, and graceful close.
    pub fn on_connection_closed(&self, connection_id: u64) {
        if let Some(session) = self.registry.remove_by_connection(connection_id) {
            self.telemetry.publish_session_event(&session.imei, SessionEvent::Disconnected);
        }
    }

    fn handle_event<I>(
        &self,
        connection_id: u64,
        remote_address: SocketAddr,
        conn: &Connection<I>,
        event: ConnectionEvent,
        now_secs: u64,
    ) -> Vec<GatewayAction>
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        match event {
            ConnectionEvent::LoggedIn { imei, variant } => {
                let rebinding = self.registry.get_by_imei(&imei).is_some();
                let mut session =
                    self.registry.create_or_rebind(&imei, connection_id, remote_address, now_secs);

                if session.device_variant.is_none() {
                    session.device_variant = Some(variant);
                    self.registry.save(&session);
                }

                let event =
                    if rebinding { SessionEvent::Rebound } else { SessionEvent::Connected };
                self.telemetry.publish_session_event(&imei, event);
                Vec::new()
            },
            ConnectionEvent::LoginFailed { reason } => {
                vec![GatewayAction::Log {
                    level: LogLevel::Warn,
                    message: format!("login failed: {reason}"),
                }]
            },
            ConnectionEvent::Heartbeat => {
                self.touch(connection_id, conn, now_secs);
                Vec::new()
            },
            ConnectionEvent::Location(location) => {
                if let Some(imei) = self.touch(connection_id, conn, now_secs) {
                    self.telemetry.publish_location(&imei, &LocationFix::Standard(location));
                }
                Vec::new()
            },
            ConnectionEvent::ExtendedLocation(location) => {
                if let Some(imei) = self.touch(connection_id, conn, now_secs) {
                    self.telemetry.publish_location(&imei, &LocationFix::Extended(location));
                }
                Vec::new()
            },
            ConnectionEvent::Status(status) => {
                if let Some(imei) = self.touch(connection_id, conn, now_secs) {
                    self.telemetry.publish_status(&imei, &status);
                }
                Vec::new()
            },
            ConnectionEvent::SingleCell(cell) => {
                if let Some(imei) = self.touch(connection_id, conn, now_secs) {
                    self.telemetry.publish_cell(&imei, &CellFix::Single(cell));
                }
                Vec::new()
            },
            ConnectionEvent::MultiCell(cells) => {
                if let Some(imei) = self.touch(connection_id, conn, now_secs) {
                    self.telemetry.publish_cell(&imei, &CellFix::Multi(cells));
                }
                Vec::new()
            },
            ConnectionEvent::CommandResponse => {
                vec![GatewayAction::Log {
                    level: LogLevel::Debug,
                    message: "command response correlated by serial".to_string(),
                }]
            },
            ConnectionEvent::Unparsable { kind, reason } => {
                if let Some(imei) = self.touch(connection_id, conn, now_secs) {
                    self.telemetry.publish_unparsable(&imei, kind, &reason);
                }
                Vec::new()
            },
        }
    }

    /// Refreshes the session's activity timestamp, monotonically folds in
    /// this connection's "have we ever seen a status/location frame" flags
    /// (§3/§6.2 - a session record must not regress to `false` across a
    /// reconnect just because the new [`Connection`] starts with fresh
    /// per-connection flags), and returns the session's IMEI.
    fn touch<I>(&self, connection_id: u64, conn: &Connection<I>, now_secs: u64) -> Option<String>
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        let mut session = self.registry.get_by_connection(connection_id)?;
        session.last_activity_secs = now_secs;
        session.has_received_location |= conn.has_received_location();
        session.has_received_status_advice |= conn.has_received_status_advice();
        let imei = session.imei.clone();
        self.registry.save(&session);
        Some(imei)
    }
}
