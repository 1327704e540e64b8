//! GT06 vehicle-tracker TCP device gateway.
//!
//! # Architecture
//!
//! Mirrors the layering `gt06-core` sets up: [`gt06_core::connection::Connection`]
//! is a pure action-based state machine, and this crate is the impure glue
//! that drives it with real sockets and turns its actions into session-
//! registry mutations and telemetry publishes.
//!
//! - [`GatewayDriver`]: turns connection-state-machine actions into registry/
//!   telemetry side effects and [`GatewayAction`]s for the transport layer.
//! - [`SessionRegistry`]: triple-indexed session bookkeeping over a
//!   [`SessionStore`].
//! - [`CommandOutbox`]: routes outbound commands to a live connection's
//!   write half.
//! - [`GatewayListener`]/[`GatewayStream`]: plain TCP transport.
//! - [`GatewaySessions`]/[`GatewayRuntime`]: wires the above into the
//!   per-connection task and TTL sweeper `main.rs` runs.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod outbox;
mod registry;
mod session;
pub mod storage;
mod system_env;
mod telemetry;
mod transport;

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use bytes::BytesMut;
pub use driver::{GatewayAction, GatewayDriver, GatewayDriverConfig, LogLevel};
pub use error::GatewayError;
use gt06_core::{connection::ConnectionConfig, Connection, Environment};
use gt06_proto::{command::CommandKind, frame::Frame, DecodeOutcome, FrameCodec};
pub use outbox::CommandOutbox;
pub use registry::SessionRegistry;
pub use session::DeviceSession;
pub use storage::{MemorySessionStore, SessionStore};
pub use system_env::SystemEnv;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::mpsc,
    task::AbortHandle,
};
pub use telemetry::{CellFix, LocationFix, SessionEvent, TelemetryEmitter, TracingTelemetryEmitter};
pub use transport::{GatewayListener, GatewayStream};

/// Gateway-wide configuration: the five recognized options plus the runtime
/// surface CLI/embedders need.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to bind the TCP listener to.
    pub bind_address: String,
    /// Session TTL and connection idle threshold, seconds.
    pub idle_timeout_seconds: u64,
    /// TTL sweeper period, seconds.
    pub cleanup_interval_seconds: u64,
    /// Hard cap on a single frame's total wire size. Documents the limit a
    /// real deployment would tune; the protocol layer's
    /// [`gt06_proto::MAX_FRAME_LENGTH`] constant is what's actually
    /// enforced today, so this field is not independently wired in.
    pub max_frame_length: usize,
    /// Reject frames whose CRC mismatches, instead of logging and
    /// accepting.
    pub strict_crc: bool,
    /// Reject frames whose stop bits fall outside the accepted set.
    pub strict_stop_bits: bool,
    /// Soft cap on concurrently accepted connections.
    pub max_connections: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5023".to_string(),
            idle_timeout_seconds: 600,
            cleanup_interval_seconds: 60,
            max_frame_length: 1024,
            strict_crc: false,
            strict_stop_bits: false,
            max_connections: 10_000,
        }
    }
}

impl GatewayConfig {
    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            handshake_timeout: gt06_core::connection::DEFAULT_HANDSHAKE_TIMEOUT,
            idle_timeout: Duration::from_secs(self.idle_timeout_seconds),
        }
    }
}

/// The registry, telemetry emitter, and command outbox a running gateway
/// shares across every per-connection task. Cheap to clone.
pub struct GatewaySessions<S, E, T>
where
    S: SessionStore,
    E: Environment,
    T: TelemetryEmitter,
{
    driver: GatewayDriver<S, E, T>,
    outbox: CommandOutbox,
}

impl<S, E, T> Clone for GatewaySessions<S, E, T>
where
    S: SessionStore,
    E: Environment,
    T: TelemetryEmitter,
{
    fn clone(&self) -> Self {
        Self { driver: self.driver.clone(), outbox: self.outbox.clone() }
    }
}

impl<S, E, T> GatewaySessions<S, E, T>
where
    S: SessionStore,
    E: Environment,
    T: TelemetryEmitter,
{
    /// Wires a registry and telemetry emitter into a fresh session table.
    pub fn new(registry: SessionRegistry<S, E>, telemetry: T) -> Self {
        Self { driver: GatewayDriver::new(registry, telemetry), outbox: CommandOutbox::new() }
    }

    /// The underlying session registry.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry<S, E> {
        self.driver.registry()
    }

    /// Sends `kind` to the device identified by `imei`.
    ///
    /// Per the delivery contract: looks up the session's bound connection
    /// and hands it the frame if one is live. Returns `false` (having
    /// already logged a warning) if no session exists for this IMEI or its
    /// connection is no longer live. No retry queue is kept - a dropped
    /// command is the caller's to reissue.
    pub fn send_command(&self, imei: &str, kind: &CommandKind) -> bool {
        let Some(mut session) = self.driver.registry().get_by_imei(imei) else {
            tracing::warn!(imei, "command dropped: no session for this imei");
            return false;
        };

        let Some(connection_id) = session.connection_id else {
            tracing::warn!(imei, "command dropped: session has no live connection");
            return false;
        };

        let serial = session.next_command_serial();
        self.driver.registry().save(&session);
        self.outbox.dispatch(connection_id, kind, serial)
    }
}

/// Tracks the abort handle for each live per-connection task, so the TTL
/// sweeper can make good on "closes the owning connection if still live"
/// for sessions it evicts out from under a connection that never
/// disconnected on its own.
#[derive(Clone, Default)]
struct ConnectionHandles {
    handles: Arc<Mutex<std::collections::HashMap<u64, AbortHandle>>>,
}

impl ConnectionHandles {
    #[allow(clippy::expect_used)]
    fn register(&self, connection_id: u64, handle: AbortHandle) {
        self.handles.lock().expect("connection handles lock poisoned").insert(connection_id, handle);
    }

    #[allow(clippy::expect_used)]
    fn unregister(&self, connection_id: u64) {
        self.handles.lock().expect("connection handles lock poisoned").remove(&connection_id);
    }

    #[allow(clippy::expect_used)]
    fn abort(&self, connection_id: u64) {
        if let Some(handle) = self.handles.lock().expect("connection handles lock poisoned").get(&connection_id) {
            handle.abort();
        }
    }
}

/// Owns the accept loop and TTL sweeper for a running gateway.
pub struct GatewayRuntime<S, E, T>
where
    S: SessionStore,
    E: Environment,
    T: TelemetryEmitter,
{
    config: GatewayConfig,
    sessions: GatewaySessions<S, E, T>,
    env: E,
    wall_clock_secs: Arc<dyn Fn() -> u64 + Send + Sync>,
    connection_handles: ConnectionHandles,
    next_connection_id: Arc<AtomicU64>,
    connection_slots: Arc<tokio::sync::Semaphore>,
}

impl<S, E, T> GatewayRuntime<S, E, T>
where
    S: SessionStore,
    E: Environment,
    T: TelemetryEmitter,
{
    /// Builds a runtime from a configuration, store, environment, telemetry
    /// emitter, and a wall-clock-seconds accessor (kept generic over a
    /// closure rather than tied to [`SystemEnv`] so tests can supply a
    /// fixed or virtual clock).
    pub fn new(
        config: GatewayConfig,
        store: S,
        env: E,
        telemetry: T,
        wall_clock_secs: impl Fn() -> u64 + Send + Sync + 'static,
    ) -> Self {
        let registry = SessionRegistry::new(store, env.clone());
        let connection_slots = Arc::new(tokio::sync::Semaphore::new(config.max_connections));
        Self {
            config,
            sessions: GatewaySessions::new(registry, telemetry),
            env,
            wall_clock_secs: Arc::new(wall_clock_secs),
            connection_handles: ConnectionHandles::default(),
            next_connection_id: Arc::new(AtomicU64::new(1)),
            connection_slots,
        }
    }

    /// The shared session table, for embedders that want to issue commands
    /// (e.g. from an HTTP control-plane endpoint) alongside running the
    /// gateway.
    #[must_use]
    pub fn sessions(&self) -> GatewaySessions<S, E, T> {
        self.sessions.clone()
    }

    /// Binds the configured address and runs the accept loop and TTL
    /// sweeper until an unrecoverable transport error occurs.
    pub async fn run(self) -> Result<(), GatewayError> {
        let listener = GatewayListener::bind(&self.config.bind_address).await?;
        self.serve(listener).await
    }

    /// Runs the accept loop and TTL sweeper against an already-bound
    /// listener. Split out from [`Self::run`] so callers that need to know
    /// the bound address (e.g. tests binding to port 0) can bind first and
    /// inspect [`GatewayListener::local_addr`] before serving.
    pub async fn serve(self, listener: GatewayListener) -> Result<(), GatewayError> {
        tracing::info!(bind_address = %self.config.bind_address, "gateway listening");

        let _sweeper = tokio::spawn(run_ttl_sweeper(
            self.sessions.clone(),
            self.connection_handles.clone(),
            Duration::from_secs(self.config.cleanup_interval_seconds),
            Duration::from_secs(self.config.idle_timeout_seconds),
            Arc::clone(&self.wall_clock_secs),
        ));

        loop {
            let stream = match listener.accept().await {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::warn!(%err, "accept failed, continuing");
                    continue;
                },
            };

            let Ok(permit) = Arc::clone(&self.connection_slots).acquire_owned().await else {
                tracing::error!("connection slot semaphore closed unexpectedly");
                continue;
            };

            let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
            let remote_address = stream.peer_addr();
            let sessions = self.sessions.clone();
            let env = self.env.clone();
            let wall_clock_secs = Arc::clone(&self.wall_clock_secs);
            let connection_handles = self.connection_handles.clone();
            let connection_config = self.config.connection_config();
            let strict_crc = self.config.strict_crc;
            let strict_stop_bits = self.config.strict_stop_bits;

            let task = tokio::spawn(async move {
                let _permit = permit;
                handle_connection(
                    stream,
                    connection_id,
                    remote_address,
                    sessions,
                    env,
                    wall_clock_secs,
                    connection_config,
                    strict_crc,
                    strict_stop_bits,
                )
                .await;
            });
            connection_handles.register(connection_id, task.abort_handle());
        }
    }
}

/// Runs a single accepted connection to completion: feeds read bytes
/// through a [`FrameCodec`] and the protocol state machine, and forwards
/// any frames the driver or the command outbox produce to the device.
#[allow(clippy::too_many_arguments)]
async fn handle_connection<S, E, T>(
    stream: GatewayStream,
    connection_id: u64,
    remote_address: SocketAddr,
    sessions: GatewaySessions<S, E, T>,
    env: E,
    wall_clock_secs: Arc<dyn Fn() -> u64 + Send + Sync>,
    connection_config: ConnectionConfig,
    strict_crc: bool,
    strict_stop_bits: bool,
) where
    S: SessionStore,
    E: Environment,
    T: TelemetryEmitter,
{
    let (mut read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    sessions.outbox.register(connection_id, tx.clone());

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(err) = write_half.write_all(&frame.to_bytes()).await {
                tracing::debug!(connection_id, %err, "write failed, closing connection");
                break;
            }
        }
    });

    let mut codec = FrameCodec::new();
    codec.strict_crc = strict_crc;
    codec.strict_stop_bits = strict_stop_bits;

    let mut conn = Connection::new(env.now(), connection_config);
    let mut read_buf = BytesMut::with_capacity(4096);
    let mut tick_interval = tokio::time::interval(Duration::from_secs(10));
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let close_reason = 'outer: loop {
        read_buf.resize(4096, 0);

        tokio::select! {
            result = read_half.read(&mut read_buf) => {
                match result {
                    Ok(0) => break 'outer "peer closed connection".to_string(),
                    Ok(n) => codec.feed(&read_buf[..n]),
                    Err(err) => break 'outer format!("read error: {err}"),
                }
            }
            _ = tick_interval.tick() => {
                for action in sessions.driver.tick(connection_id, &mut conn, env.now()) {
                    if let GatewayAction::Close { reason } = action {
                        break 'outer reason;
                    }
                }
                continue;
            }
        }

        loop {
            match codec.decode_next() {
                DecodeOutcome::Frame(frame) => {
                    let now = env.now();
                    let now_secs = (wall_clock_secs)();
                    match sessions.driver.handle_frame(
                        connection_id,
                        remote_address,
                        &mut conn,
                        &frame,
                        now,
                        now_secs,
                    ) {
                        Ok(actions) => {
                            for action in actions {
                                match action {
                                    GatewayAction::SendFrame(frame) => {
                                        let _ = tx.send(frame);
                                    },
                                    GatewayAction::Close { reason } => break 'outer reason,
                                    GatewayAction::Log { level, message } => match level {
                                        LogLevel::Debug => tracing::debug!(connection_id, message),
                                        LogLevel::Warn => tracing::warn!(connection_id, message),
                                    },
                                }
                            }
                        },
                        Err(err) => {
                            tracing::debug!(connection_id, %err, "frame rejected");
                        },
                    }
                },
                DecodeOutcome::SkippedGarbage { count } => {
                    tracing::debug!(connection_id, count, "skipped garbage bytes");
                },
                DecodeOutcome::NeedMoreData => break,
            }
        }
    };

    tracing::info!(connection_id, reason = %close_reason, "connection closed");
    sessions.driver.on_connection_closed(connection_id);
    sessions.outbox.unregister(connection_id);
    drop(tx);
    writer.abort();
}

/// Periodically evicts sessions idle past `idle_timeout` and, for any that
/// still had a live connection bound, aborts that connection's task.
async fn run_ttl_sweeper<S, E, T>(
    sessions: GatewaySessions<S, E, T>,
    connection_handles: ConnectionHandles,
    cleanup_interval: Duration,
    idle_timeout: Duration,
    wall_clock_secs: Arc<dyn Fn() -> u64 + Send + Sync>,
) where
    S: SessionStore,
    E: Environment,
    T: TelemetryEmitter,
{
    let mut interval = tokio::time::interval(cleanup_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let now_secs = (wall_clock_secs)();

        for id in sessions.registry().find_idle(now_secs, idle_timeout) {
            if let Some(session) = sessions.registry().evict(id) {
                tracing::info!(imei = %session.imei, "session evicted by ttl sweeper");
                if let Some(connection_id) = session.connection_id {
                    connection_handles.abort(connection_id);
                    connection_handles.unregister(connection_id);
                }
            }
        }
    }
}
