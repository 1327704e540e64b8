//! Per-connection protocol state machine.
//!
//! Manages login/authentication lifecycle, ACK discipline, and idle
//! timeouts for a single device connection. Uses the action pattern:
//! methods take time (and an already-decoded [`Frame`]) as input and return
//! actions for the driver to execute. This keeps the state machine pure (no
//! I/O, no registry access) and makes testing straightforward - the session
//! registry and telemetry bus live one layer up, in the gateway driver.
//!
//! # State machine
//!
//! ```text
//! ┌──────┐   Login (valid IMEI)   ┌───────────────┐
//! │ Open │───────────────────────>│ Authenticated │
//! └──────┘                        └───────────────┘
//!     │                                   │
//!     │ idle timeout / I/O error          │ idle timeout / I/O error
//!     ↓                                   ↓
//! ┌─────────┐                       ┌─────────┐
//! │ Closing │<──────────────────────│ Closing │
//! └─────────┘                       └─────────┘
//!     │
//!     ↓
//! ┌────────┐
//! │ Closed │
//! └────────┘
//! ```

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use gt06_proto::{
    command::build_ack_frame,
    frame::Frame,
    opcode::Opcode,
    payload::{self, DecodedBody},
};

use crate::{
    error::ConnectionError,
    variant::{classify_variant, DeviceVariant},
};

/// Time allowed for a connection to send its first login frame.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default idle timeout: matches the session registry's default TTL
/// (`idle_timeout_seconds` = 600).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Severity for [`ConnectionAction::Log`]. The state machine never logs
/// directly - logging is an action the driver executes, keeping this crate
/// free of a tracing dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Warn,
}

/// Which family of body a failed decode was attempted against, so the
/// telemetry emitter can tag its "unparsable" marker without re-deriving it
/// from the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnparsableKind {
    Status,
    Location,
    Lbs,
}

/// Decoded, session-affecting outcomes of processing a frame. The driver
/// forwards these to the session registry and telemetry emitter.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Login succeeded: IMEI extracted and variant classified.
    LoggedIn { imei: String, variant: DeviceVariant },
    /// Login frame arrived but its body failed to decode to a valid IMEI.
    LoginFailed { reason: String },
    Heartbeat,
    Location(payload::Location),
    ExtendedLocation(payload::ExtendedLocation),
    Status(payload::Status),
    SingleCell(payload::CellInfo),
    MultiCell(Vec<payload::CellInfo>),
    CommandResponse,
    /// A structurally valid frame whose body failed to decode. Per §4.2/
    /// §4.5 the frame is still ACKed; this is the "best-effort telemetry
    /// with an unparsable marker" the driver publishes, distinct from the
    /// `Log` action emitted alongside it.
    Unparsable { kind: UnparsableKind, reason: String },
}

/// Actions returned by the connection state machine for the driver to
/// execute.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionAction {
    /// Write this frame back to the device.
    SendFrame(Frame),
    /// Forward this decoded event to the registry/telemetry layer.
    Emit(ConnectionEvent),
    /// Log a diagnostic message at the given level.
    Log { level: LogLevel, message: String },
    /// Close the connection with this reason.
    Close { reason: String },
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, no successful login yet.
    Open,
    /// Logged in with a valid IMEI.
    Authenticated,
    /// Closing: idle timeout or transport error observed, binding should be
    /// released. Transient - the owning worker tears down the socket and
    /// drops the connection immediately after.
    Closing,
    /// Terminal.
    Closed,
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Time allowed to receive the first login frame.
    pub handshake_timeout: Duration,
    /// Idle timeout once authenticated (and while awaiting login).
    pub idle_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Per-connection protocol state machine.
///
/// Pure: no I/O, no registry, no clock storage beyond what's passed in.
/// Generic over `Instant` so tests can drive it with virtual time.
#[derive(Debug, Clone)]
pub struct Connection<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    state: ConnectionState,
    config: ConnectionConfig,
    last_activity: I,
    imei: Option<String>,
    variant: Option<DeviceVariant>,
    has_received_status_advice: bool,
    has_received_location: bool,
}

impl<I> Connection<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Creates a new connection in [`ConnectionState::Open`].
    pub fn new(now: I, config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::Open,
            config,
            last_activity: now,
            imei: None,
            variant: None,
            has_received_status_advice: false,
            has_received_location: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// IMEI bound to this connection. `None` until login succeeds.
    #[must_use]
    pub fn imei(&self) -> Option<&str> {
        self.imei.as_deref()
    }

    /// Device variant classified at login. `None` until login succeeds.
    #[must_use]
    pub fn variant(&self) -> Option<DeviceVariant> {
        self.variant
    }

    #[must_use]
    pub fn has_received_location(&self) -> bool {
        self.has_received_location
    }

    /// Whether the once-per-session V5 status advisory log has already
    /// fired on this connection.
    #[must_use]
    pub fn has_received_status_advice(&self) -> bool {
        self.has_received_status_advice
    }

    /// Mark the connection closed immediately (peer disconnect).
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// Elapsed time since last activity, if the applicable timeout is
    /// exceeded. `None` otherwise or if already closing/closed.
    #[must_use]
    pub fn check_timeout(&self, now: I) -> Option<Duration> {
        let elapsed = now - self.last_activity;

        let timeout = match self.state {
            ConnectionState::Open => self.config.handshake_timeout,
            ConnectionState::Authenticated => self.config.idle_timeout,
            ConnectionState::Closing | ConnectionState::Closed => return None,
        };

        if elapsed > timeout { Some(elapsed) } else { None }
    }

    /// Periodic maintenance: detect idle timeout and transition to
    /// [`ConnectionState::Closing`] if exceeded.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        let Some(elapsed) = self.check_timeout(now) else {
            return Vec::new();
        };

        let reason = match self.state {
            ConnectionState::Open => format!("handshake timeout after {elapsed:?}"),
            ConnectionState::Authenticated => format!("idle timeout after {elapsed:?}"),
            ConnectionState::Closing | ConnectionState::Closed => unreachable!(),
        };

        self.state = ConnectionState::Closing;
        vec![ConnectionAction::Close { reason }]
    }

    /// Records a transport-level I/O failure: transitions to `Closing` so
    /// the driver releases the session binding without touching the
    /// session record itself.
    pub fn handle_io_error(&mut self, reason: impl Into<String>) -> Vec<ConnectionAction> {
        self.state = ConnectionState::Closing;
        vec![ConnectionAction::Close { reason: reason.into() }]
    }

    /// Processes one decoded, structurally valid frame (CRC/stop-bit
    /// policy has already been applied by the frame codec).
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::AuthRequired`] if a non-login opcode arrives on
    ///   an unauthenticated connection. The driver must not ACK in this
    ///   case (forces the device to (re)initiate login).
    pub fn handle_frame(
        &mut self,
        frame: &Frame,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        self.last_activity = now;

        if self.state == ConnectionState::Open && frame.opcode != Opcode::Login {
            return Err(ConnectionError::AuthRequired {
                state: self.state,
                opcode: frame.opcode.to_u8(),
            });
        }

        match frame.opcode {
            Opcode::Login => self.handle_login(frame),
            Opcode::Heartbeat => Ok(vec![
                ConnectionAction::Emit(ConnectionEvent::Heartbeat),
                self.ack(frame),
            ]),
            Opcode::Status => Ok(self.handle_status(frame)),
            opcode if opcode.is_location() => Ok(self.handle_location(frame, opcode)),
            opcode if opcode.is_lbs() => Ok(self.handle_lbs(frame, opcode)),
            Opcode::CommandResponse => Ok(vec![
                ConnectionAction::Log {
                    level: LogLevel::Debug,
                    message: format!("command response, serial {}", frame.serial),
                },
                ConnectionAction::Emit(ConnectionEvent::CommandResponse),
                self.ack(frame),
            ]),
            Opcode::Unknown(byte) => Ok(vec![
                ConnectionAction::Log {
                    level: LogLevel::Debug,
                    message: format!("unrecognized opcode {byte:#04x}"),
                },
                self.ack(frame),
            ]),
            // Gps/LbsPhone/LbsMultiple etc. are covered by the is_location()/
            // is_lbs() guards above; this arm is unreachable but keeps the
            // match total against future Opcode variants.
            _ => Ok(vec![self.ack(frame)]),
        }
    }

    fn handle_login(&mut self, frame: &Frame) -> Result<Vec<ConnectionAction>, ConnectionError> {
        let ack = self.ack(frame);

        match payload::decode_body(frame.opcode, &frame.body) {
            Ok(DecodedBody::Login { imei }) => {
                let variant =
                    *self.variant.get_or_insert_with(|| classify_variant(frame.body.len()));
                self.imei = Some(imei.clone());
                self.state = ConnectionState::Authenticated;

                Ok(vec![ConnectionAction::Emit(ConnectionEvent::LoggedIn { imei, variant }), ack])
            },
            Ok(_) => unreachable!("Opcode::Login only ever decodes to DecodedBody::Login"),
            Err(err) => Ok(vec![
                ConnectionAction::Emit(ConnectionEvent::LoginFailed { reason: err.to_string() }),
                ack,
            ]),
        }
    }

    fn handle_status(&mut self, frame: &Frame) -> Vec<ConnectionAction> {
        let ack = self.ack(frame);
        let mut actions = Vec::new();

        match payload::decode_body(frame.opcode, &frame.body) {
            Ok(DecodedBody::Status(status)) => {
                if self.variant == Some(DeviceVariant::V5) {
                    if !self.has_received_status_advice {
                        actions.push(ConnectionAction::Log {
                            level: LogLevel::Debug,
                            message: "V5 device: status frames are primary telemetry"
                                .to_string(),
                        });
                        self.has_received_status_advice = true;
                    }
                } else {
                    actions.push(ConnectionAction::Log {
                        level: LogLevel::Warn,
                        message: format!(
                            "unexpected status frame from non-V5 variant {:?}",
                            self.variant
                        ),
                    });
                }
                actions.push(ConnectionAction::Emit(ConnectionEvent::Status(status)));
            },
            Ok(_) => unreachable!("Opcode::Status only ever decodes to DecodedBody::Status"),
            Err(err) => {
                actions.push(ConnectionAction::Log {
                    level: LogLevel::Warn,
                    message: format!("status parse failed: {err}"),
                });
                actions.push(ConnectionAction::Emit(ConnectionEvent::Unparsable {
                    kind: UnparsableKind::Status,
                    reason: err.to_string(),
                }));
            },
        }

        actions.push(ack);
        actions
    }

    fn handle_location(&mut self, frame: &Frame, opcode: Opcode) -> Vec<ConnectionAction> {
        let ack = self.ack(frame);
        let mut actions = Vec::new();

        match payload::decode_body(opcode, &frame.body) {
            Ok(DecodedBody::Location(location)) => {
                self.has_received_location = true;
                actions.push(ConnectionAction::Emit(ConnectionEvent::Location(location)));
            },
            Ok(DecodedBody::ExtendedLocation(location)) => {
                self.has_received_location = true;
                actions.push(ConnectionAction::Emit(ConnectionEvent::ExtendedLocation(location)));
            },
            Ok(_) => unreachable!("location decode paths only return location variants"),
            Err(err) => {
                actions.push(ConnectionAction::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "location parse failed for opcode {:#04x}: {err}",
                        opcode.to_u8()
                    ),
                });
                actions.push(ConnectionAction::Emit(ConnectionEvent::Unparsable {
                    kind: UnparsableKind::Location,
                    reason: err.to_string(),
                }));
            },
        }

        actions.push(ack);
        actions
    }

    fn handle_lbs(&mut self, frame: &Frame, opcode: Opcode) -> Vec<ConnectionAction> {
        let ack = self.ack(frame);
        let mut actions = Vec::new();

        match payload::decode_body(opcode, &frame.body) {
            Ok(DecodedBody::SingleCell(cell)) => {
                actions.push(ConnectionAction::Emit(ConnectionEvent::SingleCell(cell)));
            },
            Ok(DecodedBody::MultiCell(cells)) => {
                actions.push(ConnectionAction::Emit(ConnectionEvent::MultiCell(cells)));
            },
            Ok(_) => unreachable!("LBS decode paths only return cell variants"),
            Err(err) => {
                actions.push(ConnectionAction::Log {
                    level: LogLevel::Warn,
                    message: format!("LBS parse failed for opcode {:#04x}: {err}", opcode.to_u8()),
                });
                actions.push(ConnectionAction::Emit(ConnectionEvent::Unparsable {
                    kind: UnparsableKind::Lbs,
                    reason: err.to_string(),
                }));
            },
        }

        actions.push(ack);
        actions
    }

    fn ack(&self, frame: &Frame) -> ConnectionAction {
        ConnectionAction::SendFrame(build_ack_frame(frame.opcode, frame.serial))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn login_frame(body: Vec<u8>, serial: u16) -> Frame {
        Frame {
            start_bits: 0x7878,
            opcode: Opcode::Login,
            body: Bytes::from(body),
            serial,
            crc: 0,
            stop_bits: 0x0D0A,
        }
    }

    fn imei_body() -> Vec<u8> {
        vec![0x01, 0x23, 0x45, 0x67, 0x89, 0x01, 0x23, 0x45]
    }

    #[test]
    fn starts_open_and_authenticates_on_valid_login() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());
        assert_eq!(conn.state(), ConnectionState::Open);

        let frame = login_frame(imei_body(), 1);
        let actions = conn.handle_frame(&frame, t0).unwrap();

        assert_eq!(conn.state(), ConnectionState::Authenticated);
        assert_eq!(conn.imei(), Some("123456789012345"));
        assert!(conn.variant().is_some());

        assert!(actions.iter().any(|a| matches!(
            a,
            ConnectionAction::Emit(ConnectionEvent::LoggedIn { .. })
        )));
        assert!(actions.iter().any(|a| matches!(a, ConnectionAction::SendFrame(_))));
    }

    #[test]
    fn variant_is_not_recomputed_on_second_login() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());
        conn.handle_frame(&login_frame(imei_body(), 1), t0).unwrap();
        let first_variant = conn.variant();

        // A body length that would classify differently if recomputed.
        let long_body = vec![0u8; 20];
        conn.handle_frame(&login_frame(long_body, 2), t0).unwrap();

        assert_eq!(conn.variant(), first_variant);
    }

    #[test]
    fn non_login_frame_before_auth_is_rejected() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());

        let heartbeat = Frame {
            start_bits: 0x7878,
            opcode: Opcode::Heartbeat,
            body: Bytes::new(),
            serial: 1,
            crc: 0,
            stop_bits: 0x0D0A,
        };

        let result = conn.handle_frame(&heartbeat, t0);
        assert!(matches!(result, Err(ConnectionError::AuthRequired { .. })));
        assert_eq!(conn.state(), ConnectionState::Open);
    }

    #[test]
    fn heartbeat_after_auth_acks_and_emits() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());
        conn.handle_frame(&login_frame(imei_body(), 1), t0).unwrap();

        let heartbeat = Frame {
            start_bits: 0x7878,
            opcode: Opcode::Heartbeat,
            body: Bytes::new(),
            serial: 2,
            crc: 0,
            stop_bits: 0x0D0A,
        };
        let actions = conn.handle_frame(&heartbeat, t0).unwrap();
        assert!(actions.iter().any(|a| matches!(a, ConnectionAction::Emit(ConnectionEvent::Heartbeat))));
        assert!(actions.iter().any(|a| matches!(a, ConnectionAction::SendFrame(f) if f.serial == 2)));
    }

    #[test]
    fn login_failure_still_acks_but_does_not_authenticate() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());

        let bad_body = vec![0xFA, 0x23, 0x45, 0x67, 0x89, 0x01, 0x23, 0x45];
        let actions = conn.handle_frame(&login_frame(bad_body, 1), t0).unwrap();

        assert_eq!(conn.state(), ConnectionState::Open);
        assert!(actions.iter().any(|a| matches!(
            a,
            ConnectionAction::Emit(ConnectionEvent::LoginFailed { .. })
        )));
        assert!(actions.iter().any(|a| matches!(a, ConnectionAction::SendFrame(_))));
    }

    #[test]
    fn idle_timeout_closes_connection() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());
        conn.handle_frame(&login_frame(imei_body(), 1), t0).unwrap();

        let t1 = t0 + DEFAULT_IDLE_TIMEOUT + Duration::from_secs(1);
        let actions = conn.tick(t1);
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(matches!(actions.as_slice(), [ConnectionAction::Close { .. }]));
    }

    #[test]
    fn handshake_timeout_closes_before_login() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());

        let t1 = t0 + DEFAULT_HANDSHAKE_TIMEOUT + Duration::from_secs(1);
        let actions = conn.tick(t1);
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(matches!(actions.as_slice(), [ConnectionAction::Close { .. }]));
    }

    #[test]
    fn v5_advisory_logs_exactly_once() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());
        // Short login body classifies as V5.
        conn.handle_frame(&login_frame(vec![0u8; 8], 1), t0).unwrap();
        assert_eq!(conn.variant(), Some(DeviceVariant::V5));

        let status_frame = Frame {
            start_bits: 0x7878,
            opcode: Opcode::Status,
            body: Bytes::from(vec![4, 3, 0]),
            serial: 2,
            crc: 0,
            stop_bits: 0x0D0A,
        };

        let first = conn.handle_frame(&status_frame, t0).unwrap();
        let advisory_count_first =
            first.iter().filter(|a| matches!(a, ConnectionAction::Log { .. })).count();
        assert_eq!(advisory_count_first, 1);

        let second = conn.handle_frame(&status_frame, t0).unwrap();
        let advisory_count_second =
            second.iter().filter(|a| matches!(a, ConnectionAction::Log { .. })).count();
        assert_eq!(advisory_count_second, 0);
    }

    #[test]
    fn location_frame_marks_has_received_location() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());
        conn.handle_frame(&login_frame(imei_body(), 1), t0).unwrap();
        assert!(!conn.has_received_location());

        let mut body = vec![24, 3, 15, 12, 34, 56, 0x0C, 8];
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes());
        body.push(0);
        body.extend_from_slice(&0u16.to_be_bytes());

        let location_frame = Frame {
            start_bits: 0x7878,
            opcode: Opcode::Gps(0x12),
            body: Bytes::from(body),
            serial: 2,
            crc: 0,
            stop_bits: 0x0D0A,
        };
        conn.handle_frame(&location_frame, t0).unwrap();
        assert!(conn.has_received_location());
    }

    #[test]
    fn unparsable_location_body_still_acks_and_emits_marker() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());
        conn.handle_frame(&login_frame(imei_body(), 1), t0).unwrap();

        let short_body_frame = Frame {
            start_bits: 0x7878,
            opcode: Opcode::Gps(0x12),
            body: Bytes::from(vec![1, 2, 3]),
            serial: 2,
            crc: 0,
            stop_bits: 0x0D0A,
        };
        let actions = conn.handle_frame(&short_body_frame, t0).unwrap();

        assert!(!conn.has_received_location());
        assert!(actions.iter().any(|a| matches!(a, ConnectionAction::SendFrame(_))));
        assert!(actions.iter().any(|a| matches!(
            a,
            ConnectionAction::Emit(ConnectionEvent::Unparsable { kind: UnparsableKind::Location, .. })
        )));
    }
}
