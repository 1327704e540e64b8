//! Error types for the GT06 connection layer.
//!
//! Strongly-typed errors for connection-level failures (state transitions,
//! authentication, timeouts). Transport and parse errors are wrapped rather
//! than surfaced as raw `std::io::Error`/`gt06_proto::ProtocolError`, so
//! callers can match on connection semantics without reaching into lower
//! layers.

use std::{io, time::Duration};

use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors that can occur during connection state machine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Invalid state transition attempted.
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when the error occurred.
        state: ConnectionState,
        /// Operation that was attempted.
        operation: String,
    },

    /// A non-login frame arrived on a connection that has not authenticated.
    #[error("opcode {opcode:#04x} requires authentication, connection is in {state:?}")]
    AuthRequired {
        /// Current state when the frame arrived.
        state: ConnectionState,
        /// Opcode of the frame.
        opcode: u8,
    },

    /// Handshake (first login frame) did not arrive within timeout.
    #[error("handshake timeout after {elapsed:?}")]
    HandshakeTimeout {
        /// How long we waited.
        elapsed: Duration,
    },

    /// Connection idle timeout exceeded.
    #[error("idle timeout after {elapsed:?}")]
    IdleTimeout {
        /// How long the connection was idle.
        elapsed: Duration,
    },

    /// Frame body failed structural validation for its opcode.
    #[error("payload parse failed for opcode {opcode:#04x}: {reason}")]
    InvalidPayload {
        /// Opcode the body was being parsed for.
        opcode: u8,
        /// Underlying parse failure.
        reason: String,
    },

    /// Protocol error from frame parsing/validation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Underlying transport error.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ConnectionError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Timeouts are transient. Protocol violations and auth failures are
    /// never transient - they indicate a broken device or a skipped login.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::HandshakeTimeout { .. } | Self::IdleTimeout { .. })
    }
}

/// Convert `ConnectionError` to `io::Error` for compatibility with async I/O
/// APIs.
impl From<ConnectionError> for io::Error {
    fn from(err: ConnectionError) -> Self {
        let kind = match &err {
            ConnectionError::HandshakeTimeout { .. } | ConnectionError::IdleTimeout { .. } => {
                io::ErrorKind::TimedOut
            },
            ConnectionError::InvalidState { .. }
            | ConnectionError::AuthRequired { .. }
            | ConnectionError::Protocol(_)
            | ConnectionError::InvalidPayload { .. } => io::ErrorKind::InvalidData,
            ConnectionError::Transport(_) => io::ErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

/// Convert gt06-proto errors to `ConnectionError`.
impl From<gt06_proto::ProtocolError> for ConnectionError {
    fn from(err: gt06_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Convert `io::Error` to `ConnectionError` (for transport errors).
impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_errors_are_transient() {
        assert!(
            ConnectionError::HandshakeTimeout { elapsed: Duration::from_secs(31) }.is_transient()
        );
        assert!(ConnectionError::IdleTimeout { elapsed: Duration::from_secs(61) }.is_transient());
    }

    #[test]
    fn protocol_violations_are_fatal() {
        assert!(
            !ConnectionError::InvalidState {
                state: ConnectionState::Open,
                operation: "send_login".to_string(),
            }
            .is_transient()
        );

        assert!(
            !ConnectionError::AuthRequired { state: ConnectionState::Open, opcode: 0x12 }
                .is_transient()
        );

        assert!(
            !ConnectionError::InvalidPayload { opcode: 0x01, reason: "short body".to_string() }
                .is_transient()
        );

        assert!(!ConnectionError::Protocol("test error".to_string()).is_transient());
        assert!(!ConnectionError::Transport("network error".to_string()).is_transient());
    }
}
