//! Gateway error type.
//!
//! Hand-rolled `Display`/`Error` impl, mirroring this stack's existing
//! convention of mixing thiserror-based errors at the protocol/connection
//! layers (`gt06_proto::ProtocolError`, `gt06_core::ConnectionError`) with a
//! manually-written top-level error at the binary's edge.

use std::fmt;

use gt06_core::ConnectionError;

/// Errors surfaced to `main.rs`. Per-connection protocol/parse failures
/// never reach here - those are contained and logged by the driver (§7);
/// this type is for failures that prevent the gateway from starting or
/// running at all.
#[derive(Debug)]
pub enum GatewayError {
    /// Invalid configuration (bad bind address, etc.). Fatal at startup.
    Config(String),
    /// Transport/socket-level failure (bind failed, accept loop died).
    Transport(String),
    /// A connection-layer invariant was violated in a way that indicates a
    /// driver bug rather than a malformed device frame.
    Connection(ConnectionError),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Connection(err) => write!(f, "connection error: {err}"),
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connection(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConnectionError> for GatewayError {
    fn from(err: ConnectionError) -> Self {
        Self::Connection(err)
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
