//! Connection-level protocol core for the GT06 device gateway.
//!
//! Builds on `gt06-proto`'s frame codec and payload decoders with the
//! per-connection state machine ([`connection`]): login/authentication,
//! device-variant classification, and ACK discipline. Transport, the
//! session registry, and telemetry fan-out live in `gt06-server`.

pub mod connection;
pub mod env;
pub mod error;
pub mod variant;

pub use connection::{
    Connection, ConnectionAction, ConnectionConfig, ConnectionEvent, ConnectionState, LogLevel,
    UnparsableKind,
};
pub use env::Environment;
pub use error::ConnectionError;
pub use variant::{classify_variant, DeviceVariant};
