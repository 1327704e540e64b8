//! Outbound command builder: serializes a command descriptor into a GT06
//! frame ready to write to a device connection.
//!
//! The builder is pure - it never touches a connection or socket. Delivery
//! (looking up the device's bound connection and writing the frame) is the
//! caller's concern.

use bytes::Bytes;

use crate::{
    frame::Frame,
    opcode::{CommandOpcode, Opcode},
};

/// An immobilize action: enable cuts power to the vehicle, disable restores
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmobilizeAction {
    Enable,
    Disable,
}

/// An outbound command kind, independent of the session it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Immobilize(ImmobilizeAction),
    Siren { enable: bool },
    Locate,
    Generic(String),
}

impl CommandKind {
    fn command_string(&self) -> Option<String> {
        match self {
            Self::Immobilize(ImmobilizeAction::Enable) => Some("DYD#".to_string()),
            Self::Immobilize(ImmobilizeAction::Disable) => Some("HFYD#".to_string()),
            Self::Siren { enable: true } => Some("DXDY#".to_string()),
            Self::Siren { enable: false } => Some("QXDY#".to_string()),
            Self::Locate => None,
            Self::Generic(text) => Some(format!("{text}#")),
        }
    }

    fn opcode(&self) -> CommandOpcode {
        match self {
            Self::Locate => CommandOpcode::Locate,
            _ => CommandOpcode::Generic,
        }
    }
}

/// Builds a GT06 frame for `kind`, addressed with `serial` (the server-side
/// monotonic per-session counter, per-session state the caller maintains).
#[must_use]
pub fn build_command_frame(kind: &CommandKind, serial: u16) -> Frame {
    let body = kind.command_string().map(String::into_bytes).unwrap_or_default();

    Frame {
        start_bits: 0x7878,
        opcode: Opcode::Unknown(kind.opcode().to_u8()),
        body: Bytes::from(body),
        serial,
        crc: 0, // recomputed by Frame::encode
        stop_bits: 0x0D0A,
    }
}

/// Builds the generic ACK frame sent in response to an inbound frame:
/// same opcode and serial, empty body.
#[must_use]
pub fn build_ack_frame(opcode: Opcode, serial: u16) -> Frame {
    Frame { start_bits: 0x7878, opcode, body: Bytes::new(), serial, crc: 0, stop_bits: 0x0D0A }
}
