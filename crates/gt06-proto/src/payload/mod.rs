//! Per-opcode body decoding.
//!
//! Each decoder returns either a typed success or a [`ProtocolError`]; a
//! decode failure is never fatal to the connection - the caller still ACKs
//! and updates session activity, emitting best-effort telemetry with an
//! "unparsable" marker where applicable.

pub mod lbs;
pub mod location;
pub mod login;
pub mod status;

use crate::{error::Result, opcode::Opcode};
pub use lbs::CellInfo;
pub use location::{DeviceTimestamp, ExtendedLocation, Location};
pub use status::Status;

/// The decoded shape of a frame body, keyed by its opcode.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedBody {
    Login { imei: String },
    Location(Location),
    ExtendedLocation(ExtendedLocation),
    Status(Status),
    SingleCell(CellInfo),
    MultiCell(Vec<CellInfo>),
    Heartbeat,
    CommandResponse,
    /// Recognized opcode, but this crate has no decoder for its body.
    Unrecognized,
}

/// Decodes `body` according to `opcode`, dispatching to the appropriate
/// per-protocol parser.
pub fn decode_body(opcode: Opcode, body: &[u8]) -> Result<DecodedBody> {
    match opcode {
        Opcode::Login => login::decode_imei(body).map(|imei| DecodedBody::Login { imei }),
        Opcode::Gps(_) | Opcode::GpsOffline | Opcode::GpsDog => {
            location::decode_standard(body).map(DecodedBody::Location)
        },
        Opcode::GpsPhone => {
            location::decode_standard_after_phone_prefix(body).map(DecodedBody::Location)
        },
        Opcode::ExtendedLocation => {
            location::decode_extended(body).map(DecodedBody::ExtendedLocation)
        },
        Opcode::Status => status::decode_status(body).map(DecodedBody::Status),
        Opcode::LbsPhone(_) => lbs::decode_single(body).map(DecodedBody::SingleCell),
        Opcode::LbsMultiple => lbs::decode_multiple(body).map(DecodedBody::MultiCell),
        Opcode::Heartbeat => Ok(DecodedBody::Heartbeat),
        Opcode::CommandResponse => Ok(DecodedBody::CommandResponse),
        Opcode::Unknown(_) => Ok(DecodedBody::Unrecognized),
    }
}
