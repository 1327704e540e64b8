//! Protocol opcode (the wire's `protocol` byte).

/// A GT06 `protocol` byte, classified into the subset this crate decodes.
///
/// Unrecognized bytes still frame correctly (the codec never inspects the
/// opcode) - they surface as [`Opcode::Unknown`] so the dispatch table in
/// `gt06-core` can still log-and-ACK them per the spec's "anything else" row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// 0x01 - login, IMEI BCD in first 8 body bytes.
    Login,
    /// 0x12, 0x22, 0x16, or 0x26 - GPS (+LBS, +Status), standard location
    /// layout. The raw byte is retained so ACKs echo the exact opcode the
    /// device sent, not a collapsed canonical one.
    Gps(u8),
    /// 0x13 - status: battery, signal, alarm bits.
    Status,
    /// 0x15 - GPS offline (buffered), standard layout.
    GpsOffline,
    /// 0x17 or 0x18 - LBS phone / extend, cell-info only. Raw byte retained
    /// for the same reason as [`Self::Gps`].
    LbsPhone(u8),
    /// 0x1A - GPS + phone, skip 4-byte phone prefix then standard layout.
    GpsPhone,
    /// 0x23 - heartbeat, session keepalive only.
    Heartbeat,
    /// 0x24 - LBS multiple, multiple cell records.
    LbsMultiple,
    /// 0x32 - GPS "dog" variant, standard layout.
    GpsDog,
    /// 0x8A - command response, echo of server-sent command.
    CommandResponse,
    /// 0x94 - extended location, variable layout (scanning decode).
    ExtendedLocation,
    /// Any other `protocol` byte.
    Unknown(u8),
}

impl Opcode {
    /// Classify a raw `protocol` byte.
    #[must_use]
    pub fn from_u8(byte: u8) -> Self {
        match byte {
            0x01 => Self::Login,
            0x12 | 0x22 | 0x16 | 0x26 => Self::Gps(byte),
            0x13 => Self::Status,
            0x15 => Self::GpsOffline,
            0x17 | 0x18 => Self::LbsPhone(byte),
            0x1A => Self::GpsPhone,
            0x23 => Self::Heartbeat,
            0x24 => Self::LbsMultiple,
            0x32 => Self::GpsDog,
            0x8A => Self::CommandResponse,
            0x94 => Self::ExtendedLocation,
            other => Self::Unknown(other),
        }
    }

    /// The raw `protocol` byte this opcode was (or would be) classified from.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Login => 0x01,
            Self::Gps(byte) | Self::LbsPhone(byte) => byte,
            Self::Status => 0x13,
            Self::GpsOffline => 0x15,
            Self::GpsPhone => 0x1A,
            Self::Heartbeat => 0x23,
            Self::LbsMultiple => 0x24,
            Self::GpsDog => 0x32,
            Self::CommandResponse => 0x8A,
            Self::ExtendedLocation => 0x94,
            Self::Unknown(byte) => byte,
        }
    }

    /// True for any opcode carrying a GPS/location body (standard or
    /// extended layout).
    #[must_use]
    pub fn is_location(self) -> bool {
        matches!(
            self,
            Self::Gps(_) | Self::GpsOffline | Self::GpsPhone | Self::GpsDog | Self::ExtendedLocation
        )
    }

    /// True for any opcode carrying cell-tower (LBS) data.
    #[must_use]
    pub fn is_lbs(self) -> bool {
        matches!(self, Self::LbsPhone(_) | Self::LbsMultiple)
    }
}

/// Outbound command opcodes written by the command builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOpcode {
    /// 0x80 - generic command-carrying frame.
    Generic,
    /// 0x8A - LOCATE, shares the command-response opcode.
    Locate,
}

impl CommandOpcode {
    /// The raw `protocol` byte for this command opcode.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Generic => 0x80,
            Self::Locate => 0x8A,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gps_variants_round_trip_their_exact_raw_byte() {
        for byte in [0x12, 0x22, 0x16, 0x26] {
            assert_eq!(Opcode::from_u8(byte).to_u8(), byte);
        }
    }

    #[test]
    fn lbs_phone_variants_round_trip_their_exact_raw_byte() {
        for byte in [0x17, 0x18] {
            assert_eq!(Opcode::from_u8(byte).to_u8(), byte);
        }
    }

    #[test]
    fn classification_is_preserved_across_gps_aliases() {
        for byte in [0x12, 0x22, 0x16, 0x26] {
            assert!(Opcode::from_u8(byte).is_location());
        }
    }
}
