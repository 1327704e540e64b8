//! Device-variant classification.
//!
//! Classification happens exactly once, on the login frame, and is then
//! immutable for the life of the session - recomputing it mid-session is
//! what causes the persistence bugs this design avoids.

/// A device sub-family, inferred from login-frame body length.
///
/// Changes how status vs. location frames are interpreted downstream: V5
/// devices treat 0x13 status packets as primary telemetry rather than an
/// anomaly (see [`crate::connection::Connection`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceVariant {
    V5,
    Sk05,
    Gt06Standard,
    Gt06Unknown,
}

/// Classifies a device variant from its login body length.
///
/// Rules are applied in order, first match wins: `<= 12` bytes is V5,
/// `13..=16` is SK05, `>= 8` falls back to GT06_STANDARD. In practice a
/// login frame's body is never shorter than 8 bytes (the BCD IMEI occupies
/// the first 8), so the `Gt06Unknown` fallthrough below is unreachable
/// under a conforming login body - it exists only so this function is
/// total.
#[must_use]
pub fn classify_variant(body_len: usize) -> DeviceVariant {
    if body_len <= 12 {
        DeviceVariant::V5
    } else if body_len <= 16 {
        DeviceVariant::Sk05
    } else if body_len >= 8 {
        DeviceVariant::Gt06Standard
    } else {
        DeviceVariant::Gt06Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_body_classifies_as_v5() {
        assert_eq!(classify_variant(8), DeviceVariant::V5);
        assert_eq!(classify_variant(12), DeviceVariant::V5);
    }

    #[test]
    fn mid_length_body_classifies_as_sk05() {
        assert_eq!(classify_variant(13), DeviceVariant::Sk05);
        assert_eq!(classify_variant(16), DeviceVariant::Sk05);
    }

    #[test]
    fn long_body_falls_back_to_standard() {
        assert_eq!(classify_variant(20), DeviceVariant::Gt06Standard);
    }
}
