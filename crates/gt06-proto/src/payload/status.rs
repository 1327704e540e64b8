//! Status body (0x13): battery, GSM signal, and alarm bits.

use crate::error::{ProtocolError, Result};

/// Decoded 0x13 status packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Battery level, 0-6 (device-reported scale, not a percentage).
    pub battery_level: u8,
    /// GSM signal strength, 0-4.
    pub signal_strength: u8,
    /// Raw alarm/status byte, device-specific bit meanings.
    pub alarm: u8,
}

/// Parses a status body. The minimal layout is `(battery, signal, alarm)`;
/// any trailing bytes (voltage, language code, etc.) are accepted but
/// ignored, since their presence and meaning vary across device firmwares.
pub fn decode_status(body: &[u8]) -> Result<Status> {
    if body.len() < 3 {
        return Err(ProtocolError::ParseFailure(format!(
            "status body too short: need 3 bytes, have {}",
            body.len()
        )));
    }

    Ok(Status { battery_level: body[0], signal_strength: body[1], alarm: body[2] })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_minimal_status() {
        let status = decode_status(&[4, 3, 0]).unwrap();
        assert_eq!(status.battery_level, 4);
        assert_eq!(status.signal_strength, 3);
        assert_eq!(status.alarm, 0);
    }

    #[test]
    fn ignores_trailing_bytes() {
        let status = decode_status(&[4, 3, 0, 0xAA, 0xBB]).unwrap();
        assert_eq!(status.alarm, 0);
    }

    #[test]
    fn rejects_short_body() {
        assert!(decode_status(&[1, 2]).is_err());
    }
}
