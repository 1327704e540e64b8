//! Login body: 8-byte BCD-encoded IMEI.

use crate::error::{ProtocolError, Result};

/// Decodes a login frame's body into a 15-digit IMEI string.
///
/// The first 8 body bytes hold 16 BCD nibbles. Each nibble must be a valid
/// decimal digit; a single invalid nibble fails the whole decode. If the
/// resulting 16-digit string has a leading zero, it is stripped to produce
/// the canonical 15-digit IMEI.
pub fn decode_imei(body: &[u8]) -> Result<String> {
    if body.len() < 8 {
        return Err(ProtocolError::ParseFailure(format!(
            "login body too short for BCD IMEI: {} bytes",
            body.len()
        )));
    }

    let mut digits = String::with_capacity(16);
    for byte in &body[..8] {
        let hi = byte >> 4;
        let lo = byte & 0x0F;
        for nibble in [hi, lo] {
            if nibble > 9 {
                return Err(ProtocolError::ParseFailure(format!(
                    "invalid BCD nibble {nibble:#x} in IMEI"
                )));
            }
            digits.push((b'0' + nibble) as char);
        }
    }

    let imei = if digits.len() == 16 && digits.starts_with('0') {
        digits[1..].to_string()
    } else {
        digits
    };

    if imei.len() != 15 || !imei.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::ParseFailure(format!(
            "decoded IMEI `{imei}` does not match [0-9]{{15}}"
        )));
    }

    Ok(imei)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_well_formed_imei() {
        let body = [0x01, 0x23, 0x45, 0x67, 0x89, 0x01, 0x23, 0x45];
        assert_eq!(decode_imei(&body).unwrap(), "123456789012345");
    }

    #[test]
    fn strips_leading_zero_nibble() {
        // 16 BCD digits "0" + 15 real digits -> strip the leading zero.
        let body = [0x01, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x15];
        let imei = decode_imei(&body).unwrap();
        assert_eq!(imei.len(), 15);
        assert!(imei.starts_with('1'));
    }

    #[test]
    fn rejects_invalid_nibble() {
        let body = [0xFA, 0x23, 0x45, 0x67, 0x89, 0x01, 0x23, 0x45];
        assert!(decode_imei(&body).is_err());
    }

    #[test]
    fn rejects_short_body() {
        assert!(decode_imei(&[0x01, 0x23]).is_err());
    }
}
