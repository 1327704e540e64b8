//! Location bodies: the standard fixed layout shared by most location-
//! bearing opcodes, and the 0x94 extended layout's scanning decode.

use crate::error::{ProtocolError, Result};

/// A decoded GPS fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    /// Device-reported UTC timestamp.
    pub timestamp: DeviceTimestamp,
    pub satellites: u8,
    /// Signed WGS84 degrees.
    pub latitude: f64,
    /// Signed WGS84 degrees.
    pub longitude: f64,
    /// km/h.
    pub speed: u8,
    /// 0-1023 degrees.
    pub course: u16,
    pub valid: bool,
    /// Signed meters. Not every device firmware appends this trailing
    /// 2-byte field, so it is `None` when the body ends right after the
    /// course-and-status word.
    pub altitude: Option<i16>,
}

/// Device-reported UTC timestamp, stored as its raw fields rather than a
/// `chrono`/`time` type - callers that need a calendar type convert at the
/// boundary, keeping this crate dependency-free of a datetime library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceTimestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

const LAT_LON_SCALE: f64 = 1_800_000.0;

/// Parses the standard location layout shared by 0x12/0x22/0x16/0x26/0x15/
/// 0x32 (0x1A skips a 4-byte phone prefix first; see
/// [`decode_standard_after_prefix`]).
pub fn decode_standard(body: &[u8]) -> Result<Location> {
    decode_standard_at(body, 0)
}

/// As [`decode_standard`], but starting at `offset` - used by 0x1A, which
/// prefixes the standard layout with a 4-byte phone number field.
pub fn decode_standard_at(body: &[u8], offset: usize) -> Result<Location> {
    const LAYOUT_LEN: usize = 6 + 1 + 1 + 4 + 4 + 1 + 2;
    if body.len() < offset + LAYOUT_LEN {
        return Err(ProtocolError::ParseFailure(format!(
            "location body too short: need {} bytes from offset {offset}, have {}",
            LAYOUT_LEN,
            body.len()
        )));
    }

    let b = &body[offset..];
    let timestamp = parse_timestamp(&b[0..6])?;
    // b[6] = GPS-info length nibble, unused beyond satellite count.
    let satellites = b[7];
    let lat_raw = u32::from_be_bytes([b[8], b[9], b[10], b[11]]);
    let lon_raw = u32::from_be_bytes([b[12], b[13], b[14], b[15]]);
    let speed = b[16];
    let course_status = u16::from_be_bytes([b[17], b[18]]);

    let course = course_status & 0x03FF;
    let south = course_status & 0x0400 != 0;
    let west = course_status & 0x0800 != 0;
    let valid = course_status & 0x1000 != 0;

    let mut latitude = f64::from(lat_raw) / LAT_LON_SCALE;
    let mut longitude = f64::from(lon_raw) / LAT_LON_SCALE;
    if south {
        latitude = -latitude;
    }
    if west {
        longitude = -longitude;
    }

    validate(&timestamp, latitude, longitude)?;

    let altitude = b
        .get(LAYOUT_LEN..LAYOUT_LEN + 2)
        .map(|bytes| i16::from_be_bytes([bytes[0], bytes[1]]));

    Ok(Location { timestamp, satellites, latitude, longitude, speed, course, valid, altitude })
}

/// 0x1A bodies carry a 4-byte phone number prefix before the standard
/// layout.
pub fn decode_standard_after_phone_prefix(body: &[u8]) -> Result<Location> {
    decode_standard_at(body, 4)
}

fn parse_timestamp(bytes: &[u8]) -> Result<DeviceTimestamp> {
    let yy = bytes[0];
    let month = bytes[1];
    let day = bytes[2];
    let hour = bytes[3];
    let minute = bytes[4];
    let second = bytes[5];

    if !(1..=12).contains(&month)
        || !(1..=31).contains(&day)
        || hour > 23
        || minute > 59
        || second > 59
    {
        return Err(ProtocolError::ParseFailure(format!(
            "invalid device timestamp fields: {yy:02}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
        )));
    }

    let year = if yy > 50 { 1900 + u16::from(yy) } else { 2000 + u16::from(yy) };
    Ok(DeviceTimestamp { year, month, day, hour, minute, second })
}

fn validate(_timestamp: &DeviceTimestamp, latitude: f64, longitude: f64) -> Result<()> {
    if latitude.abs() > 90.0 || longitude.abs() > 180.0 {
        return Err(ProtocolError::ParseFailure(format!(
            "location out of range: lat={latitude}, lon={longitude}"
        )));
    }
    Ok(())
}

/// Result of the 0x94 extended-location scanning decode: the location, and
/// the byte offset where the scan found its first accepted lat/lon pair
/// (exposed so callers can tune the heuristic against real devices).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtendedLocation {
    pub location: CoarseFix,
    pub scan_offset: usize,
}

/// A coarse fix extracted by the 0x94 heuristic: only lat/lon are
/// well-defined across vendor encodings, so this is a strict subset of
/// [`Location`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoarseFix {
    pub latitude: f64,
    pub longitude: f64,
}

/// Decodes the 0x94 body. Strips an optional leading 8-byte IMEI echo
/// (present when the body is longer than 20 bytes), then scans byte-by-byte
/// for the first 8-byte window whose two halves, read as unsigned
/// big-endian u32s scaled by 1,800,000, form a plausible non-null lat/lon
/// pair.
pub fn decode_extended(body: &[u8]) -> Result<ExtendedLocation> {
    let search_region = if body.len() > 20 { &body[8..] } else { body };
    let base_offset = if body.len() > 20 { 8 } else { 0 };

    if search_region.len() < 8 {
        return Err(ProtocolError::ParseFailure(
            "extended location body too short to scan".to_string(),
        ));
    }

    for offset in 0..=search_region.len() - 8 {
        let window = &search_region[offset..offset + 8];
        let lat_raw = u32::from_be_bytes([window[0], window[1], window[2], window[3]]);
        let lon_raw = u32::from_be_bytes([window[4], window[5], window[6], window[7]]);

        if lat_raw == 0 && lon_raw == 0 {
            continue;
        }

        let latitude = f64::from(lat_raw) / LAT_LON_SCALE;
        let longitude = f64::from(lon_raw) / LAT_LON_SCALE;

        if latitude.abs() <= 90.0 && longitude.abs() <= 180.0 {
            return Ok(ExtendedLocation {
                location: CoarseFix { latitude, longitude },
                scan_offset: base_offset + offset,
            });
        }
    }

    Err(ProtocolError::ParseFailure(
        "no plausible lat/lon pair found in extended location body".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_standard(
        yy: u8,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        satellites: u8,
        lat_raw: u32,
        lon_raw: u32,
        speed: u8,
        course_status: u16,
    ) -> Vec<u8> {
        let mut body = vec![yy, month, day, hour, minute, second];
        body.push(0x0C); // GPS-info length nibble, arbitrary
        body.push(satellites);
        body.extend_from_slice(&lat_raw.to_be_bytes());
        body.extend_from_slice(&lon_raw.to_be_bytes());
        body.push(speed);
        body.extend_from_slice(&course_status.to_be_bytes());
        body
    }

    #[test]
    fn decodes_northern_eastern_fix() {
        let lat_raw = (10.702_f64 * LAT_LON_SCALE) as u32;
        let lon_raw = (76.513_f64 * LAT_LON_SCALE) as u32;
        // course=88 (0x058), south=0, west=0, valid=1 (bit12)
        let course_status = 0x1058u16;
        let body = encode_standard(24, 3, 15, 12, 34, 56, 8, lat_raw, lon_raw, 60, course_status);

        let loc = decode_standard(&body).unwrap();
        assert_eq!(loc.timestamp.year, 2024);
        assert_eq!(loc.satellites, 8);
        assert!((loc.latitude - 10.702).abs() < 0.001);
        assert!((loc.longitude - 76.513).abs() < 0.001);
        assert_eq!(loc.speed, 60);
        assert_eq!(loc.course, 88);
        assert!(loc.valid);
        assert_eq!(loc.altitude, None);
    }

    #[test]
    fn trailing_altitude_bytes_are_decoded_when_present() {
        let lat_raw = (10.702_f64 * LAT_LON_SCALE) as u32;
        let lon_raw = (76.513_f64 * LAT_LON_SCALE) as u32;
        let mut body = encode_standard(24, 3, 15, 12, 34, 56, 8, lat_raw, lon_raw, 60, 0x1058);
        body.extend_from_slice(&(-42i16).to_be_bytes());

        let loc = decode_standard(&body).unwrap();
        assert_eq!(loc.altitude, Some(-42));
    }

    #[test]
    fn south_and_west_flags_negate() {
        let lat_raw = (5.0_f64 * LAT_LON_SCALE) as u32;
        let lon_raw = (5.0_f64 * LAT_LON_SCALE) as u32;
        let course_status = 0x0C00u16; // south(0x400) | west(0x800), not valid
        let body = encode_standard(24, 1, 1, 0, 0, 0, 5, lat_raw, lon_raw, 0, course_status);

        let loc = decode_standard(&body).unwrap();
        assert!(loc.latitude < 0.0);
        assert!(loc.longitude < 0.0);
        assert!(!loc.valid);
    }

    #[test]
    fn rejects_invalid_month() {
        let body = encode_standard(24, 13, 15, 12, 34, 56, 8, 0, 0, 0, 0);
        assert!(decode_standard(&body).is_err());
    }

    #[test]
    fn rejects_out_of_range_latitude() {
        let lat_raw = (95.0_f64 * LAT_LON_SCALE) as u32;
        let body = encode_standard(24, 3, 15, 12, 0, 0, 8, lat_raw, 0, 0, 0);
        assert!(decode_standard(&body).is_err());
    }

    #[test]
    fn phone_prefixed_layout_skips_four_bytes() {
        let lat_raw = (1.0_f64 * LAT_LON_SCALE) as u32;
        let lon_raw = (1.0_f64 * LAT_LON_SCALE) as u32;
        let mut body = vec![0x55, 0x55, 0x55, 0x55]; // phone prefix
        body.extend(encode_standard(24, 1, 1, 0, 0, 0, 4, lat_raw, lon_raw, 0, 0x1000));
        let loc = decode_standard_after_phone_prefix(&body).unwrap();
        assert!((loc.latitude - 1.0).abs() < 0.001);
    }

    #[test]
    fn extended_scan_finds_plausible_pair() {
        let lat_raw = (22.5_f64 * LAT_LON_SCALE) as u32;
        let lon_raw = (114.0_f64 * LAT_LON_SCALE) as u32;
        let mut body = vec![0xAA; 5]; // leading junk
        body.extend_from_slice(&lat_raw.to_be_bytes());
        body.extend_from_slice(&lon_raw.to_be_bytes());

        let result = decode_extended(&body).unwrap();
        assert_eq!(result.scan_offset, 5);
        assert!((result.location.latitude - 22.5).abs() < 0.001);
        assert!((result.location.longitude - 114.0).abs() < 0.001);
    }

    #[test]
    fn extended_strips_leading_imei_echo_when_body_is_long() {
        let lat_raw = (1.0_f64 * LAT_LON_SCALE) as u32;
        let lon_raw = (2.0_f64 * LAT_LON_SCALE) as u32;
        let mut body = vec![0x01u8; 8]; // IMEI echo
        body.extend(std::iter::repeat(0xFFu8).take(5));
        body.extend_from_slice(&lat_raw.to_be_bytes());
        body.extend_from_slice(&lon_raw.to_be_bytes());

        let result = decode_extended(&body).unwrap();
        assert_eq!(result.scan_offset, 13);
    }

    #[test]
    fn extended_rejects_all_zero_and_out_of_range_windows() {
        let body = vec![0u8; 16];
        assert!(decode_extended(&body).is_err());
    }
}
