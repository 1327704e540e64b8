//! Cell-tower (LBS) bodies: a single cell record (0x17/0x18) or multiple
//! (0x24).

use crate::error::{ProtocolError, Result};

/// A single GSM cell-tower record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellInfo {
    pub mcc: u16,
    pub mnc: u8,
    pub lac: u16,
    pub cell_id: u32,
}

const CELL_RECORD_LEN: usize = 2 + 1 + 2 + 3; // mcc, mnc, lac, cell_id(3 bytes on the wire)

fn decode_cell(bytes: &[u8]) -> CellInfo {
    let mcc = u16::from_be_bytes([bytes[0], bytes[1]]);
    let mnc = bytes[2];
    let lac = u16::from_be_bytes([bytes[3], bytes[4]]);
    let cell_id = u32::from_be_bytes([0, bytes[5], bytes[6], bytes[7]]);
    CellInfo { mcc, mnc, lac, cell_id }
}

/// Decodes a single-cell LBS body (0x17, 0x18). The standard location
/// layout's date-time header precedes the cell fields; callers that need
/// the timestamp should decode the body with
/// [`crate::payload::location::decode_standard`] first where applicable.
/// Here we decode only the trailing cell fields, per the opcode's
/// cell-info-only contract.
pub fn decode_single(body: &[u8]) -> Result<CellInfo> {
    if body.len() < CELL_RECORD_LEN {
        return Err(ProtocolError::ParseFailure(format!(
            "LBS body too short: need {CELL_RECORD_LEN} bytes, have {}",
            body.len()
        )));
    }
    Ok(decode_cell(&body[..CELL_RECORD_LEN]))
}

/// Decodes a multi-cell LBS body (0x24): a 1-byte record count followed by
/// that many fixed-size cell records.
pub fn decode_multiple(body: &[u8]) -> Result<Vec<CellInfo>> {
    if body.is_empty() {
        return Err(ProtocolError::ParseFailure("empty LBS-multiple body".to_string()));
    }

    let count = body[0] as usize;
    let needed = 1 + count * CELL_RECORD_LEN;
    if body.len() < needed {
        return Err(ProtocolError::ParseFailure(format!(
            "LBS-multiple body too short: need {needed} bytes for {count} records, have {}",
            body.len()
        )));
    }

    let mut records = Vec::with_capacity(count);
    for i in 0..count {
        let start = 1 + i * CELL_RECORD_LEN;
        records.push(decode_cell(&body[start..start + CELL_RECORD_LEN]));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell_bytes(mcc: u16, mnc: u8, lac: u16, cell_id: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&mcc.to_be_bytes());
        bytes.push(mnc);
        bytes.extend_from_slice(&lac.to_be_bytes());
        let id_bytes = cell_id.to_be_bytes();
        bytes.extend_from_slice(&id_bytes[1..]);
        bytes
    }

    #[test]
    fn decodes_single_cell() {
        let body = cell_bytes(460, 0, 0x1234, 0xABCDEF);
        let cell = decode_single(&body).unwrap();
        assert_eq!(cell.mcc, 460);
        assert_eq!(cell.lac, 0x1234);
        assert_eq!(cell.cell_id, 0xABCDEF);
    }

    #[test]
    fn decodes_multiple_cells() {
        let mut body = vec![2u8];
        body.extend(cell_bytes(460, 0, 1, 1));
        body.extend(cell_bytes(460, 1, 2, 2));

        let cells = decode_multiple(&body).unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].lac, 1);
        assert_eq!(cells[1].lac, 2);
    }

    #[test]
    fn rejects_truncated_multiple_body() {
        let mut body = vec![2u8];
        body.extend(cell_bytes(460, 0, 1, 1));
        assert!(decode_multiple(&body).is_err());
    }
}
