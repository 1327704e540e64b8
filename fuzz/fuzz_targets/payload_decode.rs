//! Fuzz target for `gt06_proto::payload::decode_body`.
//!
//! The first byte of the input selects which opcode's decoder is
//! exercised; the rest is handed to that decoder as the frame body. Every
//! decoder must return `Err` on malformed input rather than panicking -
//! BCD/ASCII parsing, fixed-offset slicing, and LBS record-count loops are
//! all candidates for out-of-bounds reads if a length check is missed.

#![no_main]

use gt06_proto::{opcode::Opcode, payload::decode_body};
use libfuzzer_sys::fuzz_target;

const OPCODES: &[Opcode] = &[
    Opcode::Login,
    Opcode::Gps(0x12),
    Opcode::Status,
    Opcode::GpsOffline,
    Opcode::LbsPhone(0x17),
    Opcode::GpsPhone,
    Opcode::Heartbeat,
    Opcode::LbsMultiple,
    Opcode::GpsDog,
    Opcode::CommandResponse,
    Opcode::ExtendedLocation,
    Opcode::Unknown(0xFE),
];

fuzz_target!(|data: &[u8]| {
    let Some((selector, body)) = data.split_first() else {
        return;
    };

    let opcode = OPCODES[*selector as usize % OPCODES.len()];
    let _ = decode_body(opcode, body);
});
