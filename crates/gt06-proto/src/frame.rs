//! Frame codec: byte-stream reassembly into validated GT06 frames, and back.
//!
//! Operates on a per-connection read buffer that may contain zero, one, or
//! many frames, possibly with leading garbage or a trailing partial frame.
//! The codec performs no I/O; it is fed bytes and drained for frames, in the
//! sans-IO style used for byte-stream reassembly throughout this stack.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    crc::crc_itu,
    error::{ProtocolError, Result},
    opcode::Opcode,
};

/// Smallest possible total wire size: 2 (header) + 1 (length) + 1 (protocol)
/// + ... the spec's `length >= 5` floor is on the declared length field, and
/// the smallest legal frame (heartbeat, empty body) is well above this, but
/// we enforce the declared-length floor exactly as specified.
pub const MIN_DECLARED_LENGTH: u16 = 5;

/// Hard cap on a single frame's total wire size (configurable in the
/// gateway, but this is the protocol-level ceiling).
pub const MAX_FRAME_LENGTH: usize = 1024;

/// Stop-bit patterns accepted under the default (lenient) policy.
pub const LENIENT_STOP_BITS: [u16; 4] = [0x0D0A, 0x0A0D, 0x0000, 0xFFFF];

/// An immutable decoded GT06 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 0x7878 (standard) or 0x7979 (extended length).
    pub start_bits: u16,
    /// 1-byte opcode classified from `protocol`.
    pub opcode: Opcode,
    /// Opaque body bytes, sized `length - 4`.
    pub body: Bytes,
    /// 16-bit sequence number assigned by the device (or the server, for
    /// outbound frames).
    pub serial: u16,
    /// CRC-ITU value as reported on the wire.
    pub crc: u16,
    /// Stop-bit pattern as read from the wire (nominally 0x0D0A).
    pub stop_bits: u16,
}

impl Frame {
    /// Declared `length` field value this frame would encode to: protocol
    /// (1) + body + serial (2) + crc (2).
    #[must_use]
    pub fn declared_length(&self) -> usize {
        1 + self.body.len() + 2 + 2
    }

    /// Whether the CRC-ITU computed over this frame's `length..serial` range
    /// matches the frame's reported `crc` field.
    #[must_use]
    pub fn crc_valid(&self) -> bool {
        crc_itu(&self.crc_payload()) == self.crc
    }

    /// Whether `stop_bits` is one of the lenient-accepted patterns.
    #[must_use]
    pub fn stop_bits_valid(&self) -> bool {
        LENIENT_STOP_BITS.contains(&self.stop_bits)
    }

    fn crc_payload(&self) -> Vec<u8> {
        let declared = self.declared_length();
        let mut buf = Vec::with_capacity(2 + declared - 2);
        if self.start_bits == 0x7979 {
            buf.put_u16(declared as u16);
        } else {
            buf.put_u8(declared as u8);
        }
        buf.put_u8(self.opcode.to_u8());
        buf.put_slice(&self.body);
        buf.put_u16(self.serial);
        buf
    }

    /// Encodes this frame to wire bytes: `header len protocol body serial
    /// crc stop`. Always emits 0x0D0A stop bits and a freshly-computed CRC,
    /// regardless of what this value was decoded with - this is the shape
    /// used by the command builder and by ACK construction.
    pub fn encode(&self, dst: &mut impl BufMut) {
        let crc_payload = self.crc_payload();
        let crc = crc_itu(&crc_payload);

        dst.put_u16(self.start_bits);
        dst.put_slice(&crc_payload);
        dst.put_u16(crc);
        dst.put_u16(0x0D0A);
    }

    /// Convenience: encode into a freshly allocated `Vec<u8>`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

/// Outcome of one [`FrameCodec::decode_next`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A complete frame was parsed and removed from the buffer.
    Frame(Frame),
    /// The buffer does not yet hold a complete frame; await more input.
    NeedMoreData,
    /// `count` leading bytes were discarded as garbage (no header found, or
    /// a malformed candidate was skipped one byte at a time).
    SkippedGarbage {
        /// Number of bytes discarded.
        count: usize,
    },
}

/// Reassembles a byte stream into validated frames.
///
/// Two conceptual states drive the loop, both purely functions of buffer
/// length and content: `SCANNING` (hunting for a 0x7878/0x7979 header) and
/// `FRAMING` (header found, awaiting the declared length). No I/O is ever
/// performed here; the caller owns reading bytes in and draining frames out.
#[derive(Debug, Default)]
pub struct FrameCodec {
    buffer: BytesMut,
    /// When `true`, frames whose CRC does not match are rejected instead of
    /// merely logged.
    pub strict_crc: bool,
    /// When `true`, frames whose stop bits are outside [`LENIENT_STOP_BITS`]
    /// are rejected instead of accepted-with-a-log.
    pub strict_stop_bits: bool,
}

impl FrameCodec {
    /// Creates a codec with the default (lenient) policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds newly-read bytes into the internal buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of bytes currently buffered (including any undiscarded
    /// garbage and partial frames).
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Attempts to decode the next frame from the buffer.
    ///
    /// Implements the decode-loop contract: scan for a header, discarding
    /// leading garbage; determine the length-field width from the header;
    /// wait for enough bytes to read the declared length; reject
    /// candidates whose total size is out of range by advancing one byte;
    /// otherwise slice, validate, and yield.
    pub fn decode_next(&mut self) -> DecodeOutcome {
        if self.buffer.len() < MIN_DECLARED_LENGTH as usize {
            return DecodeOutcome::NeedMoreData;
        }

        let Some(header_offset) = self.find_header() else {
            let count = self.buffer.len().saturating_sub(1);
            self.buffer.advance_discard(count);
            return DecodeOutcome::SkippedGarbage { count };
        };

        if header_offset > 0 {
            self.buffer.advance_discard(header_offset);
            return DecodeOutcome::SkippedGarbage { count: header_offset };
        }

        let start_bits = u16::from_be_bytes([self.buffer[0], self.buffer[1]]);
        let length_field_width = if start_bits == 0x7979 { 2 } else { 1 };

        if self.buffer.len() < 2 + length_field_width {
            return DecodeOutcome::NeedMoreData;
        }

        let declared_length = if length_field_width == 2 {
            u16::from_be_bytes([self.buffer[2], self.buffer[3]])
        } else {
            u16::from(self.buffer[2])
        };

        let total = 2 + length_field_width + declared_length as usize + 2;

        if total > MAX_FRAME_LENGTH || declared_length < MIN_DECLARED_LENGTH {
            self.buffer.advance_discard(1);
            return DecodeOutcome::SkippedGarbage { count: 1 };
        }

        if self.buffer.len() < total {
            return DecodeOutcome::NeedMoreData;
        }

        let frame_bytes = self.buffer.split_to(total).freeze();
        match parse_frame(&frame_bytes, start_bits, length_field_width, declared_length) {
            Ok(frame) => {
                if self.strict_crc && !frame.crc_valid() {
                    return DecodeOutcome::SkippedGarbage { count: total };
                }
                if self.strict_stop_bits && !frame.stop_bits_valid() {
                    return DecodeOutcome::SkippedGarbage { count: total };
                }
                DecodeOutcome::Frame(frame)
            },
            Err(_) => DecodeOutcome::SkippedGarbage { count: total },
        }
    }

    /// Finds the offset of the next 0x7878/0x7979 header in the buffer, if
    /// any. Returns `None` if no header byte pair is present anywhere.
    fn find_header(&self) -> Option<usize> {
        if self.buffer.len() < 2 {
            return None;
        }
        (0..=self.buffer.len() - 2).find(|&i| {
            let candidate = u16::from_be_bytes([self.buffer[i], self.buffer[i + 1]]);
            candidate == 0x7878 || candidate == 0x7979
        })
    }
}

/// Small helper trait to make "discard N leading bytes" read clearly at
/// call sites above.
trait AdvanceDiscard {
    fn advance_discard(&mut self, count: usize);
}

impl AdvanceDiscard for BytesMut {
    fn advance_discard(&mut self, count: usize) {
        let _ = self.split_to(count.min(self.len()));
    }
}

fn parse_frame(
    bytes: &Bytes,
    start_bits: u16,
    length_field_width: usize,
    declared_length: u16,
) -> Result<Frame> {
    let header_len = 2 + length_field_width;
    let protocol_offset = header_len;
    let protocol = bytes[protocol_offset];

    let body_len = declared_length as usize - 4; // protocol(1) + serial(2) + crc(2)
    let body_start = protocol_offset + 1;
    let body_end = body_start + body_len;
    let serial_start = body_end;
    let crc_start = serial_start + 2;
    let stop_start = crc_start + 2;

    let body = bytes.slice(body_start..body_end);
    let serial = u16::from_be_bytes([bytes[serial_start], bytes[serial_start + 1]]);
    let crc = u16::from_be_bytes([bytes[crc_start], bytes[crc_start + 1]]);
    let stop_bits = u16::from_be_bytes([bytes[stop_start], bytes[stop_start + 1]]);

    Ok(Frame { start_bits, opcode: Opcode::from_u8(protocol), body, serial, crc, stop_bits })
}
