//! Wire-level error types.

use thiserror::Error;

/// Errors that can occur while decoding or encoding GT06 frames and payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Declared frame length fell outside `[MIN_FRAME_LENGTH, MAX_FRAME_LENGTH]`.
    #[error("frame length {total} outside allowed range [{min}, {max}]")]
    FrameMalformed {
        /// Total wire size the candidate frame declared.
        total: usize,
        /// Smallest allowed total wire size.
        min: usize,
        /// Largest allowed total wire size.
        max: usize,
    },

    /// Buffer held fewer bytes than the declared frame needs. Not fatal -
    /// the caller should await more input.
    #[error("need {needed} more bytes, have {have}")]
    NeedMoreBytes {
        /// Bytes required to complete the frame.
        needed: usize,
        /// Bytes currently buffered.
        have: usize,
    },

    /// Payload length does not match what the frame header declared.
    #[error("payload size mismatch: header claims {declared}, body has {actual}")]
    PayloadSizeMismatch {
        /// Length the header/`length` field declared.
        declared: usize,
        /// Length of the body actually available.
        actual: usize,
    },

    /// `protocol` byte has no known decoder.
    #[error("unrecognized opcode {0:#04x}")]
    UnknownOpcode(u8),

    /// Body failed structural validation for its opcode (e.g. out-of-range
    /// date fields, invalid BCD nibble).
    #[error("payload parse failed: {0}")]
    ParseFailure(String),
}

/// Convenience alias used throughout the wire layer.
pub type Result<T> = std::result::Result<T, ProtocolError>;
