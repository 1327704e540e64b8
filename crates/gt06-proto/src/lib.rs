//! GT06 vehicle-tracker wire protocol.
//!
//! This crate is transport-agnostic: it reassembles and validates frames
//! from a byte stream ([`frame`]), decodes per-opcode bodies ([`payload`]),
//! and serializes outbound commands back into frames ([`command`]). No
//! socket, task, or clock lives here - see `gt06-core` for the connection
//! state machine that drives this codec, and `gt06-server` for the TCP
//! gateway built on top of it.

pub mod command;
pub mod crc;
pub mod error;
pub mod frame;
pub mod opcode;
pub mod payload;

pub use command::{build_ack_frame, build_command_frame, CommandKind, ImmobilizeAction};
pub use error::{ProtocolError, Result};
pub use frame::{DecodeOutcome, Frame, FrameCodec, MAX_FRAME_LENGTH, MIN_DECLARED_LENGTH};
pub use opcode::{CommandOpcode, Opcode};
pub use payload::{decode_body, DecodedBody};
