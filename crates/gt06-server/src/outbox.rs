//! Command delivery: routes an outbound [`CommandKind`] to a device's
//! currently-bound connection.
//!
//! The command builder itself (`gt06_proto::command`) is pure - it never
//! touches a socket. This module is the "caller" §4.3 defers delivery to:
//! it looks up the target session's bound connection and, if the
//! connection is live, hands the encoded frame to that connection's write
//! half via an mpsc channel. No retry queue is maintained; a missing or
//! dead connection drops the command with a warning, exactly as specified.

use std::{collections::HashMap, sync::Arc};

use gt06_proto::{command::build_command_frame, frame::Frame, CommandKind};
use tokio::sync::mpsc;

/// Per-connection outbound frame sender, registered by the per-connection
/// task for as long as it's alive.
pub type FrameSender = mpsc::UnboundedSender<Frame>;

/// Process-local table of live connections' outbound senders, keyed by
/// connection-short-id - the same id the session registry's
/// `by_connection` index uses.
#[derive(Clone, Default)]
pub struct CommandOutbox {
    senders: Arc<std::sync::Mutex<HashMap<u64, FrameSender>>>,
}

impl CommandOutbox {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `sender` as the live outbound channel for `connection_id`.
    /// Called once when a per-connection task starts.
    #[allow(clippy::expect_used)]
    pub fn register(&self, connection_id: u64, sender: FrameSender) {
        self.senders.lock().expect("outbox lock poisoned").insert(connection_id, sender);
    }

    /// Removes `connection_id`'s sender. Called when its task exits.
    #[allow(clippy::expect_used)]
    pub fn unregister(&self, connection_id: u64) {
        self.senders.lock().expect("outbox lock poisoned").remove(&connection_id);
    }

    /// Builds a frame for `kind` at `serial` and hands it to
    /// `connection_id`'s live sender, if one is registered.
    ///
    /// Returns `false` (and logs a warning) if no live connection is
    /// registered for `connection_id`, or if its task has already exited.
    #[allow(clippy::expect_used)]
    pub fn dispatch(&self, connection_id: u64, kind: &CommandKind, serial: u16) -> bool {
        let frame = build_command_frame(kind, serial);

        let sender = self.senders.lock().expect("outbox lock poisoned").get(&connection_id).cloned();
        match sender {
            Some(sender) => match sender.send(frame) {
                Ok(()) => true,
                Err(_) => {
                    tracing::warn!(connection_id, "command dropped: connection task already exited");
                    false
                },
            },
            None => {
                tracing::warn!(connection_id, "command dropped: no live connection registered");
                false
            },
        }
    }
}
