//! Session-controller message types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ChangeSet, ClientKind, JsonValue};

/// Messages sent from a session to the controller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClientMessage {
    /// Initial connection handshake
    Connect {
        client_id: Uuid,
        protocol_version: u32,
        client_kind: ClientKind,
    },

    /// Read settings state. No key reads the full state; a dotted key
    /// reads that subtree or leaf.
    GetState { key: Option<String> },

    /// Write settings state. With a key, `body` replaces or shallow-merges
    /// at that single path. Without a key, `body` is flattened into dotted
    /// leaf keys and each is written independently.
    SetState {
        key: Option<String>,
        body: JsonValue,
    },

    /// Remove a setting
    UnsetState { key: String },

    /// Ping for keepalive
    Ping,
}

/// Messages sent from the controller to sessions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ServerMessage {
    /// Handshake acknowledgement
    Connected {
        server_version: String,
        protocol_version: u32,
    },

    /// Reply to GetState
    State { value: JsonValue },

    /// Reply to SetState: the leaf keys whose value actually changed
    WriteAck { changed_keys: Vec<String> },

    /// Reply to UnsetState
    UnsetAck,

    /// Reply to GetState/UnsetState for a key that has never been written.
    /// An expected condition, not a failure.
    NotFound { key: String },

    /// Push notification: settings changed, delivered to every connected
    /// session including the originator. Removed keys carry JSON `null`.
    StateChanged { changes: ChangeSet },

    /// Request failed
    Error { code: ErrorCode, message: String },

    /// Keepalive response
    Pong,
}

impl ServerMessage {
    /// Whether this frame is a reply to a request, as opposed to a push
    /// notification. Replies are delivered in request order per connection;
    /// push frames may interleave between them.
    pub fn is_reply(&self) -> bool {
        !matches!(self, ServerMessage::StateChanged { .. })
    }
}

/// Error codes for failed requests
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    /// Request body or key was malformed
    InvalidRequest,
    /// Handshake protocol version not supported
    ProtocolMismatch,
    /// Unexpected controller-side failure
    Internal,
}
