//! gantry-protocol: Shared IPC definitions for session-controller communication
//!
//! This crate defines all message types and data structures used for
//! communication between gantry UI sessions and the controller daemon
//! over Unix sockets or TCP.

pub mod codec;
pub mod document;
pub mod messages;
pub mod types;

// Re-export main types at crate root
pub use codec::{ClientCodec, CodecError, ServerCodec};
pub use document::{merge_value, SettingsDocument};
pub use messages::{ClientMessage, ErrorCode, ServerMessage};
pub use types::{flatten_value, ChangeSet, ClientKind, JsonValue};

/// Current protocol version
pub const PROTOCOL_VERSION: u32 = 1;
