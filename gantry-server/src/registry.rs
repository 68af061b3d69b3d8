//! Session Connection Registry
//!
//! Tracks connected sessions and their outbound channels, enabling the
//! broadcast bus: every settings change is fanned out to all connected
//! sessions, including the one that originated the write (the originator
//! detects the echo by value equality and treats it as a no-op).

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use gantry_protocol::{ClientKind, ServerMessage};

/// Unique session connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    /// Create a ClientId from a raw value (mainly for testing)
    #[cfg(test)]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Session({})", self.0)
    }
}

/// Entry for a connected session
pub struct ClientEntry {
    /// Channel for sending messages to this session
    pub sender: mpsc::Sender<ServerMessage>,
    /// What kind of UI is on the other end
    pub kind: ClientKind,
}

impl std::fmt::Debug for ClientEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientEntry")
            .field("kind", &self.kind)
            .field("sender_closed", &self.sender.is_closed())
            .finish()
    }
}

/// Registry tracking all connected sessions
///
/// Thread-safe for concurrent access from multiple connection handler tasks.
pub struct ClientRegistry {
    /// Client ID -> entry
    clients: DashMap<ClientId, ClientEntry>,
    /// Counter for generating unique client IDs
    next_client_id: AtomicU64,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            next_client_id: AtomicU64::new(1),
        }
    }

    /// Register a new session connection
    ///
    /// Returns the assigned ClientId for this connection.
    pub fn register_client(&self, sender: mpsc::Sender<ServerMessage>) -> ClientId {
        let id = ClientId(self.next_client_id.fetch_add(1, Ordering::SeqCst));

        self.clients.insert(
            id,
            ClientEntry {
                sender,
                kind: ClientKind::Unknown,
            },
        );
        debug!("Registered {}", id);

        id
    }

    /// Unregister a session connection
    pub fn unregister_client(&self, client_id: ClientId) {
        if self.clients.remove(&client_id).is_some() {
            debug!("Unregistered {}", client_id);
        }
    }

    /// Record the client kind reported at handshake
    pub fn set_client_kind(&self, client_id: ClientId, kind: ClientKind) {
        if let Some(mut entry) = self.clients.get_mut(&client_id) {
            entry.kind = kind;
        }
    }

    /// Get the number of connected sessions
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Get all registered client IDs
    pub fn get_all_clients(&self) -> Vec<ClientId> {
        self.clients.iter().map(|entry| *entry.key()).collect()
    }

    /// Send a message to a specific session (non-blocking)
    ///
    /// Uses `try_send`. Returns `true` if the message was queued. A closed
    /// channel means the session disconnected and it is unregistered; a
    /// full channel means the session is slow to consume and the frame is
    /// dropped (best-effort delivery).
    pub fn try_send_to_client(&self, client_id: ClientId, message: ServerMessage) -> bool {
        let sender = match self.clients.get(&client_id) {
            Some(entry) => entry.sender.clone(),
            None => return false,
        };

        match sender.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("{} channel closed, removing from registry", client_id);
                self.unregister_client(client_id);
                false
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("{} channel full, message dropped", client_id);
                false
            }
        }
    }

    /// Broadcast a message to every connected session (non-blocking)
    ///
    /// Returns the number of sessions that received the message. The
    /// originating session is not excluded; it detects its own change
    /// echoed back by value equality.
    pub fn broadcast_to_all(&self, message: ServerMessage) -> usize {
        let client_ids = self.get_all_clients();

        if client_ids.is_empty() {
            return 0;
        }

        debug!("Broadcasting to all {} sessions", client_ids.len());

        let mut success_count = 0;

        for client_id in client_ids {
            if self.try_send_to_client(client_id, message.clone()) {
                success_count += 1;
            }
        }

        success_count
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("client_count", &self.clients.len())
            .field(
                "next_client_id",
                &self.next_client_id.load(Ordering::SeqCst),
            )
            .finish()
    }
}
