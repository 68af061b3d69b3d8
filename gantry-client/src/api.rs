//! Request/reply API client for the controller's settings store
//!
//! The controller answers requests in the order it received them on each
//! connection, so replies are matched to callers through a FIFO queue of
//! waiters. `StateChanged` push frames can interleave between replies; they
//! are routed to a typed broadcast channel instead of the queue.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use gantry_protocol::{
    ChangeSet, ClientKind, ClientMessage, JsonValue, ServerMessage, PROTOCOL_VERSION,
};
use gantry_utils::{GantryError, Result};

use crate::connection::Connection;

type PendingQueue = Arc<Mutex<VecDeque<oneshot::Sender<ServerMessage>>>>;

/// Handle to the controller's settings API, clonable across a session
#[derive(Clone)]
pub struct ApiClient {
    outgoing: mpsc::Sender<ClientMessage>,
    pending: PendingQueue,
    changes_tx: broadcast::Sender<ChangeSet>,
}

impl ApiClient {
    /// Connect to the controller at `addr` (`unix://` path or
    /// `tcp://host:port`) and perform the handshake.
    pub async fn connect(addr: &str, kind: ClientKind) -> Result<Self> {
        let mut conn = Connection::with_addr(addr);
        conn.connect().await?;
        Self::from_connection(conn, kind).await
    }

    /// Perform the handshake on an already-connected `Connection` and take
    /// over its message stream.
    pub async fn from_connection(mut conn: Connection, kind: ClientKind) -> Result<Self> {
        conn.send(ClientMessage::Connect {
            client_id: Uuid::new_v4(),
            protocol_version: PROTOCOL_VERSION,
            client_kind: kind,
        })
        .await?;

        match conn.recv().await {
            Some(ServerMessage::Connected {
                server_version,
                protocol_version,
            }) => {
                if protocol_version != PROTOCOL_VERSION {
                    return Err(GantryError::ProtocolMismatch {
                        client: PROTOCOL_VERSION,
                        server: protocol_version,
                    });
                }
                debug!("Connected to controller {}", server_version);
            }
            Some(ServerMessage::Error { message, .. }) => {
                return Err(GantryError::protocol(message));
            }
            Some(other) => {
                return Err(GantryError::protocol(format!(
                    "unexpected handshake reply: {:?}",
                    std::mem::discriminant(&other)
                )));
            }
            None => return Err(GantryError::ConnectionClosed),
        }

        let pending: PendingQueue = Arc::new(Mutex::new(VecDeque::new()));
        let (changes_tx, _) = broadcast::channel(64);
        let outgoing = conn.sender();

        let router_pending = Arc::clone(&pending);
        let router_changes = changes_tx.clone();
        tokio::spawn(async move {
            while let Some(msg) = conn.recv().await {
                match msg {
                    ServerMessage::StateChanged { changes } => {
                        // No receivers is fine: nobody subscribed yet
                        let _ = router_changes.send(changes);
                    }
                    reply => {
                        let waiter = router_pending.lock().pop_front();
                        match waiter {
                            Some(tx) => {
                                let _ = tx.send(reply);
                            }
                            None => warn!("Unsolicited reply frame from controller"),
                        }
                    }
                }
            }
            // Connection gone: fail any callers still waiting
            router_pending.lock().clear();
            debug!("Controller connection closed");
        });

        Ok(Self {
            outgoing,
            pending,
            changes_tx,
        })
    }

    async fn request(&self, msg: ClientMessage) -> Result<ServerMessage> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().push_back(reply_tx);

        self.outgoing
            .send(msg)
            .await
            .map_err(|_| GantryError::ConnectionClosed)?;

        reply_rx.await.map_err(|_| GantryError::ConnectionClosed)
    }

    /// Read the full state (no key) or one subtree/leaf.
    ///
    /// A key that has never been written is `KeyNotFound` — an expected
    /// condition for callers with a default on hand.
    pub async fn get_state(&self, key: Option<&str>) -> Result<Value> {
        match self
            .request(ClientMessage::GetState {
                key: key.map(Into::into),
            })
            .await?
        {
            ServerMessage::State { value } => Ok(value.into_inner()),
            ServerMessage::NotFound { key } => Err(GantryError::key_not_found(key)),
            other => Err(unexpected_reply(other)),
        }
    }

    /// Write a body of settings with no key: the controller flattens it
    /// into dotted leaf keys and writes each independently. Returns the
    /// keys that actually changed.
    pub async fn set_state(&self, body: Value) -> Result<Vec<String>> {
        self.set(None, body).await
    }

    /// Write one setting at a dotted key (scalar replace, object
    /// shallow-merge). Returns the keys that actually changed.
    pub async fn set_state_at(&self, key: &str, value: Value) -> Result<Vec<String>> {
        self.set(Some(key.to_string()), value).await
    }

    async fn set(&self, key: Option<String>, body: Value) -> Result<Vec<String>> {
        match self
            .request(ClientMessage::SetState {
                key,
                body: JsonValue::new(body),
            })
            .await?
        {
            ServerMessage::WriteAck { changed_keys } => Ok(changed_keys),
            other => Err(unexpected_reply(other)),
        }
    }

    /// Remove a setting. `KeyNotFound` if it was never written.
    pub async fn unset_state(&self, key: &str) -> Result<()> {
        match self
            .request(ClientMessage::UnsetState {
                key: key.to_string(),
            })
            .await?
        {
            ServerMessage::UnsetAck => Ok(()),
            ServerMessage::NotFound { key } => Err(GantryError::key_not_found(key)),
            other => Err(unexpected_reply(other)),
        }
    }

    /// Keepalive round trip
    pub async fn ping(&self) -> Result<()> {
        match self.request(ClientMessage::Ping).await? {
            ServerMessage::Pong => Ok(()),
            other => Err(unexpected_reply(other)),
        }
    }

    /// Subscribe to change notifications pushed by the controller.
    ///
    /// Every connected session receives every change, including changes it
    /// originated itself; consumers detect the echo by value equality.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ChangeSet> {
        self.changes_tx.subscribe()
    }
}

fn unexpected_reply(msg: ServerMessage) -> GantryError {
    match msg {
        ServerMessage::Error { code, message } => {
            GantryError::protocol(format!("controller error ({:?}): {}", code, message))
        }
        other => GantryError::protocol(format!(
            "unexpected reply frame: {:?}",
            std::mem::discriminant(&other)
        )),
    }
}
