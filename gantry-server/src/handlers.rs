//! Per-connection request handling
//!
//! Each connected session gets one handler task running the framed read
//! loop. Replies go out through the session's own mpsc channel, the same
//! channel the broadcast bus uses, so replies and change notifications
//! stay ordered per session.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use gantry_protocol::{ClientMessage, ErrorCode, JsonValue, ServerCodec, ServerMessage, PROTOCOL_VERSION};

use crate::config::AppConfig;
use crate::registry::{ClientId, ClientRegistry};
use crate::store::SettingsStore;

use std::sync::Arc;

/// State shared by every connection handler
#[derive(Clone)]
pub struct SharedState {
    pub store: Arc<SettingsStore>,
    pub registry: Arc<ClientRegistry>,
    pub config: Arc<AppConfig>,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl SharedState {
    /// Create shared state with an empty store and no connected sessions
    pub fn new(config: AppConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            store: Arc::new(SettingsStore::new()),
            registry: Arc::new(ClientRegistry::new()),
            config: Arc::new(config),
            shutdown_tx,
        }
    }

    /// Subscribe to the shutdown signal
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }
}

/// Run the handler loop for one connected session
pub async fn handle_client<R, W>(reader: R, writer: W, state: SharedState)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut framed_read = FramedRead::new(reader, ServerCodec::new());
    let mut framed_write = FramedWrite::new(writer, ServerCodec::new());

    let (tx, mut rx) = mpsc::channel::<ServerMessage>(100);
    let client_id = state.registry.register_client(tx.clone());

    // Writer task: drains the session's channel into the socket
    let write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = framed_write.send(msg).await {
                debug!("Write to session failed: {}", e);
                break;
            }
        }
    });

    while let Some(result) = framed_read.next().await {
        match result {
            Ok(msg) => {
                if let Some(reply) = dispatch(client_id, msg, &state) {
                    if tx.send(reply).await.is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                warn!("{} frame decode error: {}", client_id, e);
                break;
            }
        }
    }

    state.registry.unregister_client(client_id);
    drop(tx);
    let _ = write_task.await;
    debug!("{} handler finished", client_id);
}

/// Handle one request, returning the reply to send back.
///
/// A mutating request that changed at least one key triggers the broadcast
/// bus exactly once, with the aggregated change set, never once per
/// affected descendant key.
fn dispatch(client_id: ClientId, msg: ClientMessage, state: &SharedState) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Connect {
            client_id: session_uuid,
            protocol_version,
            client_kind,
        } => {
            if protocol_version != PROTOCOL_VERSION {
                warn!(
                    "{} protocol mismatch: client={}, server={}",
                    client_id, protocol_version, PROTOCOL_VERSION
                );
                return Some(ServerMessage::Error {
                    code: ErrorCode::ProtocolMismatch,
                    message: format!(
                        "unsupported protocol version {} (server speaks {})",
                        protocol_version, PROTOCOL_VERSION
                    ),
                });
            }

            state.registry.set_client_kind(client_id, client_kind);
            info!(
                "{} connected: session {} ({:?})",
                client_id, session_uuid, client_kind
            );

            Some(ServerMessage::Connected {
                server_version: env!("CARGO_PKG_VERSION").to_string(),
                protocol_version: PROTOCOL_VERSION,
            })
        }

        ClientMessage::GetState { key } => match state.store.get(key.as_deref()) {
            Ok(value) => Some(ServerMessage::State {
                value: JsonValue::new(value),
            }),
            Err(e) if e.is_not_found() => {
                // Expected on first run; not an error
                debug!("{} read missing key {:?}", client_id, key);
                Some(ServerMessage::NotFound {
                    key: key.unwrap_or_default(),
                })
            }
            Err(e) => Some(internal_error(e)),
        },

        ClientMessage::SetState { key, body } => {
            match state.store.set(key.as_deref(), body.into_inner()) {
                Ok(changes) => {
                    let changed_keys: Vec<String> = changes.keys().cloned().collect();

                    if !changes.is_empty() {
                        let delivered = state
                            .registry
                            .broadcast_to_all(ServerMessage::StateChanged { changes });
                        debug!(
                            "{} wrote {:?}: {} keys changed, notified {} sessions",
                            client_id,
                            key,
                            changed_keys.len(),
                            delivered
                        );
                    }

                    Some(ServerMessage::WriteAck { changed_keys })
                }
                Err(e) => Some(ServerMessage::Error {
                    code: ErrorCode::InvalidRequest,
                    message: e.to_string(),
                }),
            }
        }

        ClientMessage::UnsetState { key } => match state.store.unset(&key) {
            Ok(changes) => {
                let delivered = state
                    .registry
                    .broadcast_to_all(ServerMessage::StateChanged { changes });
                debug!(
                    "{} unset {}: notified {} sessions",
                    client_id, key, delivered
                );
                Some(ServerMessage::UnsetAck)
            }
            Err(e) if e.is_not_found() => {
                debug!("{} unset missing key {}", client_id, key);
                Some(ServerMessage::NotFound { key })
            }
            Err(e) => Some(internal_error(e)),
        },

        ClientMessage::Ping => Some(ServerMessage::Pong),
    }
}

fn internal_error(e: gantry_utils::GantryError) -> ServerMessage {
    ServerMessage::Error {
        code: ErrorCode::Internal,
        message: e.to_string(),
    }
}
