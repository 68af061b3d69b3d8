//! In-process controller double for client tests
//!
//! Speaks the real wire protocol over a unix socket and keeps its state in
//! a `SettingsDocument`, mirroring the controller's dispatch: replies in
//! request order, one `StateChanged` broadcast per mutating request, fanned
//! out to every connected session including the originator.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use gantry_protocol::{
    ClientMessage, JsonValue, ServerCodec, ServerMessage, SettingsDocument, PROTOCOL_VERSION,
};

type SharedDocument = Arc<Mutex<SettingsDocument>>;
type WriteLog = Arc<Mutex<Vec<ClientMessage>>>;
type Peers = Arc<Mutex<Vec<mpsc::Sender<ServerMessage>>>>;
type Tasks = Arc<Mutex<Vec<JoinHandle<()>>>>;

pub(crate) struct MockController {
    pub addr: String,
    state: SharedDocument,
    writes: WriteLog,
    tasks: Tasks,
    _dir: tempfile::TempDir,
}

impl MockController {
    /// Preload canonical state
    pub fn seed(&self, body: Value) {
        self.state.lock().set(None, body);
    }

    /// Snapshot of the canonical document
    pub fn document(&self) -> SettingsDocument {
        self.state.lock().clone()
    }

    /// Every SetState request received, in arrival order
    pub fn set_requests(&self) -> Vec<ClientMessage> {
        self.writes.lock().clone()
    }

    /// Tear the controller down, dropping all live connections
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for MockController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub(crate) async fn spawn_mock_controller() -> MockController {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("controller.sock");
    let listener = UnixListener::bind(&socket).unwrap();

    let state: SharedDocument = Arc::new(Mutex::new(SettingsDocument::new()));
    let writes: WriteLog = Arc::new(Mutex::new(Vec::new()));
    let peers: Peers = Arc::new(Mutex::new(Vec::new()));
    let tasks: Tasks = Arc::new(Mutex::new(Vec::new()));

    let accept_state = Arc::clone(&state);
    let accept_writes = Arc::clone(&writes);
    let accept_peers = Arc::clone(&peers);
    let accept_tasks = Arc::clone(&tasks);
    let accept_task = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let task = tokio::spawn(serve_connection(
                stream,
                Arc::clone(&accept_state),
                Arc::clone(&accept_writes),
                Arc::clone(&accept_peers),
            ));
            accept_tasks.lock().push(task);
        }
    });
    tasks.lock().push(accept_task);

    MockController {
        addr: format!("unix://{}", socket.to_string_lossy()),
        state,
        writes,
        tasks,
        _dir: dir,
    }
}

async fn serve_connection(stream: UnixStream, state: SharedDocument, writes: WriteLog, peers: Peers) {
    let mut framed = Framed::new(stream, ServerCodec::new());
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(64);
    peers.lock().push(tx.clone());

    loop {
        tokio::select! {
            Some(msg) = rx.recv() => {
                if framed.send(msg).await.is_err() {
                    break;
                }
            }
            frame = framed.next() => {
                let Some(Ok(msg)) = frame else { break };
                let reply = dispatch(msg, &state, &writes, &peers);
                if tx.send(reply).await.is_err() {
                    break;
                }
            }
        }
    }
}

fn dispatch(
    msg: ClientMessage,
    state: &SharedDocument,
    writes: &WriteLog,
    peers: &Peers,
) -> ServerMessage {
    match msg {
        ClientMessage::Connect { .. } => ServerMessage::Connected {
            server_version: "mock".into(),
            protocol_version: PROTOCOL_VERSION,
        },
        ClientMessage::GetState { key } => match state.lock().get(key.as_deref()) {
            Some(value) => ServerMessage::State {
                value: JsonValue::new(value),
            },
            None => ServerMessage::NotFound {
                key: key.unwrap_or_default(),
            },
        },
        ClientMessage::SetState { key, body } => {
            writes.lock().push(ClientMessage::SetState {
                key: key.clone(),
                body: body.clone(),
            });

            let changes = state.lock().set(key.as_deref(), body.into_inner());
            let changed_keys: Vec<String> = changes.keys().cloned().collect();

            if !changes.is_empty() {
                for peer in peers.lock().iter() {
                    let _ = peer.try_send(ServerMessage::StateChanged {
                        changes: changes.clone(),
                    });
                }
            }

            ServerMessage::WriteAck { changed_keys }
        }
        ClientMessage::UnsetState { key } => match state.lock().unset(&key) {
            Some(changes) => {
                for peer in peers.lock().iter() {
                    let _ = peer.try_send(ServerMessage::StateChanged {
                        changes: changes.clone(),
                    });
                }
                ServerMessage::UnsetAck
            }
            None => ServerMessage::NotFound { key },
        },
        ClientMessage::Ping => ServerMessage::Pong,
    }
}
