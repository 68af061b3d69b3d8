//! Connection to the gantry controller

use std::path::PathBuf;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use url::Url;

use gantry_protocol::{ClientCodec, ClientMessage, ServerMessage};
use gantry_utils::{socket_path, GantryError, Result};

/// Trait alias for streams that can be used with Framed
pub trait StreamTrait: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> StreamTrait for T {}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Session connection to the gantry controller
pub struct Connection {
    /// Connection address URL (unix://path or tcp://host:port)
    connect_addr: String,
    /// Current state
    state: ConnectionState,
    /// Channel for outgoing messages
    tx: mpsc::Sender<ClientMessage>,
    /// Channel for receiving messages
    rx: mpsc::Receiver<ServerMessage>,
    /// Handle to the connection task
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Connection {
    /// Create a new connection (not yet connected) to the default local socket
    pub fn new() -> Self {
        let (tx, _) = mpsc::channel(100);
        let (_, rx) = mpsc::channel(100);
        let default_socket = socket_path();
        let addr = format!("unix://{}", default_socket.to_string_lossy());

        Self {
            connect_addr: addr,
            state: ConnectionState::Disconnected,
            tx,
            rx,
            task_handle: None,
        }
    }

    /// Create with custom connection address
    pub fn with_addr(addr: impl Into<String>) -> Self {
        let mut conn = Self::new();
        conn.connect_addr = addr.into();
        conn
    }

    /// Create with custom socket path
    pub fn with_socket_path(path: PathBuf) -> Self {
        let mut conn = Self::new();
        conn.connect_addr = format!("unix://{}", path.to_string_lossy());
        conn
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connect to the controller
    pub async fn connect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }

        self.state = ConnectionState::Connecting;

        let stream: Box<dyn StreamTrait> = if self.connect_addr.starts_with("tcp://") {
            let url = Url::parse(&self.connect_addr).map_err(|e| {
                self.state = ConnectionState::Disconnected;
                GantryError::Connection(format!("Invalid TCP URL '{}': {}", self.connect_addr, e))
            })?;

            let host = url.host_str().ok_or_else(|| {
                self.state = ConnectionState::Disconnected;
                GantryError::Connection("Missing host in TCP URL".into())
            })?;
            let port = url.port().ok_or_else(|| {
                self.state = ConnectionState::Disconnected;
                GantryError::Connection("Missing port in TCP URL".into())
            })?;

            let addr = format!("{}:{}", host, port);
            let tcp_stream = TcpStream::connect(&addr).await.map_err(|e| {
                self.state = ConnectionState::Disconnected;
                GantryError::Connection(format!("Failed to connect to {}: {}", addr, e))
            })?;

            Box::new(tcp_stream)
        } else {
            // Assume Unix socket (either unix:// prefix or raw path)
            let path_str = if self.connect_addr.starts_with("unix://") {
                let url = Url::parse(&self.connect_addr).map_err(|e| {
                    self.state = ConnectionState::Disconnected;
                    GantryError::Connection(format!("Invalid Unix URL: {}", e))
                })?;
                url.path().to_string()
            } else {
                self.connect_addr.clone()
            };

            let path = PathBuf::from(path_str);

            if !path.exists() {
                self.state = ConnectionState::Disconnected;
                return Err(GantryError::ServerNotRunning { path });
            }

            let unix_stream = UnixStream::connect(&path).await.map_err(|e| {
                self.state = ConnectionState::Disconnected;
                GantryError::Connection(format!("Failed to connect to {}: {}", path.display(), e))
            })?;

            Box::new(unix_stream)
        };

        // Create framed transport with codec
        let framed = Framed::new(stream, ClientCodec::new());

        // Set up channels
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<ClientMessage>(100);
        let (incoming_tx, incoming_rx) = mpsc::channel::<ServerMessage>(100);

        self.tx = outgoing_tx;
        self.rx = incoming_rx;

        // Spawn connection task
        let handle = tokio::spawn(Self::connection_task(framed, outgoing_rx, incoming_tx));
        self.task_handle = Some(handle);

        self.state = ConnectionState::Connected;
        Ok(())
    }

    /// Disconnect from the controller
    pub async fn disconnect(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Send a message to the controller
    pub async fn send(&self, msg: ClientMessage) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(GantryError::connection("Not connected"));
        }

        self.tx
            .send(msg)
            .await
            .map_err(|_| GantryError::ConnectionClosed)?;

        Ok(())
    }

    /// Receive next message from the controller
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.rx.recv().await
    }

    /// Get a clonable sender for outgoing messages
    pub fn sender(&self) -> mpsc::Sender<ClientMessage> {
        self.tx.clone()
    }

    /// Background task that handles the actual socket I/O
    async fn connection_task(
        mut framed: Framed<Box<dyn StreamTrait>, ClientCodec>,
        mut outgoing: mpsc::Receiver<ClientMessage>,
        incoming: mpsc::Sender<ServerMessage>,
    ) {
        loop {
            tokio::select! {
                // Handle outgoing messages
                Some(msg) = outgoing.recv() => {
                    if let Err(e) = framed.send(msg).await {
                        tracing::error!("Failed to send message: {}", e);
                        break;
                    }
                }

                // Handle incoming messages
                result = framed.next() => {
                    match result {
                        Some(Ok(msg)) => {
                            if incoming.send(msg).await.is_err() {
                                tracing::debug!("Incoming channel closed, receiver dropped");
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::error!("Failed to receive message: {}", e);
                            break;
                        }
                        None => {
                            tracing::info!("Controller closed connection");
                            break;
                        }
                    }
                }
            }
        }
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}
