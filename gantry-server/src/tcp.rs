//! TCP listener for tablet and browser sessions
//!
//! The unix socket serves local desktop sessions; remote UIs (a tablet on
//! the shop network, a secondary browser tab on another machine) connect
//! here when `[network]` is enabled in the config.

use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::handlers::{handle_client, SharedState};

/// Run the TCP accept loop
pub async fn run_tcp_accept_loop(addr: String, shared_state: SharedState) {
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind TCP listener to {}: {}", addr, e);
            return;
        }
    };

    info!("TCP listener bound to {}", addr);

    let mut shutdown_rx = shared_state.subscribe_shutdown();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        debug!("New TCP session from {}", peer_addr);
                        let state_clone = shared_state.clone();
                        tokio::spawn(async move {
                            let (reader, writer) = stream.into_split();
                            handle_client(reader, writer, state_clone).await;
                        });
                    }
                    Err(e) => {
                        error!("TCP accept error: {}", e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping TCP accept loop");
                break;
            }
        }
    }
}
