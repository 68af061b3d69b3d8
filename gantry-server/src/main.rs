//! gantry controller daemon
//!
//! Owns the canonical settings store for one machine and serves any number
//! of concurrently connected UI sessions over a unix socket (and TCP when
//! enabled).

use tokio::net::UnixListener;
use tracing::{error, info, warn};

use gantry_utils::{init_logging_with_config, paths, GantryError, LogConfig, Result};

mod config;
mod handlers;
mod registry;
mod store;
mod tcp;

use handlers::{handle_client, SharedState};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging_with_config(LogConfig::server())?;

    let app_config = config::load()?;
    info!(
        "gantry-server {} starting (debounce {} ms, tcp {})",
        env!("CARGO_PKG_VERSION"),
        app_config.general.debounce_ms,
        if app_config.network.enabled { "on" } else { "off" },
    );

    let runtime_dir = paths::runtime_dir();
    paths::ensure_dir(&runtime_dir).map_err(|e| GantryError::FileWrite {
        path: runtime_dir.clone(),
        source: e,
    })?;

    let socket = paths::socket_path();
    if socket.exists() {
        // Stale socket from an unclean shutdown
        warn!("Removing stale socket at {}", socket.display());
        std::fs::remove_file(&socket)?;
    }

    let listener = UnixListener::bind(&socket)
        .map_err(|e| GantryError::connection(format!("bind {}: {}", socket.display(), e)))?;
    info!("Listening on {}", socket.display());

    write_pid_file()?;

    let state = SharedState::new(app_config);

    if state.config.network.enabled {
        let addr = state.config.network.listen_addr.clone();
        tokio::spawn(tcp::run_tcp_accept_loop(addr, state.clone()));
    }

    let mut shutdown_rx = state.subscribe_shutdown();
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let state_clone = state.clone();
                        tokio::spawn(async move {
                            let (reader, writer) = stream.into_split();
                            handle_client(reader, writer, state_clone).await;
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                let _ = state.shutdown_tx.send(());
                break;
            }
            _ = sigterm.recv() => {
                info!("Terminated, shutting down");
                let _ = state.shutdown_tx.send(());
                break;
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }

    let _ = std::fs::remove_file(&socket);
    let _ = std::fs::remove_file(paths::pid_file());
    info!("Shutdown complete");
    Ok(())
}

/// Record our PID so tooling can find the running daemon
fn write_pid_file() -> Result<()> {
    let path = paths::pid_file();
    std::fs::write(&path, std::process::id().to_string()).map_err(|e| GantryError::FileWrite {
        path,
        source: e,
    })
}
