//! CLI subcommands for poking the controller's settings store

use clap::{Parser, Subcommand};
use serde_json::Value;

use gantry_protocol::ClientKind;
use gantry_utils::{socket_path, Result};

use gantry_client::ApiClient;

/// Inspect and edit the machine settings held by a running gantry controller
#[derive(Debug, Parser)]
#[command(name = "gantry", version, about)]
pub struct Cli {
    /// Controller address (unix://path or tcp://host:port)
    #[arg(long, env = "GANTRY_ADDR")]
    pub addr: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read the full state, or one dotted key
    Get {
        /// Dotted setting key (e.g. workspace.probeProfile.zThickness)
        key: Option<String>,
    },
    /// Write one setting; VALUE is parsed as JSON, or taken as a string
    Set { key: String, value: String },
    /// Remove a setting
    Unset { key: String },
    /// Stream change notifications as they happen
    Watch,
}

pub async fn run(cli: Cli) -> Result<()> {
    let addr = cli
        .addr
        .unwrap_or_else(|| format!("unix://{}", socket_path().to_string_lossy()));

    let api = ApiClient::connect(&addr, ClientKind::Cli).await?;

    match cli.command {
        Command::Get { key } => match api.get_state(key.as_deref()).await {
            Ok(value) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
                );
            }
            Err(e) if e.is_not_found() => {
                println!("(not set)");
            }
            Err(e) => return Err(e),
        },

        Command::Set { key, value } => {
            // Bare words become strings: `gantry set workspace.units mm`
            let parsed: Value =
                serde_json::from_str(&value).unwrap_or(Value::String(value));
            let changed = api.set_state_at(&key, parsed).await?;
            if changed.is_empty() {
                println!("unchanged");
            } else {
                println!("changed: {}", changed.join(", "));
            }
        }

        Command::Unset { key } => match api.unset_state(&key).await {
            Ok(()) => println!("removed"),
            Err(e) if e.is_not_found() => println!("(not set)"),
            Err(e) => return Err(e),
        },

        Command::Watch => {
            let mut changes_rx = api.subscribe_changes();
            loop {
                match changes_rx.recv().await {
                    Ok(changes) => {
                        for (key, value) in &changes {
                            println!("{} = {}", key, value.inner());
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        eprintln!("warning: missed {} notifications", missed);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    Ok(())
}
