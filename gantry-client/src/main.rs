//! gantry CLI entry point

use clap::Parser;

use gantry_utils::{init_logging_with_config, LogConfig};

mod commands;

#[tokio::main]
async fn main() {
    let cli = commands::Cli::parse();

    let log_config = LogConfig {
        filter: std::env::var("GANTRY_LOG").unwrap_or_else(|_| "warn".into()),
        ..LogConfig::default()
    };
    if let Err(e) = init_logging_with_config(log_config) {
        eprintln!("warning: failed to set up logging: {}", e);
    }

    if let Err(e) = commands::run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
