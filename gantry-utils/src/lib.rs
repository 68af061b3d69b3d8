//! gantry-utils: Common utilities shared across all gantry crates
//!
//! Provides the unified error type, logging setup, and XDG path helpers.

pub mod error;
pub mod logging;
pub mod paths;

pub use error::{GantryError, Result};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogOutput};
pub use paths::socket_path;
