//! Error types for gantry
//!
//! Provides a unified error type used across all gantry crates.

use std::path::PathBuf;

/// Main error type for gantry operations
#[derive(Debug, thiserror::Error)]
pub enum GantryError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Connection Errors ===

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Controller not running at {path}")]
    ServerNotRunning { path: PathBuf },

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Protocol version mismatch: client={client}, server={server}")]
    ProtocolMismatch { client: u32, server: u32 },

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    // === State Errors ===

    /// A setting key that has never been written. This is an expected
    /// condition on first run and must not be logged as an error.
    #[error("Setting not found: {0}")]
    KeyNotFound(String),

    #[error("Invalid setting key: {0}")]
    InvalidKey(String),

    // === Batch Errors ===

    #[error("Applier '{id}' failed: {message}")]
    ApplierFailed { id: String, message: String },

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GantryError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a key-not-found error
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound(key.into())
    }

    /// Create an applier failure
    pub fn applier_failed(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ApplierFailed {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is a missing-key read, which callers treat as
    /// a normal condition rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound(_))
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::ConnectionClosed)
    }
}

/// Result type alias using GantryError
pub type Result<T> = std::result::Result<T, GantryError>;

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Display Tests ====================

    #[test]
    fn test_error_display_key_not_found() {
        let err = GantryError::KeyNotFound("workspace.units".into());
        assert_eq!(err.to_string(), "Setting not found: workspace.units");
    }

    #[test]
    fn test_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = GantryError::Io(io_err);
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_error_display_file_write() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied");
        let err = GantryError::FileWrite {
            path: PathBuf::from("/var/log/gantry.log"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to write file"));
        assert!(msg.contains("/var/log/gantry.log"));
    }

    #[test]
    fn test_error_display_connection() {
        let err = GantryError::Connection("refused".into());
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_error_display_server_not_running() {
        let err = GantryError::ServerNotRunning {
            path: PathBuf::from("/tmp/gantry.sock"),
        };
        let msg = err.to_string();
        assert!(msg.contains("Controller not running"));
        assert!(msg.contains("/tmp/gantry.sock"));
    }

    #[test]
    fn test_error_display_protocol_mismatch() {
        let err = GantryError::ProtocolMismatch {
            client: 1,
            server: 2,
        };
        assert_eq!(
            err.to_string(),
            "Protocol version mismatch: client=1, server=2"
        );
    }

    #[test]
    fn test_error_display_applier_failed() {
        let err = GantryError::applier_failed("probe-panel", "stale handle");
        assert_eq!(
            err.to_string(),
            "Applier 'probe-panel' failed: stale handle"
        );
    }

    #[test]
    fn test_error_display_config_invalid() {
        let err = GantryError::ConfigInvalid {
            path: PathBuf::from("/home/user/.config/gantry/config.toml"),
            message: "syntax error".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Invalid configuration"));
        assert!(msg.contains("config.toml"));
        assert!(msg.contains("syntax error"));
    }

    // ==================== Classification Tests ====================

    #[test]
    fn test_is_not_found() {
        assert!(GantryError::key_not_found("theme").is_not_found());
        assert!(!GantryError::connection("refused").is_not_found());
        assert!(!GantryError::internal("oops").is_not_found());
    }

    #[test]
    fn test_retryable() {
        assert!(GantryError::Connection("refused".into()).is_retryable());
        assert!(GantryError::ConnectionClosed.is_retryable());
        assert!(!GantryError::KeyNotFound("x".into()).is_retryable());
    }

    #[test]
    fn test_not_retryable_errors() {
        let non_retryable = [
            GantryError::KeyNotFound("test".into()),
            GantryError::InvalidKey("".into()),
            GantryError::Protocol("error".into()),
            GantryError::ProtocolMismatch { client: 1, server: 2 },
            GantryError::Config("bad".into()),
            GantryError::applier_failed("id", "boom"),
            GantryError::Internal("error".into()),
            GantryError::ServerNotRunning { path: PathBuf::from("/tmp/sock") },
        ];

        for err in non_retryable {
            assert!(!err.is_retryable(), "Expected {:?} to NOT be retryable", err);
        }
    }

    // ==================== From Trait Tests ====================

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: GantryError = io_err.into();
        assert!(matches!(err, GantryError::Io(_)));
    }

    // ==================== Helper Function Tests ====================

    #[test]
    fn test_connection_helper() {
        let err = GantryError::connection("connection refused");
        assert!(matches!(err, GantryError::Connection(_)));
        assert_eq!(err.to_string(), "Connection failed: connection refused");
    }

    #[test]
    fn test_protocol_helper() {
        let err = GantryError::protocol("invalid frame header");
        assert!(matches!(err, GantryError::Protocol(_)));
    }

    #[test]
    fn test_config_helper() {
        let err = GantryError::config("missing required field 'listen_addr'");
        assert!(matches!(err, GantryError::Config(_)));
    }

    #[test]
    fn test_internal_helper() {
        let err = GantryError::internal("invariant violated");
        assert!(matches!(err, GantryError::Internal(_)));
    }

    // ==================== Result Type Tests ====================

    #[test]
    fn test_result_ok() {
        let result: Result<i32> = Ok(42);
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_result_err() {
        let result: Result<i32> = Err(GantryError::KeyNotFound("test".into()));
        assert!(result.is_err());
    }
}
