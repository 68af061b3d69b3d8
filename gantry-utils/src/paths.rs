//! Path utilities for gantry
//!
//! Handles XDG Base Directory specification compliance for config,
//! state, and runtime directories.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application identifier for XDG directories
const APP_NAME: &str = "gantry";

/// Get project directories
fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

/// Get the Unix socket path for session-controller communication
///
/// Location: `$XDG_RUNTIME_DIR/gantry/gantry.sock` or `/tmp/gantry-$UID/gantry.sock`
pub fn socket_path() -> PathBuf {
    runtime_dir().join("gantry.sock")
}

/// Get the runtime directory
///
/// Location: `$XDG_RUNTIME_DIR/gantry` or `/tmp/gantry-$UID`
pub fn runtime_dir() -> PathBuf {
    if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(xdg_runtime).join(APP_NAME)
    } else {
        // Fallback to /tmp with UID for security
        // SAFETY: getuid() is always safe to call
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/{}-{}", APP_NAME, uid))
    }
}

/// Get the configuration directory
///
/// Location: `$XDG_CONFIG_HOME/gantry` or `~/.config/gantry`
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".").join(APP_NAME))
}

/// Get the controller configuration file path
///
/// Location: `$XDG_CONFIG_HOME/gantry/config.toml`
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the legacy per-session settings file
///
/// Older releases kept all workspace settings in a local JSON file instead
/// of the controller-owned store. The migration runner reads from here.
///
/// Location: `$XDG_CONFIG_HOME/gantry/workspace-settings.json`
pub fn legacy_settings_file() -> PathBuf {
    config_dir().join("workspace-settings.json")
}

/// Get the state directory (persistent state)
///
/// Location: `$XDG_STATE_HOME/gantry` or `~/.local/state/gantry`
pub fn state_dir() -> PathBuf {
    project_dirs()
        .and_then(|p| p.state_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from(".").join(APP_NAME).join("state"))
}

/// Get the log directory
///
/// Location: `$XDG_STATE_HOME/gantry/log` or `~/.local/state/gantry/log`
pub fn log_dir() -> PathBuf {
    state_dir().join("log")
}

/// Get the PID file path (for the daemon)
///
/// Location: `$XDG_RUNTIME_DIR/gantry/gantry.pid`
pub fn pid_file() -> PathBuf {
    runtime_dir().join("gantry.pid")
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &PathBuf) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path_under_runtime_dir() {
        let socket = socket_path();
        assert!(socket.starts_with(runtime_dir()));
        assert_eq!(socket.file_name().unwrap(), "gantry.sock");
    }

    #[test]
    fn test_config_file_under_config_dir() {
        let file = config_file();
        assert!(file.starts_with(config_dir()));
        assert_eq!(file.file_name().unwrap(), "config.toml");
    }

    #[test]
    fn test_legacy_settings_file_name() {
        let file = legacy_settings_file();
        assert_eq!(file.file_name().unwrap(), "workspace-settings.json");
    }

    #[test]
    fn test_log_dir_under_state_dir() {
        assert!(log_dir().starts_with(state_dir()));
    }

    #[test]
    fn test_pid_file_under_runtime_dir() {
        assert!(pid_file().starts_with(runtime_dir()));
    }

    #[test]
    fn test_ensure_dir_creates() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());

        // Second call is a no-op
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
