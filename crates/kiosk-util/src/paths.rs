//! Default paths for kioskd components
//!
//! Paths are user-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/kioskd/kioskd.sock` or `/tmp/kioskd-$USER/kioskd.sock`
//! - Data: `$XDG_DATA_HOME/kioskd` or `~/.local/share/kioskd`
//! - Daily check-in logs: `$XDG_STATE_HOME/kioskd` or `~/.local/state/kioskd`
//! - Config: `$XDG_CONFIG_HOME/kioskd/kioskd.toml` or `~/.config/kioskd/kioskd.toml`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const KIOSK_SOCKET_ENV: &str = "KIOSK_SOCKET";

/// Environment variable for overriding the data directory
pub const KIOSK_DATA_DIR_ENV: &str = "KIOSK_DATA_DIR";

/// Socket filename within the socket directory
const SOCKET_FILENAME: &str = "kioskd.sock";

const CONFIG_FILENAME: &str = "kioskd.toml";

/// Application subdirectory name
const APP_DIR: &str = "kioskd";

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$KIOSK_SOCKET` environment variable (if set)
/// 2. `$XDG_RUNTIME_DIR/kioskd/kioskd.sock` (if XDG_RUNTIME_DIR is set)
/// 3. `/tmp/kioskd-$USER/kioskd.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    // Check environment override first
    if let Ok(path) = std::env::var(KIOSK_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Get the socket path without checking the KIOSK_SOCKET env var.
/// Used for config defaults where the env var is checked separately.
pub fn socket_path_without_env() -> PathBuf {
    // Per-user runtime dir, usually /run/user/<uid>
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    // Fall back to /tmp with the username
    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$KIOSK_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/kioskd` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/kioskd` (fallback)
pub fn default_data_dir() -> PathBuf {
    // Check environment override first
    if let Ok(path) = std::env::var(KIOSK_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking the KIOSK_DATA_DIR env var.
pub fn data_dir_without_env() -> PathBuf {
    // Try XDG_DATA_HOME first
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    // Fallback to ~/.local/share/kioskd
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the default directory for daily per-policy check-in files.
///
/// Order of precedence:
/// 1. `$XDG_STATE_HOME/kioskd` (if XDG_STATE_HOME is set)
/// 2. `~/.local/state/kioskd` (fallback)
pub fn default_log_dir() -> PathBuf {
    // Try XDG_STATE_HOME first
    if let Ok(state_home) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(state_home).join(APP_DIR);
    }

    // Fallback to ~/.local/state/kioskd
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("state")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("logs")
}

/// Get the default service configuration file path.
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    // Fallback to ~/.config/kioskd
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    // System-wide config when there is no home
    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}
