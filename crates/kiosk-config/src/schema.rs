//! Raw configuration schema (as parsed from TOML and JSON)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw service configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Global service settings
    #[serde(default)]
    pub service: RawServiceConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Data directory for the store
    pub data_dir: Option<PathBuf>,

    /// Directory for daily per-policy check-in files
    pub log_dir: Option<PathBuf>,

    /// Number of audit records in each live snapshot
    pub live_window: Option<usize>,

    /// Page size used when a listing omits one
    pub default_page_size: Option<u32>,

    /// Upper bound on waiting for a student row lock
    pub lock_timeout_ms: Option<u64>,

    /// Policy document applied once at startup
    pub policy_file: Option<PathBuf>,
}

/// Raw policy document, in the admin upload format
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawPolicyDocument {
    #[serde(rename = "AccessLevels")]
    pub access_levels: Vec<RawAccessLevel>,
}

/// One policy entry of the upload format.
///
/// `TimeStartHour == -1` marks an unrestricted window; the other time
/// fields are then ignored.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawAccessLevel {
    pub name: String,
    pub access_level: i64,
    pub required_permission_level: i32,
    /// Direction code: -1 at most, 0 equal, 1 at least
    pub permission_levels_allowed: i32,
    pub time_start_hour: i32,
    #[serde(default)]
    pub time_start_minute: i32,
    #[serde(default)]
    pub time_end_hour: i32,
    #[serde(default)]
    pub time_end_minute: i32,
}

impl RawAccessLevel {
    pub fn is_unrestricted(&self) -> bool {
        self.time_start_hour == -1
    }
}
