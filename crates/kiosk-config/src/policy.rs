//! Validated configuration structures

use crate::schema::{RawAccessLevel, RawConfig, RawPolicyDocument, RawServiceConfig};
use kiosk_api::{AccessPolicy, Direction};
use kiosk_util::{default_data_dir, default_log_dir, default_socket_path, AdmissionWindow, WallClock};
use std::path::PathBuf;
use std::time::Duration;

/// Default number of audit records in each live snapshot
pub const DEFAULT_LIVE_WINDOW: usize = 20;

/// Default listing page size
pub const DEFAULT_PAGE_SIZE: u32 = 5;

/// Default upper bound on waiting for a student row lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

/// Validated service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub live_window: usize,
    pub default_page_size: u32,
    pub lock_timeout: Duration,
    pub policy_file: Option<PathBuf>,
}

impl ServiceConfig {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self::from_raw_service(raw.service)
    }

    fn from_raw_service(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw.socket_path.unwrap_or_else(default_socket_path),
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            log_dir: raw.log_dir.unwrap_or_else(default_log_dir),
            live_window: raw.live_window.unwrap_or(DEFAULT_LIVE_WINDOW),
            default_page_size: raw.default_page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            lock_timeout: raw
                .lock_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_LOCK_TIMEOUT),
            policy_file: raw.policy_file,
        }
    }

    /// Path of the SQLite database inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("kioskd.db")
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw_service(RawServiceConfig::default())
    }
}

/// Convert a validated policy document into access policies
pub fn policies_from_raw(document: RawPolicyDocument) -> Vec<AccessPolicy> {
    document
        .access_levels
        .into_iter()
        .filter_map(convert_access_level)
        .collect()
}

fn convert_access_level(raw: RawAccessLevel) -> Option<AccessPolicy> {
    let window = convert_window(&raw)?;
    Some(AccessPolicy {
        access_level: u32::try_from(raw.access_level).ok()?,
        required_privilege: raw.required_permission_level,
        direction: Direction::from_code(raw.permission_levels_allowed)?,
        window,
        name: raw.name,
    })
}

fn convert_window(raw: &RawAccessLevel) -> Option<AdmissionWindow> {
    if raw.is_unrestricted() {
        return Some(AdmissionWindow::AlwaysOpen);
    }
    let start = WallClock::new(
        u8::try_from(raw.time_start_hour).ok()?,
        u8::try_from(raw.time_start_minute).ok()?,
    )?;
    let end = WallClock::new(
        u8::try_from(raw.time_end_hour).ok()?,
        u8::try_from(raw.time_end_minute).ok()?,
    )?;
    AdmissionWindow::windowed(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.live_window, 20);
        assert_eq!(config.default_page_size, 5);
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
        assert!(config.policy_file.is_none());
        assert!(config.database_path().ends_with("kioskd.db"));
    }

    #[test]
    fn sentinel_hour_is_always_open() {
        let doc: RawPolicyDocument = serde_json::from_str(
            r#"{"AccessLevels":[{"Name":"Library","AccessLevel":4,
                "RequiredPermissionLevel":0,"PermissionLevelsAllowed":1,
                "TimeStartHour":-1,"TimeStartMinute":-1,
                "TimeEndHour":-1,"TimeEndMinute":-1}]}"#,
        )
        .unwrap();
        let policies = policies_from_raw(doc);
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].window, AdmissionWindow::AlwaysOpen);
        assert_eq!(policies[0].direction, Direction::AtLeast);
    }

    #[test]
    fn windowed_policy_converts() {
        let doc: RawPolicyDocument = serde_json::from_str(
            r#"{"AccessLevels":[{"Name":"Lunch","AccessLevel":2,
                "RequiredPermissionLevel":1,"PermissionLevelsAllowed":-1,
                "TimeStartHour":8,"TimeStartMinute":0,
                "TimeEndHour":9,"TimeEndMinute":30}]}"#,
        )
        .unwrap();
        let policy = &policies_from_raw(doc)[0];
        assert_eq!(policy.name, "Lunch");
        assert_eq!(policy.access_level, 2);
        assert_eq!(policy.direction, Direction::AtMost);
        assert_eq!(policy.window.to_string(), "08:00-09:30");
    }
}
