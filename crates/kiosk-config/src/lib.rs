//! Configuration parsing and validation for kioskd
//!
//! Two inputs are handled here:
//! - `kioskd.toml`, the versioned service configuration
//! - the JSON policy document uploaded by administrators (`AccessLevels`)
//!
//! Both are validated in full before use; every problem is reported at once.

mod policy;
mod schema;
mod validation;

pub use policy::*;
pub use schema::*;
pub use validation::*;

use kiosk_api::AccessPolicy;
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to parse policy document: {0}")]
    DocumentError(#[from] serde_json::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Load and validate service configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<ServiceConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate service configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<ServiceConfig> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(ServiceConfig::from_raw(raw))
}

/// Load and validate a policy document from a JSON file
pub fn load_policy_document(path: impl AsRef<Path>) -> ConfigResult<Vec<AccessPolicy>> {
    let content = std::fs::read_to_string(path)?;
    parse_policy_document(&content)
}

/// Parse and validate a policy document from a JSON string
pub fn parse_policy_document(content: &str) -> ConfigResult<Vec<AccessPolicy>> {
    let raw: RawPolicyDocument = serde_json::from_str(content)?;
    policies_from_document(raw)
}

/// Validate an already-decoded policy document (as carried by the reload command)
pub fn policy_document_from_value(value: serde_json::Value) -> ConfigResult<Vec<AccessPolicy>> {
    let raw: RawPolicyDocument = serde_json::from_value(value)?;
    policies_from_document(raw)
}

fn policies_from_document(raw: RawPolicyDocument) -> ConfigResult<Vec<AccessPolicy>> {
    let errors = validate_policy_document(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    let policies = policies_from_raw(raw);
    tracing::debug!(count = policies.len(), "Policy document validated");
    Ok(policies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_minimal_config() {
        let config = r#"
            config_version = 1
        "#;

        let config = parse_config(config).unwrap();
        assert_eq!(config.live_window, DEFAULT_LIVE_WINDOW);
        assert_eq!(config.default_page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn parse_full_config() {
        let config = r#"
            config_version = 1

            [service]
            socket_path = "/tmp/kioskd-test/kioskd.sock"
            data_dir = "/tmp/kioskd-test/data"
            log_dir = "/tmp/kioskd-test/logs"
            live_window = 10
            default_page_size = 25
            lock_timeout_ms = 250
            policy_file = "/etc/kioskd/policies.json"
        "#;

        let config = parse_config(config).unwrap();
        assert_eq!(config.live_window, 10);
        assert_eq!(config.default_page_size, 25);
        assert_eq!(config.lock_timeout.as_millis(), 250);
        assert_eq!(
            config.database_path(),
            Path::new("/tmp/kioskd-test/data/kioskd.db")
        );
        assert!(config.policy_file.is_some());
    }

    #[test]
    fn reject_wrong_version() {
        let config = r#"
            config_version = 99
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn policy_document_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"AccessLevels":[{{"Name":"Lunch","AccessLevel":2,
                "RequiredPermissionLevel":1,"PermissionLevelsAllowed":1,
                "TimeStartHour":8,"TimeStartMinute":0,
                "TimeEndHour":9,"TimeEndMinute":0}}]}}"#
        )
        .unwrap();

        let policies = load_policy_document(file.path()).unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].access_level, 2);
    }

    #[test]
    fn malformed_policy_document() {
        assert!(matches!(
            parse_policy_document(r#"{"Levels":[]}"#),
            Err(ConfigError::DocumentError(_))
        ));

        let invalid = serde_json::json!({
            "AccessLevels": [{
                "Name": "Late", "AccessLevel": 1,
                "RequiredPermissionLevel": 0, "PermissionLevelsAllowed": 0,
                "TimeStartHour": 23, "TimeStartMinute": 0,
                "TimeEndHour": 1, "TimeEndMinute": 0
            }]
        });
        assert!(matches!(
            policy_document_from_value(invalid),
            Err(ConfigError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn empty_policy_document_is_valid() {
        let policies = parse_policy_document(r#"{"AccessLevels":[]}"#).unwrap();
        assert!(policies.is_empty());
    }
}
