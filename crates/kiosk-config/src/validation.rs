//! Configuration and policy document validation

use crate::schema::{RawAccessLevel, RawConfig, RawPolicyDocument};
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Policy '{name}' (level {level}): {message}")]
    PolicyError {
        name: String,
        level: i64,
        message: String,
    },

    #[error("Duplicate access level: {0}")]
    DuplicateAccessLevel(i64),

    #[error("Service config error: {0}")]
    ServiceError(String),
}

/// Validate a raw service configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let service = &config.service;

    if service.live_window == Some(0) {
        errors.push(ValidationError::ServiceError(
            "live_window must be at least 1".into(),
        ));
    }
    if service.default_page_size == Some(0) {
        errors.push(ValidationError::ServiceError(
            "default_page_size must be at least 1".into(),
        ));
    }
    if service.lock_timeout_ms == Some(0) {
        errors.push(ValidationError::ServiceError(
            "lock_timeout_ms must be at least 1".into(),
        ));
    }

    errors
}

/// Validate a raw policy document
pub fn validate_policy_document(document: &RawPolicyDocument) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen_levels = HashSet::new();
    for level in &document.access_levels {
        if !seen_levels.insert(level.access_level) {
            errors.push(ValidationError::DuplicateAccessLevel(level.access_level));
        }
    }

    for level in &document.access_levels {
        errors.extend(validate_access_level(level));
    }

    errors
}

fn validate_access_level(raw: &RawAccessLevel) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut fail = |message: String| {
        errors.push(ValidationError::PolicyError {
            name: raw.name.clone(),
            level: raw.access_level,
            message,
        })
    };

    if raw.name.trim().is_empty() {
        fail("name cannot be empty".into());
    }

    if raw.access_level <= 0 || u32::try_from(raw.access_level).is_err() {
        fail(format!(
            "access level must be a positive 32-bit integer, got {}",
            raw.access_level
        ));
    }

    if !(-1..=1).contains(&raw.permission_levels_allowed) {
        fail(format!(
            "PermissionLevelsAllowed must be -1, 0 or 1, got {}",
            raw.permission_levels_allowed
        ));
    }

    if raw.is_unrestricted() {
        return errors;
    }

    let mut in_range = true;
    for (field, value, max) in [
        ("TimeStartHour", raw.time_start_hour, 23),
        ("TimeStartMinute", raw.time_start_minute, 59),
        ("TimeEndHour", raw.time_end_hour, 23),
        ("TimeEndMinute", raw.time_end_minute, 59),
    ] {
        if !(0..=max).contains(&value) {
            fail(format!("{} must be in 0..={}, got {}", field, max, value));
            in_range = false;
        }
    }

    // Ordering only means something for real clock times
    if !in_range {
        return errors;
    }

    let start = raw.time_start_hour * 60 + raw.time_start_minute;
    let end = raw.time_end_hour * 60 + raw.time_end_minute;
    if start > end {
        fail(format!(
            "window {:02}:{:02}-{:02}:{:02} wraps past midnight",
            raw.time_start_hour, raw.time_start_minute, raw.time_end_hour, raw.time_end_minute
        ));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(access_level: i64, start: (i32, i32), end: (i32, i32)) -> RawAccessLevel {
        RawAccessLevel {
            name: "Lunch".into(),
            access_level,
            required_permission_level: 1,
            permission_levels_allowed: 1,
            time_start_hour: start.0,
            time_start_minute: start.1,
            time_end_hour: end.0,
            time_end_minute: end.1,
        }
    }

    fn doc(levels: Vec<RawAccessLevel>) -> RawPolicyDocument {
        RawPolicyDocument {
            access_levels: levels,
        }
    }

    #[test]
    fn valid_document_passes() {
        let errors = validate_policy_document(&doc(vec![
            level(1, (8, 0), (9, 0)),
            level(2, (-1, 0), (0, 0)),
        ]));
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn duplicate_levels_rejected() {
        let errors = validate_policy_document(&doc(vec![
            level(1, (8, 0), (9, 0)),
            level(1, (10, 0), (11, 0)),
        ]));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateAccessLevel(1))));
    }

    #[test]
    fn wrapping_window_rejected() {
        let errors = validate_policy_document(&doc(vec![level(1, (22, 0), (2, 0))]));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn out_of_range_fields_collected() {
        let mut raw = level(0, (25, 0), (9, 61));
        raw.permission_levels_allowed = 3;
        raw.name = " ".into();
        let errors = validate_policy_document(&doc(vec![raw]));
        // name, level, direction, start hour, end minute; no wrap check on bad times
        assert_eq!(errors.len(), 5, "{:?}", errors);
    }

    #[test]
    fn huge_time_fields_are_errors_not_overflow() {
        let errors = validate_policy_document(&doc(vec![
            level(1, (2_000_000_000, 0), (9, 0)),
            level(2, (8, i32::MAX), (i32::MAX, i32::MAX)),
        ]));
        assert_eq!(errors.len(), 4, "{:?}", errors);
        assert!(errors
            .iter()
            .all(|e| matches!(e, ValidationError::PolicyError { message, .. } if message.contains("must be in"))));
    }

    #[test]
    fn unrestricted_ignores_other_time_fields() {
        let errors = validate_policy_document(&doc(vec![level(3, (-1, 99), (-5, 99))]));
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn zero_service_values_rejected() {
        let config: RawConfig = toml::from_str(
            r#"
            config_version = 1
            [service]
            live_window = 0
            default_page_size = 0
        "#,
        )
        .unwrap();
        assert_eq!(validate_config(&config).len(), 2);
    }
}
