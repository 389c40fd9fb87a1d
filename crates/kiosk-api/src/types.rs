//! Shared types for the kioskd API

use chrono::{DateTime, Local};
use kiosk_util::AdmissionWindow;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which way a student's privilege is compared against a policy's requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Direction {
    /// Student privilege must not exceed the requirement
    AtMost,
    /// Student privilege must equal the requirement
    Equal,
    /// Student privilege must meet or exceed the requirement
    AtLeast,
}

impl Direction {
    /// Decode the persisted/document code: -1, 0, 1
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Self::AtMost),
            0 => Some(Self::Equal),
            1 => Some(Self::AtLeast),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::AtMost => -1,
            Self::Equal => 0,
            Self::AtLeast => 1,
        }
    }
}

impl From<Direction> for i32 {
    fn from(direction: Direction) -> Self {
        direction.code()
    }
}

impl TryFrom<i32> for Direction {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("invalid direction code {}", code))
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AtMost => write!(f, "at most"),
            Self::Equal => write!(f, "equal"),
            Self::AtLeast => write!(f, "at least"),
        }
    }
}

/// Access policy bound to a kiosk access level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Display name, also used to name the daily check-in file
    pub name: String,
    pub access_level: u32,
    pub required_privilege: i32,
    pub direction: Direction,
    pub window: AdmissionWindow,
}

impl AccessPolicy {
    /// Whether a student with `student_privilege` passes this policy
    pub fn accept(&self, student_privilege: i32) -> bool {
        match self.direction {
            Direction::Equal => student_privilege == self.required_privilege,
            Direction::AtLeast => student_privilege >= self.required_privilege,
            Direction::AtMost => student_privilege <= self.required_privilege,
        }
    }
}

/// A kiosk credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub access_level: u32,
    pub enabled: bool,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, access_level: u32) -> Self {
        Self {
            token: token.into(),
            access_level,
            enabled: true,
        }
    }

    /// Decode the persisted signed form, where a negative level means disabled.
    ///
    /// Returns None for a level of zero or one that does not fit in `u32`.
    pub fn from_signed(token: impl Into<String>, signed_level: i64) -> Option<Self> {
        let access_level = u32::try_from(signed_level.unsigned_abs()).ok()?;
        if access_level == 0 {
            return None;
        }
        Some(Self {
            token: token.into(),
            access_level,
            enabled: signed_level > 0,
        })
    }

    /// Encode into the persisted signed form
    pub fn signed_level(&self) -> i64 {
        let level = i64::from(self.access_level);
        if self.enabled { level } else { -level }
    }
}

/// Result of enabling or disabling a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenToggle {
    Enabled,
    Disabled,
    AlreadyEnabled,
    AlreadyDisabled,
}

impl TokenToggle {
    /// Whether the stored state actually changed
    pub fn changed(self) -> bool {
        matches!(self, Self::Enabled | Self::Disabled)
    }
}

/// A student row, in its listing shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub privilege_type: i32,
    /// 0 or 1; toggled by every accepted check-in
    pub status: i32,
}

impl Student {
    /// Stand-in for an id with no matching row, used only to log the attempt
    pub fn placeholder(id: i64) -> Self {
        Self {
            id,
            name: String::new(),
            privilege_type: -1,
            status: -1,
        }
    }
}

/// One check-in transaction's status change, in its listing shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Sequence number, assigned by the store
    pub number: i64,
    #[serde(rename = "id")]
    pub student_id: i64,
    pub prev_status: i32,
    pub new_status: i32,
    pub date: DateTime<Local>,
    pub kiosk_name: String,
}

impl AuditRecord {
    pub fn new(
        student_id: i64,
        prev_status: i32,
        new_status: i32,
        date: DateTime<Local>,
        kiosk_name: impl Into<String>,
    ) -> Self {
        Self {
            number: 0, // Will be set by store
            student_id,
            prev_status,
            new_status,
            date,
            kiosk_name: kiosk_name.into(),
        }
    }
}

/// Approval code returned to the kiosk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ApprovalStatus {
    NotApproved,
    Approved,
    InvalidStudentId,
    /// Reserved; nothing produces it yet
    LateStudent,
}

impl From<ApprovalStatus> for u8 {
    fn from(status: ApprovalStatus) -> Self {
        match status {
            ApprovalStatus::NotApproved => 0,
            ApprovalStatus::Approved => 1,
            ApprovalStatus::InvalidStudentId => 2,
            ApprovalStatus::LateStudent => 3,
        }
    }
}

impl TryFrom<u8> for ApprovalStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::NotApproved),
            1 => Ok(Self::Approved),
            2 => Ok(Self::InvalidStudentId),
            3 => Ok(Self::LateStudent),
            other => Err(format!("invalid approval status {}", other)),
        }
    }
}

/// Structured check-in outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInResponse {
    pub approval_status: ApprovalStatus,
}

/// Paging and filtering parameters for list/count commands.
///
/// Values arrive as text and are validated by the store's filter layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub page_size: Option<String>,
    #[serde(default)]
    pub filter_by: Vec<String>,
    #[serde(default)]
    pub filter_value: Vec<String>,
    #[serde(default)]
    pub filter_comparator: Vec<String>,
}

/// Client role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// A check-in kiosk or a read-only observer
    Kiosk,
    /// The admin UI or a local operator
    Admin,
}

impl ClientRole {
    /// Token, policy and student administration plus listings
    pub fn can_administer(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
    pub policy_count: usize,
    pub token_count: usize,
    pub subscriber_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_util::WallClock;

    fn policy(direction: Direction, required_privilege: i32) -> AccessPolicy {
        AccessPolicy {
            name: "Lunch".into(),
            access_level: 2,
            required_privilege,
            direction,
            window: AdmissionWindow::AlwaysOpen,
        }
    }

    #[test]
    fn accept_matches_direction() {
        for required in -2..=3 {
            for student in -2..=3 {
                assert_eq!(policy(Direction::Equal, required).accept(student), student == required);
                assert_eq!(policy(Direction::AtLeast, required).accept(student), student >= required);
                assert_eq!(policy(Direction::AtMost, required).accept(student), student <= required);
            }
        }
    }

    #[test]
    fn direction_codes() {
        assert_eq!(Direction::from_code(-1), Some(Direction::AtMost));
        assert_eq!(Direction::from_code(0), Some(Direction::Equal));
        assert_eq!(Direction::from_code(1), Some(Direction::AtLeast));
        assert_eq!(Direction::from_code(2), None);
        assert_eq!(serde_json::to_string(&Direction::AtLeast).unwrap(), "1");
        assert!(serde_json::from_str::<Direction>("5").is_err());
    }

    #[test]
    fn token_signed_encoding() {
        let token = AccessToken::from_signed("abc", -4).unwrap();
        assert_eq!(token.access_level, 4);
        assert!(!token.enabled);
        assert_eq!(token.signed_level(), -4);

        let token = AccessToken::from_signed("abc", 4).unwrap();
        assert!(token.enabled);
        assert_eq!(token.signed_level(), 4);

        assert!(AccessToken::from_signed("abc", 0).is_none());
    }

    #[test]
    fn approval_status_serializes_as_code() {
        let resp = CheckInResponse {
            approval_status: ApprovalStatus::InvalidStudentId,
        };
        assert_eq!(
            serde_json::to_string(&resp).unwrap(),
            r#"{"approval_status":2}"#
        );
        let parsed: CheckInResponse = serde_json::from_str(r#"{"approval_status":3}"#).unwrap();
        assert_eq!(parsed.approval_status, ApprovalStatus::LateStudent);
    }

    #[test]
    fn audit_record_listing_shape() {
        let record = AuditRecord::new(42, 0, 1, kiosk_util::now(), "gym");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], 42);
        assert_eq!(json["number"], 0);
        assert_eq!(json["prev_status"], 0);
        assert_eq!(json["new_status"], 1);
        assert!(json.get("student_id").is_none());
    }

    #[test]
    fn placeholder_student() {
        let s = Student::placeholder(99);
        assert_eq!(s.id, 99);
        assert!(s.name.is_empty());
        assert_eq!(s.privilege_type, -1);
        assert_eq!(s.status, -1);
    }

    #[test]
    fn policy_window_roundtrip() {
        let mut p = policy(Direction::AtLeast, 1);
        p.window = AdmissionWindow::windowed(
            WallClock::new(8, 0).unwrap(),
            WallClock::new(9, 0).unwrap(),
        )
        .unwrap();
        let json = serde_json::to_string(&p).unwrap();
        let parsed: AccessPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, p);
    }
}
