//! Command types for the kioskd protocol

use kiosk_util::ClientId;
use serde::{Deserialize, Serialize};

use crate::{
    AuditRecord, CheckInResponse, ClientRole, HealthStatus, ListQuery, Student, TokenToggle,
    API_VERSION,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed paging or filter parameters, or a bad policy document
    InvalidRequest,
    /// Unknown or disabled access token
    Forbidden,
    /// Well-formed request naming something unusable (bad id, unknown token, bad level)
    Unprocessable,
    NotFound,
    /// Command not allowed for the client's role
    PermissionDenied,
    ConfigError,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Record a kiosk check-in for a student
    CheckIn {
        access_token: String,
        kiosk_name: String,
        /// Raw text as typed or scanned at the kiosk
        student_id: String,
    },

    /// Page through audit records, newest first
    ListRecords {
        #[serde(default)]
        query: ListQuery,
    },

    /// Count audit records matching the filters
    CountRecords {
        #[serde(default)]
        query: ListQuery,
    },

    /// Page through students, highest id first
    ListStudents {
        #[serde(default)]
        query: ListQuery,
    },

    /// Count students matching the filters
    CountStudents {
        #[serde(default)]
        query: ListQuery,
    },

    // Admin commands

    /// Replace the whole policy table from a JSON policy document
    ReloadPolicies { document: serde_json::Value },

    /// Mint a new enabled token for an existing access level
    IssueToken { access_level: u32 },

    /// Delete a token
    RemoveToken { token: String },

    /// Enable or disable a token
    SetTokenEnabled { token: String, enabled: bool },

    /// Set a student's in/out status directly
    SetStudentStatus { student_id: i64, status: i32 },

    /// Set a student's privilege type
    SetStudentPrivilege { student_id: i64, privilege: i32 },

    /// Subscribe to the live records feed (a snapshot follows immediately)
    SubscribeRecords,

    /// Unsubscribe from the live records feed
    UnsubscribeRecords,

    /// Get health status
    GetHealth,

    /// Ping for keepalive
    Ping,
}

impl Command {
    /// Whether a client with `role` may issue this command
    pub fn allowed_for(&self, role: ClientRole) -> bool {
        match self {
            Command::CheckIn { .. }
            | Command::SubscribeRecords
            | Command::UnsubscribeRecords
            | Command::GetHealth
            | Command::Ping => true,
            _ => role.can_administer(),
        }
    }
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    CheckIn(CheckInResponse),
    /// The request was processed but nothing was recorded
    Advisory {
        message: String,
    },
    Records {
        records: Vec<AuditRecord>,
    },
    Students {
        students: Vec<Student>,
    },
    Count {
        count: u64,
    },
    PoliciesReloaded {
        policy_count: usize,
        token_count: usize,
    },
    TokenIssued {
        token: String,
    },
    TokenRemoved,
    TokenToggled {
        outcome: TokenToggle,
    },
    StudentUpdated,
    Subscribed {
        client_id: ClientId,
    },
    Unsubscribed,
    Health(HealthStatus),
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub role: ClientRole,
    /// Unix UID if available
    pub uid: Option<u32>,
    /// Process name if available
    pub process_name: Option<String>,
}

impl ClientInfo {
    pub fn new(role: ClientRole) -> Self {
        Self {
            client_id: ClientId::new(),
            role,
            uid: None,
            process_name: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ApprovalStatus;

    #[test]
    fn request_serialization() {
        let req = Request::new(
            1,
            Command::CheckIn {
                access_token: "tok".into(),
                kiosk_name: "front".into(),
                student_id: "1234".into(),
            },
        );
        let json = serde_json::to_string(&req).unwrap();
        let parsed: Request = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.request_id, 1);
        assert!(matches!(
            parsed.command,
            Command::CheckIn { ref student_id, .. } if student_id == "1234"
        ));
    }

    #[test]
    fn list_query_defaults_when_omitted() {
        let cmd: Command = serde_json::from_str(r#"{"type":"list_records"}"#).unwrap();
        let Command::ListRecords { query } = cmd else {
            panic!("expected list_records");
        };
        assert!(query.page.is_none());
        assert!(query.filter_by.is_empty());
    }

    #[test]
    fn list_query_with_filters() {
        let cmd: Command = serde_json::from_str(
            r#"{"type":"list_students","query":{"page":"1","page_size":"10",
                "filter_by":["privilege"],"filter_value":["2"],
                "filter_comparator":["greater_than"]}}"#,
        )
        .unwrap();
        let Command::ListStudents { query } = cmd else {
            panic!("expected list_students");
        };
        assert_eq!(query.page.as_deref(), Some("1"));
        assert_eq!(query.filter_by, vec!["privilege"]);
    }

    #[test]
    fn check_in_response_serialization() {
        let resp = Response::success(
            7,
            ResponsePayload::CheckIn(CheckInResponse {
                approval_status: ApprovalStatus::Approved,
            }),
        );

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["request_id"], 7);
        assert_eq!(json["result"]["ok"]["type"], "check_in");
        assert_eq!(json["result"]["ok"]["approval_status"], 1);
    }

    #[test]
    fn error_response_serialization() {
        let resp = Response::error(3, ErrorInfo::new(ErrorCode::Forbidden, "Invalid token"));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["result"]["err"]["code"], "forbidden");
    }

    #[test]
    fn kiosk_role_is_limited() {
        let check_in = Command::CheckIn {
            access_token: String::new(),
            kiosk_name: String::new(),
            student_id: String::new(),
        };
        assert!(check_in.allowed_for(ClientRole::Kiosk));
        assert!(Command::SubscribeRecords.allowed_for(ClientRole::Kiosk));
        assert!(!Command::IssueToken { access_level: 1 }.allowed_for(ClientRole::Kiosk));
        assert!(
            !Command::ListRecords {
                query: ListQuery::default()
            }
            .allowed_for(ClientRole::Kiosk)
        );
        assert!(Command::IssueToken { access_level: 1 }.allowed_for(ClientRole::Admin));
    }
}
