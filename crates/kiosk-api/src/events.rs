//! Event types for kioskd -> client streaming

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::{AuditRecord, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: kiosk_util::now(),
            payload,
        }
    }

    /// Snapshot of the most recent audit records, newest first
    pub fn records_snapshot(records: Vec<AuditRecord>) -> Self {
        Self::new(EventPayload::RecordsSnapshot { records })
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Latest audit window (sent on subscribe and after every committed check-in)
    RecordsSnapshot { records: Vec<AuditRecord> },
}
