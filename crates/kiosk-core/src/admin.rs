//! Listings, counts and student edits for the admin UI

use kiosk_api::{AuditRecord, ErrorCode, ListQuery, Student};
use kiosk_store::{
    parse_list_query, parse_query_filters, FilterError, RecordField, Store, StoreError,
    StudentField,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("Status must be 0 or 1, got {0}")]
    InvalidStatus(i32),

    #[error("Privilege must be non-negative, got {0}")]
    InvalidPrivilege(i32),

    #[error("Student not found: {0}")]
    StudentNotFound(i64),

    #[error(transparent)]
    Store(StoreError),
}

impl AdminError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Filter(_) => ErrorCode::InvalidRequest,
            Self::InvalidStatus(_) | Self::InvalidPrivilege(_) => ErrorCode::InvalidRequest,
            Self::StudentNotFound(_) => ErrorCode::NotFound,
            Self::Store(_) => ErrorCode::InternalError,
        }
    }

    fn from_store(id: i64, e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => Self::StudentNotFound(id),
            other => Self::Store(other),
        }
    }
}

pub type AdminResult<T> = Result<T, AdminError>;

pub struct Admin {
    store: Arc<dyn Store>,
    default_page_size: u32,
}

impl Admin {
    pub fn new(store: Arc<dyn Store>, default_page_size: u32) -> Self {
        Self {
            store,
            default_page_size,
        }
    }

    pub fn list_records(&self, query: &ListQuery) -> AdminResult<Vec<AuditRecord>> {
        let parsed = parse_list_query::<RecordField>(query, self.default_page_size)?;
        self.store
            .list_records(&parsed.filters, parsed.page)
            .map_err(AdminError::Store)
    }

    pub fn count_records(&self, query: &ListQuery) -> AdminResult<u64> {
        let filters = parse_query_filters::<RecordField>(query)?;
        self.store.count_records(&filters).map_err(AdminError::Store)
    }

    pub fn list_students(&self, query: &ListQuery) -> AdminResult<Vec<Student>> {
        let parsed = parse_list_query::<StudentField>(query, self.default_page_size)?;
        self.store
            .list_students(&parsed.filters, parsed.page)
            .map_err(AdminError::Store)
    }

    pub fn count_students(&self, query: &ListQuery) -> AdminResult<u64> {
        let filters = parse_query_filters::<StudentField>(query)?;
        self.store.count_students(&filters).map_err(AdminError::Store)
    }

    pub fn set_student_status(&self, id: i64, status: i32) -> AdminResult<()> {
        if !(0..=1).contains(&status) {
            return Err(AdminError::InvalidStatus(status));
        }
        self.store
            .set_student_status(id, status)
            .map_err(|e| AdminError::from_store(id, e))?;
        info!(student_id = id, status, "Student status set by admin");
        Ok(())
    }

    pub fn set_student_privilege(&self, id: i64, privilege: i32) -> AdminResult<()> {
        if privilege < 0 {
            return Err(AdminError::InvalidPrivilege(privilege));
        }
        self.store
            .set_student_privilege(id, privilege)
            .map_err(|e| AdminError::from_store(id, e))?;
        info!(student_id = id, privilege, "Student privilege set by admin");
        Ok(())
    }
}
