//! Store trait definitions

use kiosk_api::{AccessPolicy, AccessToken, AuditRecord, Student};

use crate::{Filter, Page, RecordField, StoreResult, StudentField};

/// Side effect run after the audit insert and before commit; an error rolls back
pub type BeforeCommit<'a> = Box<dyn FnOnce(&AuditRecord) -> StoreResult<()> + 'a>;

/// What a check-in decided, applied inside the row-locking transaction
pub struct CheckInWrite<'a> {
    /// New status to persist for the student, if any
    pub status_update: Option<i32>,
    /// Audit record to append; its number is assigned on insert
    pub record: AuditRecord,
    pub before_commit: Option<BeforeCommit<'a>>,
}

/// Decision step of a check-in.
///
/// Receives the student row (None when the id has no row) while the row is
/// locked. Returning `Ok(None)` rolls the transaction back without writing;
/// an error also rolls back and is propagated.
pub type CheckInDecision<'a> =
    dyn FnMut(Option<Student>) -> StoreResult<Option<CheckInWrite<'a>>> + 'a;

/// Main store trait
pub trait Store: Send + Sync {
    // Students

    /// Insert or replace a student row (roster import)
    fn upsert_student(&self, student: &Student) -> StoreResult<()>;

    fn get_student(&self, id: i64) -> StoreResult<Option<Student>>;

    /// Page through students, highest id first
    fn list_students(&self, filters: &[Filter<StudentField>], page: Page)
        -> StoreResult<Vec<Student>>;

    fn count_students(&self, filters: &[Filter<StudentField>]) -> StoreResult<u64>;

    /// Fails with NotFound for an unknown id
    fn set_student_status(&self, id: i64, status: i32) -> StoreResult<()>;

    /// Fails with NotFound for an unknown id
    fn set_student_privilege(&self, id: i64, privilege: i32) -> StoreResult<()>;

    // Access tokens

    /// All persisted tokens, undecodable rows skipped
    fn load_tokens(&self) -> StoreResult<Vec<AccessToken>>;

    fn insert_token(&self, token: &AccessToken) -> StoreResult<()>;

    /// Fails with NotFound for an unknown token
    fn delete_token(&self, token: &str) -> StoreResult<()>;

    /// Persist the enabled flag and level of an existing token
    fn update_token(&self, token: &AccessToken) -> StoreResult<()>;

    // Access policies

    fn load_policies(&self) -> StoreResult<Vec<AccessPolicy>>;

    /// Replace every policy in a single transaction
    fn replace_policies(&self, policies: &[AccessPolicy]) -> StoreResult<()>;

    // Check-in and audit log

    /// Run one check-in as a single exclusive transaction on `student_id`.
    ///
    /// Returns the committed audit record, or None when `decide` aborted.
    fn run_check_in(
        &self,
        student_id: i64,
        decide: &mut CheckInDecision<'_>,
    ) -> StoreResult<Option<AuditRecord>>;

    /// Most recent audit records, newest first
    fn recent_records(&self, limit: usize) -> StoreResult<Vec<AuditRecord>>;

    /// Page through audit records, newest first
    fn list_records(&self, filters: &[Filter<RecordField>], page: Page)
        -> StoreResult<Vec<AuditRecord>>;

    fn count_records(&self, filters: &[Filter<RecordField>]) -> StoreResult<u64>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
