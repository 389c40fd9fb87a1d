//! SQLite-based store implementation

use chrono::{DateTime, Local};
use kiosk_api::{AccessPolicy, AccessToken, AuditRecord, Direction, Student};
use kiosk_util::{AdmissionWindow, WallClock};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{
    to_predicate, CheckInDecision, CheckInWrite, Filter, FilterField, Page, Predicate,
    RecordField, Store, StoreError, StoreResult, StudentField,
};

/// How long a writer waits on a locked database before giving up
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const STUDENT_COLUMNS: &str = "id, name, privilege_type, status";
const RECORD_COLUMNS: &str = "num, id, prev_status, new_status, date, kiosk_name";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open or create a store, bounding how long a check-in waits for the row lock
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- Student roster
            CREATE TABLE IF NOT EXISTS students (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                privilege_type INTEGER NOT NULL,
                status INTEGER NOT NULL DEFAULT 0
            );

            -- Kiosk tokens; a negative access level means disabled
            CREATE TABLE IF NOT EXISTS access_tokens (
                access_token TEXT PRIMARY KEY,
                access INTEGER NOT NULL
            );

            -- Access policies; start_hour = -1 means always open
            CREATE TABLE IF NOT EXISTS relations (
                access_level INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                required_privilege INTEGER NOT NULL,
                direction INTEGER NOT NULL,
                start_hour INTEGER NOT NULL,
                start_minute INTEGER NOT NULL,
                end_hour INTEGER NOT NULL,
                end_minute INTEGER NOT NULL
            );

            -- Audit records (append-only)
            CREATE TABLE IF NOT EXISTS record (
                num INTEGER PRIMARY KEY AUTOINCREMENT,
                id INTEGER NOT NULL,
                prev_status INTEGER NOT NULL,
                new_status INTEGER NOT NULL,
                date TEXT NOT NULL,
                kiosk_name TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_record_id ON record(id);
            CREATE INDEX IF NOT EXISTS idx_record_date ON record(date);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }

    fn count_where<F: FilterField>(&self, table: &str, filters: &[Filter<F>]) -> StoreResult<u64> {
        let predicate = to_predicate(filters);
        let conn = self.lock()?;
        let sql = format!("SELECT COUNT(*) FROM {}{}", table, predicate.where_sql());
        let count: i64 = conn.query_row(&sql, params_from_iter(predicate.sql_values()), |row| {
            row.get(0)
        })?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

/// SELECT with a predicate, ordering and a LIMIT/OFFSET window
fn paged_query(
    columns: &str,
    table: &str,
    order_by: &str,
    predicate: &Predicate,
    page: Page,
) -> (String, Vec<Value>) {
    let n = predicate.params.len();
    let sql = format!(
        "SELECT {} FROM {}{} ORDER BY {} DESC LIMIT ?{} OFFSET ?{}",
        columns,
        table,
        predicate.where_sql(),
        order_by,
        n + 1,
        n + 2
    );
    let mut values = predicate.sql_values();
    values.push(Value::Integer(i64::from(page.page_size)));
    values.push(Value::Integer(
        i64::try_from(page.offset()).unwrap_or(i64::MAX),
    ));
    (sql, values)
}

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        name: row.get(1)?,
        privilege_type: row.get(2)?,
        status: row.get(3)?,
    })
}

type RecordRow = (i64, i64, i32, i32, String, String);

fn record_row(row: &Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn record_from_row(
    (number, student_id, prev_status, new_status, date, kiosk_name): RecordRow,
) -> StoreResult<AuditRecord> {
    let date = DateTime::parse_from_rfc3339(&date)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| {
            StoreError::Serialization(format!("record {} has bad date '{}': {}", number, date, e))
        })?;

    Ok(AuditRecord {
        number,
        student_id,
        prev_status,
        new_status,
        date,
        kiosk_name,
    })
}

fn window_columns(window: &AdmissionWindow) -> [i32; 4] {
    match window {
        AdmissionWindow::AlwaysOpen => [-1, -1, -1, -1],
        AdmissionWindow::Windowed { start, end } => [
            i32::from(start.hour),
            i32::from(start.minute),
            i32::from(end.hour),
            i32::from(end.minute),
        ],
    }
}

fn window_from_columns([sh, sm, eh, em]: [i32; 4]) -> Option<AdmissionWindow> {
    if sh == -1 {
        return Some(AdmissionWindow::AlwaysOpen);
    }
    let clock = |h: i32, m: i32| WallClock::new(u8::try_from(h).ok()?, u8::try_from(m).ok()?);
    AdmissionWindow::windowed(clock(sh, sm)?, clock(eh, em)?)
}

impl Store for SqliteStore {
    fn upsert_student(&self, student: &Student) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO students (id, name, privilege_type, status)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id)
            DO UPDATE SET name = excluded.name,
                          privilege_type = excluded.privilege_type,
                          status = excluded.status
            "#,
            params![student.id, student.name, student.privilege_type, student.status],
        )?;
        Ok(())
    }

    fn get_student(&self, id: i64) -> StoreResult<Option<Student>> {
        let conn = self.lock()?;
        let student = conn
            .query_row(
                &format!("SELECT {} FROM students WHERE id = ?1", STUDENT_COLUMNS),
                [id],
                student_from_row,
            )
            .optional()?;
        Ok(student)
    }

    fn list_students(
        &self,
        filters: &[Filter<StudentField>],
        page: Page,
    ) -> StoreResult<Vec<Student>> {
        let (sql, values) = paged_query(
            STUDENT_COLUMNS,
            "students",
            "id",
            &to_predicate(filters),
            page,
        );
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let students = stmt
            .query_map(params_from_iter(values), student_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(students)
    }

    fn count_students(&self, filters: &[Filter<StudentField>]) -> StoreResult<u64> {
        self.count_where("students", filters)
    }

    fn set_student_status(&self, id: i64, status: i32) -> StoreResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE students SET status = ?1 WHERE id = ?2",
            params![status, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("student {}", id)));
        }
        debug!(student_id = id, status, "Student status set");
        Ok(())
    }

    fn set_student_privilege(&self, id: i64, privilege: i32) -> StoreResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE students SET privilege_type = ?1 WHERE id = ?2",
            params![privilege, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("student {}", id)));
        }
        debug!(student_id = id, privilege, "Student privilege set");
        Ok(())
    }

    fn load_tokens(&self) -> StoreResult<Vec<AccessToken>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT access_token, access FROM access_tokens")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut tokens = Vec::with_capacity(rows.len());
        for (token, access) in rows {
            match AccessToken::from_signed(token, access) {
                Some(t) => tokens.push(t),
                None => warn!(access, "Skipping token row with unusable access level"),
            }
        }
        Ok(tokens)
    }

    fn insert_token(&self, token: &AccessToken) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO access_tokens (access_token, access) VALUES (?1, ?2)",
            params![token.token, token.signed_level()],
        )?;
        debug!(access_level = token.access_level, "Token stored");
        Ok(())
    }

    fn delete_token(&self, token: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM access_tokens WHERE access_token = ?1", [token])?;
        if changed == 0 {
            return Err(StoreError::NotFound("token".into()));
        }
        Ok(())
    }

    fn update_token(&self, token: &AccessToken) -> StoreResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE access_tokens SET access = ?1 WHERE access_token = ?2",
            params![token.signed_level(), token.token],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound("token".into()));
        }
        Ok(())
    }

    fn load_policies(&self) -> StoreResult<Vec<AccessPolicy>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT access_level, name, required_privilege, direction,
                   start_hour, start_minute, end_hour, end_minute
            FROM relations ORDER BY access_level
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i32>(2)?,
                    row.get::<_, i32>(3)?,
                    [
                        row.get::<_, i32>(4)?,
                        row.get::<_, i32>(5)?,
                        row.get::<_, i32>(6)?,
                        row.get::<_, i32>(7)?,
                    ],
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut policies = Vec::with_capacity(rows.len());
        for (level, name, required_privilege, direction, window) in rows {
            let converted = u32::try_from(level).ok().and_then(|access_level| {
                Some(AccessPolicy {
                    access_level,
                    required_privilege,
                    direction: Direction::from_code(direction)?,
                    window: window_from_columns(window)?,
                    name: name.clone(),
                })
            });
            match converted {
                Some(policy) => policies.push(policy),
                None => warn!(access_level = level, name = %name, "Skipping malformed policy row"),
            }
        }
        Ok(policies)
    }

    fn replace_policies(&self, policies: &[AccessPolicy]) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM relations", [])?;
        for policy in policies {
            let [sh, sm, eh, em] = window_columns(&policy.window);
            tx.execute(
                r#"
                INSERT INTO relations (access_level, name, required_privilege, direction,
                                       start_hour, start_minute, end_hour, end_minute)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    policy.access_level,
                    policy.name,
                    policy.required_privilege,
                    policy.direction.code(),
                    sh,
                    sm,
                    eh,
                    em
                ],
            )?;
        }

        tx.commit()?;
        debug!(count = policies.len(), "Policies replaced");
        Ok(())
    }

    fn run_check_in(
        &self,
        student_id: i64,
        decide: &mut CheckInDecision<'_>,
    ) -> StoreResult<Option<AuditRecord>> {
        let mut conn = self.lock()?;
        // IMMEDIATE takes the write lock up front, so the read below is exclusive
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let student = tx
            .query_row(
                &format!("SELECT {} FROM students WHERE id = ?1", STUDENT_COLUMNS),
                [student_id],
                student_from_row,
            )
            .optional()?;

        let Some(write) = decide(student)? else {
            tx.rollback()?;
            debug!(student_id, "Check-in transaction aborted");
            return Ok(None);
        };

        let CheckInWrite {
            status_update,
            mut record,
            before_commit,
        } = write;

        if let Some(status) = status_update {
            tx.execute(
                "UPDATE students SET status = ?1 WHERE id = ?2",
                params![status, student_id],
            )?;
        }

        tx.execute(
            r#"
            INSERT INTO record (id, prev_status, new_status, date, kiosk_name)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.student_id,
                record.prev_status,
                record.new_status,
                record.date.to_rfc3339(),
                record.kiosk_name
            ],
        )?;
        record.number = tx.last_insert_rowid();

        if let Some(hook) = before_commit {
            hook(&record)?;
        }

        tx.commit()?;
        debug!(record_number = record.number, student_id, "Audit record appended");
        Ok(Some(record))
    }

    fn recent_records(&self, limit: usize) -> StoreResult<Vec<AuditRecord>> {
        let page_size = u32::try_from(limit).unwrap_or(u32::MAX);
        self.list_records(&[], Page::new(0, page_size))
    }

    fn list_records(
        &self,
        filters: &[Filter<RecordField>],
        page: Page,
    ) -> StoreResult<Vec<AuditRecord>> {
        let (sql, values) = paged_query(
            RECORD_COLUMNS,
            "record",
            "num",
            &to_predicate(filters),
            page,
        );
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), record_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(record_from_row).collect()
    }

    fn count_records(&self, filters: &[Filter<RecordField>]) -> StoreResult<u64> {
        self.count_where("record", filters)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
