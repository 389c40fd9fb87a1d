//! Check-in engine

use chrono::{DateTime, Local};
use kiosk_api::{AccessPolicy, ApprovalStatus, AuditRecord, ErrorCode, Student};
use kiosk_store::{BeforeCommit, CheckInWrite, Store, StoreError};
use kiosk_util::WindowGate;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{AccessRegistry, DailyLog, LiveFeed};

/// Advisory returned when a check-in arrives outside its kiosk's window
pub const OUTSIDE_WINDOW_MESSAGE: &str = "The sign in is outside of the kiosk active time!";

/// Result of a check-in that passed token and id validation
#[derive(Debug, Clone, PartialEq)]
pub enum CheckInOutcome {
    /// Decided and recorded
    Completed {
        status: ApprovalStatus,
        record: AuditRecord,
    },
    /// Outside the admission window; nothing was written
    OutsideWindow,
}

/// Check-in rejections that never reach the audit log
#[derive(Debug, Error)]
pub enum CheckInError {
    #[error("Invalid access token")]
    UnknownToken,

    #[error("Access token is disabled")]
    DisabledToken,

    #[error("Malformed student id '{0}'")]
    MalformedStudentId(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CheckInError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownToken | Self::DisabledToken => ErrorCode::Forbidden,
            Self::MalformedStudentId(_) => ErrorCode::Unprocessable,
            Self::Store(_) => ErrorCode::InternalError,
        }
    }
}

/// Decide the approval and the student's next status
fn decide(policy: &AccessPolicy, student: Option<&Student>) -> (ApprovalStatus, i32) {
    match student {
        None => (ApprovalStatus::InvalidStudentId, -1),
        Some(s) if policy.accept(s.privilege_type) => {
            (ApprovalStatus::Approved, if s.status == 0 { 1 } else { 0 })
        }
        Some(s) => (ApprovalStatus::NotApproved, s.status),
    }
}

pub struct CheckInEngine {
    store: Arc<dyn Store>,
    registry: Arc<AccessRegistry>,
    daily_log: DailyLog,
    feed: Arc<LiveFeed>,
}

impl CheckInEngine {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<AccessRegistry>,
        daily_log: DailyLog,
        feed: Arc<LiveFeed>,
    ) -> Self {
        info!(log_dir = %daily_log.dir().display(), "Check-in engine initialized");
        Self {
            store,
            registry,
            daily_log,
            feed,
        }
    }

    /// Run one check-in transaction at wall-clock time `now`
    pub fn check_in(
        &self,
        token: &str,
        kiosk_name: &str,
        student_id_text: &str,
        now: DateTime<Local>,
    ) -> Result<CheckInOutcome, CheckInError> {
        let tokens = self.registry.tokens();
        let access = tokens.get(token).ok_or_else(|| {
            info!(kiosk = %kiosk_name, "Check-in with unknown token");
            CheckInError::UnknownToken
        })?;
        if !access.enabled {
            info!(kiosk = %kiosk_name, access_level = access.access_level, "Check-in with disabled token");
            return Err(CheckInError::DisabledToken);
        }

        // Ids are 32-bit and taken verbatim, surrounding whitespace included
        let student_id = student_id_text.parse::<i32>().map(i64::from).map_err(|_| {
            info!(kiosk = %kiosk_name, input = %student_id_text, "Malformed student id");
            CheckInError::MalformedStudentId(student_id_text.to_string())
        })?;

        let policies = self.registry.policies();
        let Some(policy) = policies.get(access.access_level) else {
            // Only reachable while a reload is swapping snapshots
            warn!(access_level = access.access_level, "Token level has no policy");
            return Err(CheckInError::UnknownToken);
        };

        let daily_log = &self.daily_log;
        let policy_name = policy.name.as_str();
        let mut approval = ApprovalStatus::NotApproved;
        let committed = self.store.run_check_in(student_id, &mut |row| {
            let (status, new_status) = decide(policy, row.as_ref());
            let student = row.unwrap_or_else(|| Student::placeholder(student_id));

            // The day's line goes out once the row writes succeeded
            let before_commit = match policy.window.gate(&now) {
                WindowGate::Outside => return Ok(None),
                WindowGate::Inside => {
                    let accepted = (status == ApprovalStatus::Approved).then(|| student.clone());
                    let hook: BeforeCommit<'_> = Box::new(move |_: &AuditRecord| {
                        daily_log
                            .record(policy_name, &now, accepted.as_ref())
                            .map_err(StoreError::from)
                    });
                    Some(hook)
                }
                WindowGate::Unrestricted => None,
            };

            approval = status;
            Ok(Some(CheckInWrite {
                status_update: (status == ApprovalStatus::Approved).then_some(new_status),
                record: AuditRecord::new(student.id, student.status, new_status, now, kiosk_name),
                before_commit,
            }))
        })?;

        let Some(record) = committed else {
            info!(
                kiosk = %kiosk_name,
                student_id,
                window = %policy.window,
                "Check-in outside admission window"
            );
            return Ok(CheckInOutcome::OutsideWindow);
        };

        info!(
            kiosk = %kiosk_name,
            student_id,
            policy = %policy.name,
            outcome = ?approval,
            record_number = record.number,
            "Check-in recorded"
        );

        match self.feed.publish_latest() {
            Ok(delivered) => debug!(delivered, "Live feed updated"),
            Err(e) => warn!(error = %e, "Failed to publish live feed update"),
        }

        Ok(CheckInOutcome::Completed {
            status: approval,
            record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kiosk_api::{Direction, EventPayload};
    use kiosk_store::SqliteStore;
    use kiosk_util::{AdmissionWindow, ClientId, WallClock};
    use tokio::sync::mpsc;

    struct Fixture {
        store: Arc<SqliteStore>,
        registry: Arc<AccessRegistry>,
        feed: Arc<LiveFeed>,
        engine: CheckInEngine,
        _dir: tempfile::TempDir,
    }

    fn lunch(window: AdmissionWindow) -> AccessPolicy {
        AccessPolicy {
            name: "Lunch".into(),
            access_level: 2,
            required_privilege: 1,
            direction: Direction::AtLeast,
            window,
        }
    }

    fn eight_to_nine() -> AdmissionWindow {
        AdmissionWindow::windowed(
            WallClock::new(8, 0).unwrap(),
            WallClock::new(9, 0).unwrap(),
        )
        .unwrap()
    }

    fn fixture(policy: AccessPolicy) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let registry = Arc::new(AccessRegistry::load(store.clone()).unwrap());
        registry.reload(&[policy]).unwrap();
        let feed = Arc::new(LiveFeed::new(store.clone(), 20));
        let engine = CheckInEngine::new(
            store.clone(),
            registry.clone(),
            DailyLog::new(dir.path()),
            feed.clone(),
        );
        Fixture {
            store,
            registry,
            feed,
            engine,
            _dir: dir,
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 12, 29, hour, minute, 0).unwrap()
    }

    fn add_student(store: &SqliteStore, id: i64, privilege_type: i32, status: i32) {
        store
            .upsert_student(&Student {
                id,
                name: format!("Student {}", id),
                privilege_type,
                status,
            })
            .unwrap();
    }

    #[test]
    fn accepted_inside_window() {
        let f = fixture(lunch(eight_to_nine()));
        add_student(&f.store, 1, 1, 0);
        let token = f.registry.issue_token(2).unwrap();

        let outcome = f.engine.check_in(&token, "cafeteria", "1", at(8, 30)).unwrap();

        let CheckInOutcome::Completed { status, record } = outcome else {
            panic!("expected a completed check-in");
        };
        assert_eq!(status, ApprovalStatus::Approved);
        assert_eq!((record.prev_status, record.new_status), (0, 1));
        assert_eq!(record.kiosk_name, "cafeteria");
        assert_eq!(f.store.get_student(1).unwrap().unwrap().status, 1);
        assert_eq!(f.store.count_records(&[]).unwrap(), 1);

        let log = f._dir.path().join("Lunch-12.29.2025.csv");
        assert_eq!(std::fs::read_to_string(log).unwrap(), "Student 1,1\n");
    }

    #[test]
    fn second_check_in_toggles_back() {
        let f = fixture(lunch(eight_to_nine()));
        add_student(&f.store, 1, 1, 0);
        let token = f.registry.issue_token(2).unwrap();

        f.engine.check_in(&token, "k", "1", at(8, 30)).unwrap();
        f.engine.check_in(&token, "k", "1", at(8, 31)).unwrap();
        assert_eq!(f.store.get_student(1).unwrap().unwrap().status, 0);
    }

    #[test]
    fn outside_window_writes_nothing() {
        let f = fixture(lunch(eight_to_nine()));
        add_student(&f.store, 1, 1, 0);
        let token = f.registry.issue_token(2).unwrap();

        let outcome = f.engine.check_in(&token, "cafeteria", "1", at(10, 0)).unwrap();

        assert_eq!(outcome, CheckInOutcome::OutsideWindow);
        assert_eq!(f.store.get_student(1).unwrap().unwrap().status, 0);
        assert_eq!(f.store.count_records(&[]).unwrap(), 0);
        assert!(!f._dir.path().join("Lunch-12.29.2025.csv").exists());
    }

    #[test]
    fn window_edges_are_inclusive() {
        let f = fixture(lunch(eight_to_nine()));
        add_student(&f.store, 1, 1, 0);
        let token = f.registry.issue_token(2).unwrap();

        for t in [at(8, 0), at(9, 0)] {
            assert!(matches!(
                f.engine.check_in(&token, "k", "1", t).unwrap(),
                CheckInOutcome::Completed { .. }
            ));
        }
        assert_eq!(
            f.engine.check_in(&token, "k", "1", at(7, 59)).unwrap(),
            CheckInOutcome::OutsideWindow
        );
    }

    #[test]
    fn disabled_token_rejected_before_lookup() {
        let f = fixture(lunch(eight_to_nine()));
        add_student(&f.store, 1, 1, 0);
        let token = f.registry.issue_token(2).unwrap();
        f.registry.set_token_enabled(&token, false).unwrap();

        let err = f.engine.check_in(&token, "k", "1", at(8, 30)).unwrap_err();
        assert!(matches!(err, CheckInError::DisabledToken));
        assert_eq!(err.code(), ErrorCode::Forbidden);
        assert_eq!(f.store.count_records(&[]).unwrap(), 0);
    }

    #[test]
    fn unknown_token_and_malformed_id() {
        let f = fixture(lunch(eight_to_nine()));
        let token = f.registry.issue_token(2).unwrap();

        let err = f.engine.check_in("bogus", "k", "1", at(8, 30)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);

        let err = f.engine.check_in(&token, "k", "12a", at(8, 30)).unwrap_err();
        assert!(matches!(err, CheckInError::MalformedStudentId(ref s) if s == "12a"));
        assert_eq!(err.code(), ErrorCode::Unprocessable);
        assert_eq!(f.store.count_records(&[]).unwrap(), 0);
    }

    #[test]
    fn student_id_must_be_a_bare_32_bit_integer() {
        let f = fixture(lunch(eight_to_nine()));
        add_student(&f.store, 12, 1, 0);
        let token = f.registry.issue_token(2).unwrap();

        for input in [" 12 ", "12\n", "3000000000", "-2147483649", ""] {
            let err = f.engine.check_in(&token, "k", input, at(8, 30)).unwrap_err();
            assert!(
                matches!(err, CheckInError::MalformedStudentId(ref s) if s == input),
                "{input:?} should be malformed"
            );
        }
        assert_eq!(f.store.count_records(&[]).unwrap(), 0);

        // Signs are part of an integer literal
        let outcome = f.engine.check_in(&token, "k", "+12", at(8, 30)).unwrap();
        assert!(matches!(
            outcome,
            CheckInOutcome::Completed { status: ApprovalStatus::Approved, .. }
        ));
    }

    #[test]
    fn unknown_student_is_logged() {
        let f = fixture(lunch(eight_to_nine()));
        let token = f.registry.issue_token(2).unwrap();

        let outcome = f.engine.check_in(&token, "k", "4040", at(8, 30)).unwrap();

        let CheckInOutcome::Completed { status, record } = outcome else {
            panic!("expected a completed check-in");
        };
        assert_eq!(status, ApprovalStatus::InvalidStudentId);
        assert_eq!(record.student_id, 4040);
        assert_eq!((record.prev_status, record.new_status), (-1, -1));
        assert!(f.store.get_student(4040).unwrap().is_none());

        // The day's file exists but holds no line
        let log = f._dir.path().join("Lunch-12.29.2025.csv");
        assert_eq!(std::fs::read_to_string(log).unwrap(), "");
    }

    #[test]
    fn denied_by_policy_keeps_status() {
        let f = fixture(lunch(eight_to_nine()));
        add_student(&f.store, 1, 0, 1);
        let token = f.registry.issue_token(2).unwrap();

        let outcome = f.engine.check_in(&token, "k", "1", at(8, 30)).unwrap();

        let CheckInOutcome::Completed { status, record } = outcome else {
            panic!("expected a completed check-in");
        };
        assert_eq!(status, ApprovalStatus::NotApproved);
        assert_eq!((record.prev_status, record.new_status), (1, 1));
        assert_eq!(f.store.get_student(1).unwrap().unwrap().status, 1);
    }

    #[test]
    fn always_open_skips_daily_log() {
        let f = fixture(lunch(AdmissionWindow::AlwaysOpen));
        add_student(&f.store, 1, 5, 0);
        let token = f.registry.issue_token(2).unwrap();

        let outcome = f.engine.check_in(&token, "k", "1", at(23, 59)).unwrap();

        assert!(matches!(
            outcome,
            CheckInOutcome::Completed {
                status: ApprovalStatus::Approved,
                ..
            }
        ));
        assert_eq!(std::fs::read_dir(f._dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn daily_log_failure_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the log directory should be
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, "").unwrap();

        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let registry = Arc::new(AccessRegistry::load(store.clone()).unwrap());
        registry.reload(&[lunch(eight_to_nine())]).unwrap();
        let feed = Arc::new(LiveFeed::new(store.clone(), 20));
        let engine = CheckInEngine::new(store.clone(), registry.clone(), DailyLog::new(&blocked), feed);
        add_student(&store, 1, 1, 0);
        let token = registry.issue_token(2).unwrap();

        let err = engine.check_in(&token, "k", "1", at(8, 30)).unwrap_err();
        assert!(matches!(err, CheckInError::Store(StoreError::Io(_))));
        assert_eq!(store.get_student(1).unwrap().unwrap().status, 0);
        assert_eq!(store.count_records(&[]).unwrap(), 0);
    }

    #[test]
    fn committed_check_in_reaches_subscribers() {
        let f = fixture(lunch(eight_to_nine()));
        add_student(&f.store, 1, 1, 0);
        let token = f.registry.issue_token(2).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        f.feed.subscribe(ClientId::new(), tx).unwrap();
        let _initial = rx.try_recv().unwrap();

        f.engine.check_in(&token, "k", "1", at(8, 30)).unwrap();
        let EventPayload::RecordsSnapshot { records } = rx.try_recv().unwrap().payload;
        assert_eq!(records.len(), 1);

        // Nothing is pushed for an aborted transaction
        f.engine.check_in(&token, "k", "1", at(12, 0)).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn concurrent_check_ins_do_not_lose_updates() {
        let f = fixture(lunch(AdmissionWindow::AlwaysOpen));
        add_student(&f.store, 1, 1, 0);
        let token = f.registry.issue_token(2).unwrap();
        let engine = Arc::new(f.engine);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let token = token.clone();
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        engine.check_in(&token, "k", "1", at(12, 0)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Twenty toggles from 0 end at 0, and every record chains from the last
        assert_eq!(f.store.get_student(1).unwrap().unwrap().status, 0);
        let mut records = f.store.recent_records(100).unwrap();
        records.reverse();
        assert_eq!(records.len(), 20);
        for (i, r) in records.iter().enumerate() {
            let expected_prev = (i % 2) as i32;
            assert_eq!(r.prev_status, expected_prev);
            assert_eq!(r.new_status, 1 - expected_prev);
        }
    }
}
