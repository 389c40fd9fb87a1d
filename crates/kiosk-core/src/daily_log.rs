//! Daily per-policy check-in files
//!
//! One CSV per policy per day, named `<policy>-<month>.<day>.<year>.csv`
//! (no zero padding). Each accepted check-in appends a `name,id` line.

use chrono::{DateTime, Datelike, Local, NaiveDate};
use kiosk_api::Student;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

pub struct DailyLog {
    dir: PathBuf,
    /// One writer per file at a time, keyed by the file's day
    file_locks: Mutex<HashMap<(NaiveDate, PathBuf), Arc<Mutex<()>>>>,
}

impl DailyLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for `policy_name` on the day of `now`
    pub fn file_name(policy_name: &str, now: &DateTime<Local>) -> String {
        format!(
            "{}-{}.{}.{}.csv",
            policy_name.replace(['/', '\\'], "_"),
            now.month(),
            now.day(),
            now.year()
        )
    }

    pub fn path_for(&self, policy_name: &str, now: &DateTime<Local>) -> PathBuf {
        self.dir.join(Self::file_name(policy_name, now))
    }

    fn lock_for(&self, day: NaiveDate, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self
            .file_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Earlier days' files are never written again
        locks.retain(|(d, _), _| *d >= day);
        Arc::clone(locks.entry((day, path.to_path_buf())).or_default())
    }

    /// Make sure today's file exists and, for an accepted student, append `name,id`
    pub fn record(
        &self,
        policy_name: &str,
        now: &DateTime<Local>,
        accepted: Option<&Student>,
    ) -> io::Result<()> {
        let path = self.path_for(policy_name, now);
        let lock = self.lock_for(now.date_naive(), &path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        std::fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        if let Some(student) = accepted {
            writeln!(file, "{},{}", student.name, student.id)?;
            debug!(path = %path.display(), student_id = student.id, "Daily log line appended");
        }
        Ok(())
    }
}
