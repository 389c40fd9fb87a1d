//! Time utilities for kioskd
//!
//! Provides wall-clock time for admission windows and the daily
//! per-policy check-in files.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `KIOSK_MOCK_TIME` environment variable can be set
//! to override the system time for all time-sensitive operations. This is useful
//! for exercising admission windows without waiting for the right hour.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 08:30:00`)
//!
//! Example:
//! ```bash
//! KIOSK_MOCK_TIME="2025-12-25 08:30:00" kioskd
//! ```

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "KIOSK_MOCK_TIME";

/// Cached mock time offset from the real time when the process started.
/// This allows mock time to advance naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                if let Ok(naive_dt) =
                    NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S")
                {
                    if let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() {
                        let real_now = chrono::Local::now();
                        let offset = mock_dt.signed_duration_since(real_now);
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    } else {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            "Failed to convert mock time to local timezone"
                        );
                    }
                } else {
                    tracing::warn!(
                        mock_time = %mock_time_str,
                        expected_format = "%Y-%m-%d %H:%M:%S",
                        "Invalid mock time format"
                    );
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    if let Some(offset) = get_mock_time_offset() {
        real_now + offset
    } else {
        real_now
    }
}

/// Wall-clock time of day, minute resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub fn from_naive_time(time: NaiveTime) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    pub fn minutes_from_midnight(&self) -> u32 {
        (self.hour as u32) * 60 + (self.minute as u32)
    }
}

impl PartialOrd for WallClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WallClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.minutes_from_midnight()
            .cmp(&other.minutes_from_midnight())
    }
}

impl std::fmt::Display for WallClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// The daily window during which a kiosk admits check-ins.
///
/// Windows never wrap past midnight: `start <= end` is enforced by
/// [`AdmissionWindow::windowed`]. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdmissionWindow {
    /// No time restriction
    AlwaysOpen,
    /// Open from `start` through `end`, every day
    Windowed { start: WallClock, end: WallClock },
}

/// Where a moment falls relative to an admission window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowGate {
    /// Inside a bounded window
    Inside,
    /// Outside a bounded window
    Outside,
    /// The window is [`AdmissionWindow::AlwaysOpen`]
    Unrestricted,
}

impl AdmissionWindow {
    /// Build a bounded window, rejecting ones that would wrap past midnight.
    pub fn windowed(start: WallClock, end: WallClock) -> Option<Self> {
        if start <= end {
            Some(Self::Windowed { start, end })
        } else {
            None
        }
    }

    /// Classify the time of day of `dt` against this window.
    pub fn gate(&self, dt: &DateTime<Local>) -> WindowGate {
        match self {
            Self::AlwaysOpen => WindowGate::Unrestricted,
            Self::Windowed { start, end } => {
                let time = WallClock::from_naive_time(dt.time());
                if *start <= time && time <= *end {
                    WindowGate::Inside
                } else {
                    WindowGate::Outside
                }
            }
        }
    }
}

impl std::fmt::Display for AdmissionWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlwaysOpen => write!(f, "always open"),
            Self::Windowed { start, end } => write!(f, "{}-{}", start, end),
        }
    }
}
