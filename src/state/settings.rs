//! Parental-control settings and daily usage bookkeeping.

use std::collections::BTreeMap;

use thiserror::Error;
use time::{Date, OffsetDateTime};

/// Session lengths a parent can pick, in minutes.
pub const AVAILABLE_SESSION_MINUTES: [u32; 4] = [5, 10, 15, 30];
/// Default session length in minutes.
pub const DEFAULT_SESSION_MINUTES: u32 = 15;
/// Default reminder lead time in minutes.
pub const DEFAULT_REMINDER_MINUTES: u32 = 2;

/// Rejected settings change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// Session length is not one of [`AVAILABLE_SESSION_MINUTES`].
    #[error("unsupported session length of {0} minutes")]
    UnsupportedSession(u32),
    /// Reminder would fire at or before the session start.
    #[error("reminder of {reminder} minutes must be shorter than the {session} minute session")]
    ReminderTooLong {
        /// Requested reminder lead time.
        reminder: u32,
        /// Session length the reminder belongs to.
        session: u32,
    },
}

/// Settings a parent controls from the parent scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentSettings {
    session_minutes: u32,
    reminder_minutes: u32,
    daily_usage_ms: BTreeMap<String, u64>,
}

impl Default for ParentSettings {
    fn default() -> Self {
        Self {
            session_minutes: DEFAULT_SESSION_MINUTES,
            reminder_minutes: DEFAULT_REMINDER_MINUTES,
            daily_usage_ms: BTreeMap::new(),
        }
    }
}

impl ParentSettings {
    /// Rebuild settings from persisted values, falling back to defaults for
    /// anything out of range.
    pub fn from_parts(
        session_minutes: u32,
        reminder_minutes: u32,
        daily_usage_ms: BTreeMap<String, u64>,
    ) -> Self {
        let defaults = Self::default();
        let (session_minutes, reminder_minutes) =
            match validate_limits(session_minutes, reminder_minutes) {
                Ok(()) => (session_minutes, reminder_minutes),
                Err(_) => (defaults.session_minutes, defaults.reminder_minutes),
            };
        Self {
            session_minutes,
            reminder_minutes,
            daily_usage_ms,
        }
    }

    /// Session length in minutes.
    pub fn session_minutes(&self) -> u32 {
        self.session_minutes
    }

    /// Reminder lead time in minutes.
    pub fn reminder_minutes(&self) -> u32 {
        self.reminder_minutes
    }

    /// Recorded usage keyed by `YYYY-MM-DD`.
    pub fn daily_usage(&self) -> &BTreeMap<String, u64> {
        &self.daily_usage_ms
    }

    /// Copy with a new session limit.
    pub fn with_session_limit(
        &self,
        session_minutes: u32,
        reminder_minutes: u32,
    ) -> Result<Self, SettingsError> {
        validate_limits(session_minutes, reminder_minutes)?;
        Ok(Self {
            session_minutes,
            reminder_minutes,
            daily_usage_ms: self.daily_usage_ms.clone(),
        })
    }

    /// Copy with `elapsed_ms` added to the usage of `day`.
    pub fn with_usage(&self, day: Date, elapsed_ms: u64) -> Self {
        let mut next = self.clone();
        let slot = next.daily_usage_ms.entry(day_key(day)).or_insert(0);
        *slot = slot.saturating_add(elapsed_ms);
        next
    }

    /// Usage recorded for `day`, in milliseconds.
    pub fn usage_for(&self, day: Date) -> u64 {
        self.daily_usage_ms.get(&day_key(day)).copied().unwrap_or(0)
    }
}

fn validate_limits(session_minutes: u32, reminder_minutes: u32) -> Result<(), SettingsError> {
    if !AVAILABLE_SESSION_MINUTES.contains(&session_minutes) {
        return Err(SettingsError::UnsupportedSession(session_minutes));
    }
    if reminder_minutes >= session_minutes {
        return Err(SettingsError::ReminderTooLong {
            reminder: reminder_minutes,
            session: session_minutes,
        });
    }
    Ok(())
}

/// Storage key for a calendar day.
pub fn day_key(day: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        day.year(),
        u8::from(day.month()),
        day.day()
    )
}

/// Today's date in UTC.
pub fn today() -> Date {
    OffsetDateTime::now_utc().date()
}
