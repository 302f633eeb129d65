//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::state::settings::AVAILABLE_SESSION_MINUTES;

/// Session length must be one of the lengths offered in the parent area.
pub fn validate_session_minutes(minutes: u32) -> Result<(), ValidationError> {
    if AVAILABLE_SESSION_MINUTES.contains(&minutes) {
        return Ok(());
    }
    let mut err = ValidationError::new("session_minutes");
    err.message = Some(
        format!("session length must be one of {AVAILABLE_SESSION_MINUTES:?} minutes (got {minutes})")
            .into(),
    );
    Err(err)
}

/// The reminder has to fire before the session ends.
pub fn validate_reminder_minutes(reminder: u32, session: u32) -> Result<(), ValidationError> {
    if reminder < session {
        return Ok(());
    }
    let mut err = ValidationError::new("reminder_minutes");
    err.message =
        Some(format!("reminder ({reminder} min) must be shorter than the session ({session} min)").into());
    Err(err)
}

/// Longest extension a parent can grant in one request.
pub const MAX_EXTENSION_MINUTES: u32 = 30;

/// Extra play time must be between one minute and [`MAX_EXTENSION_MINUTES`].
pub fn validate_extension_minutes(minutes: u32) -> Result<(), ValidationError> {
    if (1..=MAX_EXTENSION_MINUTES).contains(&minutes) {
        return Ok(());
    }
    let mut err = ValidationError::new("minutes");
    err.message = Some(
        format!("extension must be between 1 and {MAX_EXTENSION_MINUTES} minutes (got {minutes})")
            .into(),
    );
    Err(err)
}
