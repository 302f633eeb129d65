use serde::Deserialize;
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::dto::validation::{
    validate_extension_minutes, validate_reminder_minutes, validate_session_minutes,
};

/// Start a play session. Missing values come from the parent settings.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct StartSessionRequest {
    /// Session length; one of the offered values.
    pub session_minutes: Option<u32>,
    /// Reminder lead before the limit.
    pub reminder_minutes: Option<u32>,
}

impl StartSessionRequest {
    /// Resolve against the stored defaults.
    pub fn resolve(&self, session_minutes: u32, reminder_minutes: u32) -> (u32, u32) {
        (
            self.session_minutes.unwrap_or(session_minutes),
            self.reminder_minutes.unwrap_or(reminder_minutes),
        )
    }
}

impl Validate for StartSessionRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(session) = self.session_minutes {
            if let Err(e) = validate_session_minutes(session) {
                errors.add("session_minutes", e);
            }
            if let Some(reminder) = self.reminder_minutes {
                if let Err(e) = validate_reminder_minutes(reminder, session) {
                    errors.add("reminder_minutes", e);
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Grant extra play time to the current session.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct ExtendSessionRequest {
    /// Minutes to add; five when omitted.
    pub minutes: Option<u32>,
}

impl Validate for ExtendSessionRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(minutes) = self.minutes {
            if let Err(e) = validate_extension_minutes(minutes) {
                errors.add("minutes", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
