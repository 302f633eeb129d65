use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;

use crate::state::settings::{AVAILABLE_SESSION_MINUTES, ParentSettings, today};

/// Parent settings together with today's play time.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParentSettingsResponse {
    pub session_minutes: u32,
    pub reminder_minutes: u32,
    /// Session lengths a parent can choose from.
    pub available_session_minutes: Vec<u32>,
    /// Play time recorded today, in milliseconds.
    pub today_usage_ms: u64,
    /// Play time per `YYYY-MM-DD` day, in milliseconds.
    pub daily_usage_ms: BTreeMap<String, u64>,
}

impl From<&ParentSettings> for ParentSettingsResponse {
    fn from(settings: &ParentSettings) -> Self {
        Self {
            session_minutes: settings.session_minutes(),
            reminder_minutes: settings.reminder_minutes(),
            available_session_minutes: AVAILABLE_SESSION_MINUTES.to_vec(),
            today_usage_ms: settings.usage_for(today()),
            daily_usage_ms: settings.daily_usage().clone(),
        }
    }
}
