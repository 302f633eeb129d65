use std::time::Duration;

use tracing::info;

use crate::{
    dto::session::{ExtendSessionRequest, StartSessionRequest},
    error::ServiceError,
    state::{
        SharedState,
        session::{DEFAULT_EXTENSION, SessionStatus},
    },
};

fn minutes(value: u32) -> Duration {
    Duration::from_secs(u64::from(value) * 60)
}

/// Start a session, falling back to the stored parent settings.
pub async fn start(
    state: &SharedState,
    request: StartSessionRequest,
) -> Result<SessionStatus, ServiceError> {
    let settings = state.store().settings();
    let (session_minutes, reminder_minutes) =
        request.resolve(settings.session_minutes(), settings.reminder_minutes());
    settings.with_session_limit(session_minutes, reminder_minutes)?;

    info!(session_minutes, reminder_minutes, "starting play session");
    Ok(state
        .session()
        .start(minutes(session_minutes), minutes(reminder_minutes))
        .await)
}

/// Freeze the countdown.
pub fn pause(state: &SharedState) -> SessionStatus {
    state.session().pause()
}

/// Continue the countdown.
pub fn resume(state: &SharedState) -> SessionStatus {
    state.session().resume()
}

/// Add play time, reopening a session whose limit was reached.
pub async fn extend(state: &SharedState, request: ExtendSessionRequest) -> SessionStatus {
    let extra = request.minutes.map(minutes).unwrap_or(DEFAULT_EXTENSION);
    info!(extra = ?extra, "extending play session");
    state.session().extend(extra).await
}

/// End the session and record its play time.
pub async fn stop(state: &SharedState) -> SessionStatus {
    state.session().stop().await
}

/// Latest session status.
pub fn status(state: &SharedState) -> SessionStatus {
    state.session().status()
}
