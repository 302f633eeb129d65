use futures::StreamExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{info, warn};

use crate::{
    dto::{
        progress::ProgressResponse,
        sse::{ProgressChangedEvent, ServerEvent, SessionEvent, SystemStatus},
    },
    state::{
        SharedState,
        session::{SessionState, SessionStatus},
    },
};

/// First event on every stream.
pub const EVENT_HANDSHAKE: &str = "handshake";
/// Effect delivered by a scene controller.
pub const EVENT_EFFECT: &str = "effect";
const EVENT_PROGRESS_CHANGED: &str = "progress.changed";
const EVENT_SESSION_STATUS: &str = "session.status";
const EVENT_SESSION_REMINDER: &str = "session.reminder";
const EVENT_SESSION_LIMIT_REACHED: &str = "session.limit_reached";
const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Forward progress, session and degraded-mode changes onto the public hub.
///
/// Subscriptions are taken before returning, so no change made after this
/// call is missed.
pub fn spawn_public_forwarders(state: &SharedState) -> Vec<JoinHandle<()>> {
    let mut progress = WatchStream::from_changes(state.store().subscribe());
    let mut session = WatchStream::from_changes(state.session().subscribe());
    let mut degraded = WatchStream::from_changes(state.degraded_watcher());

    let progress_task = {
        let state = state.clone();
        tokio::spawn(async move {
            while let Some(progress) = progress.next().await {
                let payload = ProgressChangedEvent(ProgressResponse::from(&progress));
                send_public_event(&state, EVENT_PROGRESS_CHANGED, &payload);
            }
        })
    };

    let session_task = {
        let state = state.clone();
        tokio::spawn(async move {
            let mut previous = state.session().status();
            while let Some(status) = session.next().await {
                broadcast_session(&state, &previous, status);
                previous = status;
            }
        })
    };

    let degraded_task = {
        let state = state.clone();
        tokio::spawn(async move {
            while let Some(value) = degraded.next().await {
                info!(degraded = value, "storage mode changed");
                send_public_event(&state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded: value });
            }
        })
    };

    vec![progress_task, session_task, degraded_task]
}

fn broadcast_session(state: &SharedState, previous: &SessionStatus, status: SessionStatus) {
    if status.reminder_due && !previous.reminder_due {
        send_public_event(state, EVENT_SESSION_REMINDER, &SessionEvent(status));
    }
    if status.state == SessionState::LimitReached && previous.state != SessionState::LimitReached
    {
        send_public_event(state, EVENT_SESSION_LIMIT_REACHED, &SessionEvent(status));
    }
    send_public_event(state, EVENT_SESSION_STATUS, &SessionEvent(status));
}

fn send_public_event<T: Serialize>(state: &SharedState, event: &str, payload: &T) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(message) => state.public_sse().broadcast(message),
        Err(err) => warn!(event, error = %err, "failed to serialise SSE payload"),
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::time::timeout;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::progress_store::memory::MemoryProgressBackend,
        state::{AppState, progress::SceneId},
    };

    #[tokio::test]
    async fn forwards_progress_and_degraded_changes() {
        let state = AppState::new(AppConfig::default());
        let mut rx = state.public_sse().subscribe();
        let _tasks = spawn_public_forwarders(&state);

        state
            .install_backend(Arc::new(MemoryProgressBackend::new()))
            .await
            .unwrap();
        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_SYSTEM_STATUS));
        assert_eq!(event.data, r#"{"degraded":false}"#);

        state
            .store()
            .update(|p| p.complete_scene(SceneId::FireStation, 1).0)
            .await
            .unwrap();
        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_PROGRESS_CHANGED));
        let body: serde_json::Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(body["total_badges"], 1);
    }
}
