//! Parental-control play session countdown.

use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use serde::Serialize;
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::state::{settings::today, store::ProgressStore};

const TICK: Duration = Duration::from_secs(1);
/// Extra play time granted when a parent extends without naming an amount.
pub const DEFAULT_EXTENSION: Duration = Duration::from_secs(5 * 60);

/// Lifecycle of the play session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session is running.
    Idle,
    /// Time is being counted.
    Running,
    /// Counting is suspended.
    Paused,
    /// The allowed time is used up.
    LimitReached,
}

/// Published view of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct SessionStatus {
    /// Current lifecycle state.
    pub state: SessionState,
    /// Played time in milliseconds.
    pub elapsed_ms: u64,
    /// Remaining time in milliseconds.
    pub remaining_ms: u64,
    /// Session length in milliseconds.
    pub limit_ms: u64,
    /// Whether the "time is almost up" reminder was triggered.
    pub reminder_due: bool,
}

impl SessionStatus {
    fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            elapsed_ms: 0,
            remaining_ms: 0,
            limit_ms: 0,
            reminder_due: false,
        }
    }
}

enum SessionCommand {
    Pause,
    Resume,
    Extend(Duration, oneshot::Sender<SessionStatus>),
    Stop(oneshot::Sender<()>),
}

/// Counts play time against the limit chosen by a parent and records it
/// into the daily usage when the session ends.
pub struct SessionTimer {
    store: ProgressStore,
    status: watch::Sender<SessionStatus>,
    control: Mutex<Option<mpsc::UnboundedSender<SessionCommand>>>,
}

impl SessionTimer {
    /// Timer recording usage into `store`.
    pub fn new(store: ProgressStore) -> Self {
        let (status, _) = watch::channel(SessionStatus::idle());
        Self {
            store,
            status,
            control: Mutex::new(None),
        }
    }

    /// Latest published status.
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Start a new session, ending (and recording) any running one first.
    pub async fn start(&self, limit: Duration, reminder_lead: Duration) -> SessionStatus {
        self.stop().await;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut updates = self.status.subscribe();
        updates.mark_unchanged();
        {
            let mut control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
            *control = Some(tx);
        }

        tokio::spawn(run_session(
            self.store.clone(),
            self.status.clone(),
            limit,
            reminder_lead,
            rx,
        ));
        info!(limit = ?limit, reminder = ?reminder_lead, "play session started");

        let _ = updates.changed().await;
        self.status()
    }

    /// Suspend counting.
    pub fn pause(&self) -> SessionStatus {
        self.send(SessionCommand::Pause);
        self.status()
    }

    /// Resume counting after [`SessionTimer::pause`].
    pub fn resume(&self) -> SessionStatus {
        self.send(SessionCommand::Resume);
        self.status()
    }

    /// Grant `extra` play time. A session that reached its limit starts
    /// counting again. No-op when idle.
    pub async fn extend(&self, extra: Duration) -> SessionStatus {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SessionCommand::Extend(extra, reply_tx));
        match reply_rx.await {
            Ok(status) => status,
            Err(_) => self.status(),
        }
    }

    /// End the session and wait until its usage is recorded. No-op when idle.
    pub async fn stop(&self) -> SessionStatus {
        let control = self
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = control {
            let (done_tx, done_rx) = oneshot::channel();
            if tx.send(SessionCommand::Stop(done_tx)).is_ok() {
                let _ = done_rx.await;
            }
        }
        self.status()
    }

    fn send(&self, command: SessionCommand) {
        let control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = control.as_ref() {
            let _ = tx.send(command);
        }
    }
}

struct SessionClock {
    limit: Duration,
    reminder_lead: Duration,
    accumulated: Duration,
    resumed_at: Option<Instant>,
    reminded: bool,
    exhausted: bool,
    /// Play time already written to the daily usage.
    recorded: Duration,
}

impl SessionClock {
    fn state(&self) -> SessionState {
        if self.exhausted {
            SessionState::LimitReached
        } else if self.resumed_at.is_some() {
            SessionState::Running
        } else {
            SessionState::Paused
        }
    }

    fn unrecorded(&mut self) -> Duration {
        let elapsed = self.elapsed();
        let pending = elapsed.saturating_sub(self.recorded);
        self.recorded = elapsed;
        pending
    }

    fn elapsed(&self) -> Duration {
        let running = self
            .resumed_at
            .map(|since| since.elapsed())
            .unwrap_or_default();
        (self.accumulated + running).min(self.limit)
    }

    fn status(&self, state: SessionState) -> SessionStatus {
        let elapsed = self.elapsed();
        SessionStatus {
            state,
            elapsed_ms: elapsed.as_millis() as u64,
            remaining_ms: (self.limit - elapsed).as_millis() as u64,
            limit_ms: self.limit.as_millis() as u64,
            reminder_due: self.reminded,
        }
    }
}

async fn run_session(
    store: ProgressStore,
    status: watch::Sender<SessionStatus>,
    limit: Duration,
    reminder_lead: Duration,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
) {
    let mut clock = SessionClock {
        limit,
        reminder_lead,
        accumulated: Duration::ZERO,
        resumed_at: Some(Instant::now()),
        reminded: false,
        exhausted: false,
        recorded: Duration::ZERO,
    };
    let mut ticker = interval_at(Instant::now() + TICK, TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    status.send_replace(clock.status(SessionState::Running));

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SessionCommand::Pause) => {
                    if let Some(since) = clock.resumed_at.take() {
                        clock.accumulated += since.elapsed();
                        status.send_replace(clock.status(SessionState::Paused));
                    }
                }
                Some(SessionCommand::Resume) => {
                    if clock.resumed_at.is_none() && !clock.exhausted {
                        clock.resumed_at = Some(Instant::now());
                        ticker.reset();
                        status.send_replace(clock.status(SessionState::Running));
                    }
                }
                Some(SessionCommand::Extend(extra, reply)) => {
                    clock.limit += extra;
                    if clock.limit - clock.elapsed() > clock.reminder_lead {
                        clock.reminded = false;
                    }
                    if clock.exhausted {
                        clock.exhausted = false;
                        clock.resumed_at = Some(Instant::now());
                        ticker.reset();
                    }
                    info!(extra = ?extra, limit = ?clock.limit, "play session extended");
                    let extended = clock.status(clock.state());
                    status.send_replace(extended);
                    let _ = reply.send(extended);
                }
                Some(SessionCommand::Stop(done)) => {
                    record_usage(&store, clock.unrecorded()).await;
                    status.send_replace(clock.status(SessionState::Idle));
                    let _ = done.send(());
                    return;
                }
                None => {
                    record_usage(&store, clock.unrecorded()).await;
                    return;
                }
            },
            _ = ticker.tick(), if clock.resumed_at.is_some() => {
                let elapsed = clock.elapsed();
                if elapsed >= clock.limit {
                    clock.resumed_at = None;
                    clock.accumulated = clock.limit;
                    clock.exhausted = true;
                    record_usage(&store, clock.unrecorded()).await;
                    status.send_replace(clock.status(SessionState::LimitReached));
                    info!("play session limit reached");
                    continue;
                }
                if !clock.reminded && clock.limit - elapsed <= clock.reminder_lead {
                    clock.reminded = true;
                    info!(remaining = ?(clock.limit - elapsed), "play session reminder due");
                }
                status.send_replace(clock.status(SessionState::Running));
            }
        }
    }
}

async fn record_usage(store: &ProgressStore, elapsed: Duration) {
    if elapsed.is_zero() {
        return;
    }
    if let Err(err) = store
        .record_usage(today(), elapsed.as_millis() as u64)
        .await
    {
        warn!(error = %err, "failed to record play time");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::time::sleep;

    use super::*;
    use crate::dao::progress_store::memory::MemoryProgressBackend;

    const MINUTE: Duration = Duration::from_secs(60);

    async fn timer() -> (SessionTimer, ProgressStore) {
        let store = ProgressStore::default();
        store
            .install_backend(Arc::new(MemoryProgressBackend::new()))
            .await
            .unwrap();
        (SessionTimer::new(store.clone()), store)
    }

    #[tokio::test(start_paused = true)]
    async fn reminder_then_limit() {
        let (timer, store) = timer().await;
        let started = timer.start(5 * MINUTE, 2 * MINUTE).await;
        assert_eq!(started.state, SessionState::Running);
        assert_eq!(started.limit_ms, 300_000);

        sleep(2 * MINUTE + Duration::from_millis(500)).await;
        assert!(!timer.status().reminder_due);

        sleep(MINUTE + Duration::from_secs(1)).await;
        let status = timer.status();
        assert_eq!(status.state, SessionState::Running);
        assert!(status.reminder_due);

        sleep(2 * MINUTE).await;
        let status = timer.status();
        assert_eq!(status.state, SessionState::LimitReached);
        assert_eq!(status.remaining_ms, 0);
        assert_eq!(store.settings().usage_for(today()), 300_000);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_time_is_not_counted() {
        let (timer, store) = timer().await;
        timer.start(30 * MINUTE, 2 * MINUTE).await;

        sleep(MINUTE).await;
        timer.pause();
        sleep(10 * MINUTE).await;
        let paused = timer.status();
        assert_eq!(paused.state, SessionState::Paused);
        assert_eq!(paused.elapsed_ms, 60_000);

        timer.resume();
        sleep(Duration::from_secs(30)).await;
        let stopped = timer.stop().await;

        assert_eq!(stopped.state, SessionState::Idle);
        assert_eq!(store.settings().usage_for(today()), 90_000);
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_records_the_previous_session() {
        let (timer, store) = timer().await;
        timer.start(10 * MINUTE, 2 * MINUTE).await;
        sleep(MINUTE).await;

        timer.start(10 * MINUTE, 2 * MINUTE).await;
        assert_eq!(store.settings().usage_for(today()), 60_000);
        assert_eq!(timer.status().elapsed_ms, 0);
    }

    #[tokio::test]
    async fn stop_without_session_is_a_no_op() {
        let (timer, _) = timer().await;
        assert_eq!(timer.stop().await.state, SessionState::Idle);
        assert_eq!(timer.pause().state, SessionState::Idle);
        assert_eq!(timer.extend(DEFAULT_EXTENSION).await.state, SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn extension_reopens_an_exhausted_session() {
        let (timer, store) = timer().await;
        timer.start(5 * MINUTE, 2 * MINUTE).await;
        sleep(5 * MINUTE + Duration::from_secs(1)).await;
        assert_eq!(timer.status().state, SessionState::LimitReached);
        assert_eq!(timer.resume().state, SessionState::LimitReached);

        let extended = timer.extend(DEFAULT_EXTENSION).await;
        assert_eq!(extended.state, SessionState::Running);
        assert_eq!(extended.limit_ms, 600_000);
        assert_eq!(extended.remaining_ms, 300_000);
        assert!(!extended.reminder_due);

        sleep(MINUTE).await;
        let stopped = timer.stop().await;
        assert_eq!(stopped.state, SessionState::Idle);
        assert_eq!(store.settings().usage_for(today()), 360_000);
    }

    #[tokio::test(start_paused = true)]
    async fn extending_a_running_session_keeps_counting() {
        let (timer, _) = timer().await;
        timer.start(5 * MINUTE, 2 * MINUTE).await;
        sleep(4 * MINUTE).await;
        assert!(timer.status().reminder_due);

        let extended = timer.extend(DEFAULT_EXTENSION).await;
        assert_eq!(extended.state, SessionState::Running);
        assert_eq!(extended.limit_ms, 600_000);
        assert!(!extended.reminder_due);

        sleep(2 * MINUTE).await;
        assert_eq!(timer.status().state, SessionState::Running);
    }
}
