use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{
    task::JoinHandle,
    time::{Instant, sleep_until},
};

/// Inactivity threshold applied when nothing is configured.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(30);
/// Smallest threshold accepted from configuration.
pub const MIN_IDLE_THRESHOLD: Duration = Duration::from_secs(5);
/// Largest threshold accepted from configuration.
pub const MAX_IDLE_THRESHOLD: Duration = Duration::from_secs(300);

type FireCallback = Arc<dyn Fn(u64) + Send + Sync>;

struct TimerState {
    generation: u64,
    threshold: Duration,
    deadline: Option<Instant>,
    on_fire: Option<FireCallback>,
    task: Option<JoinHandle<()>>,
}

/// Restartable inactivity countdown.
///
/// Every arm (start or activity) opens a new cycle identified by a generation
/// number, which is passed to the callback. The callback runs under the
/// timer's lock after re-checking the generation, so once [`IdleTimer::stop`]
/// returns it can no longer run. It must not call back into the timer.
pub struct IdleTimer {
    shared: Arc<Mutex<TimerState>>,
}

impl Default for IdleTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl IdleTimer {
    /// Create a stopped timer.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(TimerState {
                generation: 0,
                threshold: DEFAULT_IDLE_THRESHOLD,
                deadline: None,
                on_fire: None,
                task: None,
            })),
        }
    }

    /// Start (or restart) the countdown. `on_fire` runs at most once per cycle.
    pub fn start<F>(&self, threshold: Duration, on_fire: F)
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        state.threshold = threshold;
        state.on_fire = Some(Arc::new(on_fire));
        self.arm(&mut state);
    }

    /// Restart the countdown. Re-arms a timer that already fired; ignored
    /// when the timer is stopped.
    pub fn report_activity(&self) {
        let mut state = self.lock();
        if state.on_fire.is_none() {
            return;
        }
        self.arm(&mut state);
    }

    /// Cancel the countdown and forget the callback. Idempotent.
    pub fn stop(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.on_fire = None;
        state.deadline = None;
        if let Some(task) = state.task.take() {
            task.abort();
        }
    }

    /// Whether `generation` identifies the cycle currently in effect.
    pub fn is_current(&self, generation: u64) -> bool {
        let state = self.lock();
        state.on_fire.is_some() && state.generation == generation
    }

    /// Time left before the callback fires, if a countdown is armed.
    pub fn time_until_idle(&self) -> Option<Duration> {
        self.lock()
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn arm(&self, state: &mut TimerState) {
        state.generation += 1;
        let generation = state.generation;
        let deadline = Instant::now() + state.threshold;
        state.deadline = Some(deadline);

        if let Some(task) = state.task.take() {
            task.abort();
        }

        let shared = Arc::downgrade(&self.shared);
        state.task = Some(tokio::spawn(async move {
            sleep_until(deadline).await;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
            if state.generation != generation {
                return;
            }
            state.deadline = None;
            state.task = None;
            if let Some(on_fire) = state.on_fire.clone() {
                on_fire(generation);
            }
        }));
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        if let Some(task) = self.lock().task.take() {
            task.abort();
        }
    }
}
