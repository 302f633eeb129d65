use std::time::Duration;

use tokio::time::Instant;

/// Window applied when nothing is configured.
pub const DEFAULT_RAPID_INPUT_WINDOW: Duration = Duration::from_millis(600);
/// Shortest window accepted from configuration; anything below lets double taps through.
pub const MIN_RAPID_INPUT_WINDOW: Duration = Duration::from_millis(50);
/// Longest window accepted from configuration.
pub const MAX_RAPID_INPUT_WINDOW: Duration = Duration::from_secs(5);

/// Verdict for a single activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputVerdict {
    /// The activation counts and became the new baseline.
    Accepted,
    /// The activation came too soon after the last accepted one.
    Suppressed,
}

/// Debounces activations against a fixed window since the last accepted one.
///
/// Suppressed activations never move the baseline, so a steady stream of taps
/// faster than the window still lets one through per window.
#[derive(Debug, Clone)]
pub struct RapidInputGuard {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl Default for RapidInputGuard {
    fn default() -> Self {
        Self::new(DEFAULT_RAPID_INPUT_WINDOW)
    }
}

impl RapidInputGuard {
    /// Guard with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    /// Classify an activation happening now.
    pub fn check_and_record(&mut self) -> InputVerdict {
        self.check_and_record_at(Instant::now())
    }

    /// Classify an activation happening at `now`.
    pub fn check_and_record_at(&mut self, now: Instant) -> InputVerdict {
        match self.last_accepted {
            Some(last) if now.saturating_duration_since(last) < self.window => {
                InputVerdict::Suppressed
            }
            _ => {
                self.last_accepted = Some(now);
                InputVerdict::Accepted
            }
        }
    }

    /// Forget the baseline; the next activation is always accepted.
    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}
