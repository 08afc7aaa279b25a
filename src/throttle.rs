//! Call spacing for the hosting API.
//!
//! Every request waits until at least `min_interval` has passed since the previous one,
//! so the effective call rate never exceeds one per interval. When the API reports an
//! exhausted rate-limit budget, the next call additionally waits for the reset
//! (bounded by `max_pause`).

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct ThrottleState {
    last_call: Option<Instant>,
    paused_until: Option<Instant>,
}

#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    max_pause: Duration,
    state: Mutex<ThrottleState>,
}

impl Throttle {
    pub fn new(min_interval: Duration, max_pause: Duration) -> Self {
        Self {
            min_interval,
            max_pause,
            state: Mutex::new(ThrottleState::default()),
        }
    }

    /// A throttle that never waits. Used by tests and local fakes.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for the next call slot. The lock is held while sleeping so concurrent
    /// callers are released one interval apart.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let mut ready_at = state
            .last_call
            .map(|last| last + self.min_interval)
            .unwrap_or(now);
        if let Some(paused_until) = state.paused_until.take() {
            ready_at = ready_at.max(paused_until);
        }
        if ready_at > now {
            tokio::time::sleep_until(ready_at).await;
        }
        state.last_call = Some(Instant::now());
    }

    /// Hold back the next call for `wait`, capped at `max_pause`.
    pub async fn pause_for(&self, wait: Duration) {
        let wait = wait.min(self.max_pause);
        if wait.is_zero() {
            return;
        }
        tracing::warn!(wait_secs = wait.as_secs(), "rate limit exhausted, pausing");
        let mut state = self.state.lock().await;
        state.paused_until = Some(Instant::now() + wait);
    }
}

/// Compute how long to wait from GitHub-style rate-limit headers.
///
/// Returns `Some` only when `remaining` is zero and `reset` (epoch seconds) lies in the future.
pub fn rate_limit_wait(remaining: Option<&str>, reset: Option<&str>, now_epoch: i64) -> Option<Duration> {
    let remaining: u64 = remaining?.trim().parse().ok()?;
    if remaining > 0 {
        return None;
    }
    let reset: i64 = reset?.trim().parse().ok()?;
    let secs = reset.checked_sub(now_epoch)?;
    if secs <= 0 {
        return None;
    }
    Some(Duration::from_secs(secs as u64))
}
