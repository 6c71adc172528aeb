//! Reconnect backoff configuration and the single pending timer.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::events::SessionEvent;

/// Configuration for reconnect backoff.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Ceiling for the delay between attempts.
    pub max_delay: Duration,
    /// Growth factor applied after each attempt.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            multiplier: 1.5,
        }
    }
}

impl BackoffConfig {
    /// Calculate the delay for the given attempt number (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay_millis = (self.initial_delay.as_millis() as f64 * factor) as u64;
        Duration::from_millis(delay_millis).min(self.max_delay)
    }
}

/// Owns the single pending reconnect timer.
///
/// Invariants: at most one timer is pending at a time, arming while one
/// is pending is a no-op, and the delay grows only after a timer has
/// actually fired.
#[derive(Debug)]
pub(crate) struct ReconnectTimer {
    config: BackoffConfig,
    attempt: u32,
    pending: Option<JoinHandle<()>>,
}

impl ReconnectTimer {
    pub(crate) fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempt: 0,
            pending: None,
        }
    }

    /// Delay the next armed timer will use.
    pub(crate) fn next_delay(&self) -> Duration {
        self.config.delay_for_attempt(self.attempt.saturating_add(1))
    }

    /// Arm the timer; `ReconnectFired` lands on `tx` after the current
    /// delay. Returns false (and does nothing) if a timer is already
    /// pending.
    pub(crate) fn arm(&mut self, tx: mpsc::UnboundedSender<SessionEvent>) -> bool {
        if self.pending.is_some() {
            return false;
        }
        let delay = self.next_delay();
        self.pending = Some(tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(SessionEvent::ReconnectFired);
        }));
        true
    }

    /// Record that the pending timer fired. The next delay grows from
    /// here, clamped at the ceiling.
    pub(crate) fn fired(&mut self) {
        self.pending = None;
        self.attempt = self.attempt.saturating_add(1);
    }

    /// Cancel the pending timer. Safe to call when nothing is pending.
    pub(crate) fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// Successful open: cancel any pending timer and return the delay
    /// to its floor.
    pub(crate) fn reset(&mut self) {
        self.cancel();
        self.attempt = 0;
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
