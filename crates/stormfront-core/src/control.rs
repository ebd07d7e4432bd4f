//! Shared stop signal for the engine's tasks.
//!
//! Every world loop and the governor sampler hold an [`Arc`] of one
//! [`EngineControl`]. A stop request flips an atomic flag, checked at the
//! top of each loop iteration, and wakes tasks parked in
//! [`EngineControl::wait_for_stop`].
//!
//! [`Arc`]: std::sync::Arc

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

/// Engine-wide control state.
#[derive(Debug)]
pub struct EngineControl {
    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Wakes tasks waiting for a stop.
    stop_notify: Notify,

    /// Wall-clock time the engine started.
    started_at: DateTime<Utc>,
}

impl EngineControl {
    /// Create control state stamped with the current time.
    pub fn new() -> Self {
        Self {
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            started_at: Utc::now(),
        }
    }

    /// Request a clean stop and wake every waiting task.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Wait until a stop is requested.
    ///
    /// Returns immediately if one already was.
    pub async fn wait_for_stop(&self) {
        loop {
            let notified = self.stop_notify.notified();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }

    /// Wall-clock time the engine started.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whole seconds since the engine started.
    pub fn uptime_seconds(&self) -> u64 {
        let elapsed = Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds();
        // `num_seconds` can be negative if the wall clock stepped back.
        u64::try_from(elapsed.max(0)).unwrap_or(u64::MAX)
    }
}

impl Default for EngineControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn starts_running() {
        let control = EngineControl::new();
        assert!(!control.is_stop_requested());
        assert!(control.started_at() <= Utc::now());
    }

    #[test]
    fn stop_is_sticky() {
        let control = EngineControl::new();
        control.request_stop();
        control.request_stop();
        assert!(control.is_stop_requested());
    }

    #[tokio::test]
    async fn waiters_wake_on_stop() {
        let control = Arc::new(EngineControl::new());
        let waiter = {
            let control = Arc::clone(&control);
            tokio::spawn(async move { control.wait_for_stop().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        control.request_stop();
        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn wait_after_stop_returns_at_once() {
        let control = EngineControl::new();
        control.request_stop();
        let waited = tokio::time::timeout(Duration::from_millis(100), control.wait_for_stop()).await;
        assert!(waited.is_ok());
    }
}
