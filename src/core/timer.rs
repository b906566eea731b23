// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Single-deadline timer owned by the current alert state

use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep_until, Instant, Sleep};
use tracing::trace;

/// At most one pending deadline. Setting a new deadline replaces the old
/// one, and clearing drops it, so a state never inherits its predecessor's
/// timer.
#[derive(Default)]
pub struct StateTimer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl StateTimer {
    pub fn new() -> Self {
        Self { sleep: None }
    }

    pub fn set(&mut self, deadline: Instant) {
        trace!("Timer set for {:?}", deadline);
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().reset(deadline),
            None => self.sleep = Some(Box::pin(sleep_until(deadline))),
        }
    }

    pub fn set_after(&mut self, delay: Duration) {
        self.set(Instant::now() + delay);
    }

    pub fn clear(&mut self) {
        self.sleep = None;
    }

    pub fn is_set(&self) -> bool {
        self.sleep.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.sleep.as_ref().map(|s| s.deadline())
    }

    /// Resolves with the deadline once it passes, leaving the timer clear.
    /// Pends forever while clear. Cancel safe: dropping the future keeps the
    /// deadline armed.
    pub async fn fired(&mut self) -> Instant {
        let Some(sleep) = self.sleep.as_mut() else {
            return std::future::pending().await;
        };
        sleep.as_mut().await;
        let deadline = sleep.deadline();
        self.sleep = None;
        deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_at_deadline() {
        let start = Instant::now();
        let mut timer = StateTimer::new();
        timer.set_after(Duration::from_secs(1));

        let deadline = timer.fired().await;
        assert_eq!(deadline, start + Duration::from_secs(1));
        assert!(!timer.is_set());

        let again = tokio::time::timeout(Duration::from_secs(5), timer.fired()).await;
        assert!(again.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_replaces_deadline() {
        let start = Instant::now();
        let mut timer = StateTimer::new();
        timer.set_after(Duration::from_secs(1));
        timer.set_after(Duration::from_secs(3));

        timer.fired().await;
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_timer_never_fires() {
        let mut timer = StateTimer::new();
        timer.set_after(Duration::from_millis(10));
        timer.clear();

        let result = tokio::time::timeout(Duration::from_secs(1), timer.fired()).await;
        assert!(result.is_err());
    }
}
