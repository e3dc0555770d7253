//! Exponential backoff for rejected requests
//!
//! A [`Backoff`] belongs to exactly one retry episode. Its escalation counter
//! grows with every wait and is reset when the request finally succeeds, so
//! unrelated requests (or concurrently processed frames) never inflate each
//! other's delays.

use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use super::config::{backoff_between, RetryPolicy};
use crate::metrics;

/// Status codes that ask the client to slow down: 429 and every 5xx
pub fn is_backoff_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Escalating wait state for one logical request
#[derive(Debug, Clone)]
pub struct Backoff {
    escalation: u32,
    initial: Duration,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_policy(&RetryPolicy::default())
    }
}

impl Backoff {
    /// Create a backoff with explicit bounds
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            escalation: 0,
            initial,
            max: max.max(initial),
        }
    }

    /// Create a backoff using the bounds of a retry policy
    pub fn from_policy(policy: &RetryPolicy) -> Self {
        Self::new(policy.initial_backoff, policy.max_backoff)
    }

    /// Number of waits performed since the last reset
    pub fn escalation(&self) -> u32 {
        self.escalation
    }

    /// Delay the next wait would use
    pub fn next_delay(&self) -> Duration {
        backoff_between(self.initial, self.max, self.escalation)
    }

    /// Wait before retrying a request that failed with `status`
    ///
    /// 429 and 5xx sleep for the current delay and escalate; any other code,
    /// `None` or `Some(0)` (no response) return at once. Returns the delay
    /// that was applied.
    pub async fn wait_for_server(&mut self, status: Option<u16>) -> Option<Duration> {
        let status = status.filter(|code| is_backoff_status(*code))?;

        let delay = self.next_delay();
        self.escalation = self.escalation.saturating_add(1);

        debug!(
            status = status,
            escalation = self.escalation,
            delay_ms = delay.as_millis() as u64,
            "Backing off before retry"
        );
        metrics::record_retry_backoff(delay, self.escalation);

        sleep(delay).await;
        Some(delay)
    }

    /// Reset escalation after a successful request
    pub fn reset(&mut self) {
        self.escalation = 0;
    }
}
