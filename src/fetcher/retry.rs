//! Retry episodes
//!
//! A [`RetryEpisode`] is the state of one logical request across its attempts:
//! attempt count, last status and its own [`Backoff`]. It is created per
//! request and dropped once the request succeeds or is abandoned.

use std::time::Duration;
use tracing::{debug, warn};

use super::classifier::{handle_exception, Disposition};
use super::FetcherError;
use crate::downloader::backoff::Backoff;
use crate::downloader::config::RetryPolicy;

/// Outcome of recording a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Send the same request again
    Retry,
    /// Stop; the failure is final
    GiveUp,
}

/// Retry state for one logical request
#[derive(Debug, Clone)]
pub struct RetryEpisode {
    policy: RetryPolicy,
    backoff: Backoff,
    attempts: u32,
    no_response_retries: u32,
    last_status: Option<u16>,
    total_backoff: Duration,
}

impl RetryEpisode {
    /// Start an episode bounded by `policy`
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            backoff: Backoff::from_policy(&policy),
            policy,
            attempts: 0,
            no_response_retries: 0,
            last_status: None,
            total_backoff: Duration::ZERO,
        }
    }

    /// Failed attempts recorded so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Status code of the most recent failure, if it had one
    pub fn last_status(&self) -> Option<u16> {
        self.last_status
    }

    /// Backoff state owned by this episode
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Total time spent backing off
    pub fn total_backoff(&self) -> Duration {
        self.total_backoff
    }

    /// Record a failed attempt, wait if the failure calls for it, and decide
    /// whether to retry
    ///
    /// The failure is logged exactly once through the classifier.
    pub async fn record_failure(&mut self, err: &FetcherError, context: &str) -> RetryDecision {
        self.attempts += 1;
        self.last_status = err.status();

        let disposition = handle_exception(err, context);
        let attempts_left = self.attempts < self.policy.max_attempts;

        match disposition {
            Disposition::Abandon => RetryDecision::GiveUp,
            Disposition::Backoff { .. } | Disposition::RetryImmediately if !attempts_left => {
                warn!(
                    context = %context,
                    attempts = self.attempts,
                    "Giving up after {} attempts",
                    self.attempts
                );
                RetryDecision::GiveUp
            }
            Disposition::Backoff { status } => {
                if let Some(delay) = self.backoff.wait_for_server(Some(status)).await {
                    self.total_backoff += delay;
                }
                debug!(
                    context = %context,
                    attempt = self.attempts + 1,
                    max_attempts = self.policy.max_attempts,
                    "Retrying after backoff"
                );
                RetryDecision::Retry
            }
            Disposition::RetryImmediately => {
                if self.no_response_retries >= self.policy.max_no_response_retries {
                    warn!(
                        context = %context,
                        retries = self.no_response_retries,
                        "Giving up after repeated missing responses"
                    );
                    return RetryDecision::GiveUp;
                }
                self.no_response_retries += 1;
                debug!(
                    context = %context,
                    retry = self.no_response_retries,
                    "Retrying immediately after missing response"
                );
                RetryDecision::Retry
            }
        }
    }

    /// Mark the request as successful
    pub fn succeeded(&mut self) {
        if self.attempts > 0 {
            debug!(
                attempts = self.attempts + 1,
                "Request succeeded after retries"
            );
        }
        self.backoff.reset();
    }
}
