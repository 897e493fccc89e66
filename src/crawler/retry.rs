//! Retry classification and backoff for failed fetches

use crate::config::RetryConfig;
use crate::crawler::fetcher::FetchError;
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;

/// What to do with a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after a backoff, if attempts remain
    Retry,
    /// Record the URL as failed without another attempt
    GiveUp,
}

/// Classifies fetch failures and computes backoff delays
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_secs: f64,
    factor: f64,
    jitter: (f64, f64),
    retry_codes: HashSet<u16>,
    give_up_codes: HashSet<u16>,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_secs: config.backoff_base_secs,
            factor: config.backoff_factor,
            jitter: config.jitter_range_secs,
            retry_codes: config.retry_status_codes.iter().copied().collect(),
            give_up_codes: config.give_up_status_codes.iter().copied().collect(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Classifies a failure, ignoring the attempt count
    ///
    /// Give-up status codes are never retried. Everything else, including
    /// statuses in neither configured set and transport errors, is retried.
    pub fn classify(&self, error: &FetchError) -> RetryDecision {
        match error {
            FetchError::Status { status, .. } if self.give_up_codes.contains(status) => {
                RetryDecision::GiveUp
            }
            FetchError::Status { status, .. } if !self.retry_codes.contains(status) => {
                tracing::debug!("Status {} is not configured; treating as retryable", status);
                RetryDecision::Retry
            }
            _ => RetryDecision::Retry,
        }
    }

    /// Decides whether attempt number `attempt` (1-based) should be followed by another
    pub fn decide(&self, error: &FetchError, attempt: u32) -> RetryDecision {
        match self.classify(error) {
            RetryDecision::Retry if attempt < self.max_attempts => RetryDecision::Retry,
            _ => RetryDecision::GiveUp,
        }
    }

    /// Backoff after failed attempt number `attempt` (1-based)
    ///
    /// `base * factor^(attempt - 1)` plus a uniform draw from the jitter range.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let base = self.base_secs * self.factor.powi(exponent);

        let (min, max) = self.jitter;
        let jitter = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };

        Duration::try_from_secs_f64(base + jitter).unwrap_or(Duration::ZERO)
    }
}
