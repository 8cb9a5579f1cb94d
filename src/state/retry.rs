// SPDX-License-Identifier: GPL-3.0-only

//! Retry policies for recoverable open failures
//!
//! The session state machine only asks the policy what to do after a
//! recoverable failure. Cadence, bounds and backoff all live here.

use super::error_code::ErrorCode;
use std::time::Duration;

/// What to do after a recoverable open failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-issue the open after the delay (zero means immediately)
    RetryAfter(Duration),
    /// Stay pending until the client requests the open again
    AwaitRequest,
    /// Stop retrying and tear the session down
    GiveUp,
}

/// Pluggable retry policy
pub trait RetryPolicy: Send + Sync + std::fmt::Debug {
    /// Decide how to continue after the `failures`-th consecutive recoverable failure
    ///
    /// `failures` starts at 1 for the first failure of a session.
    fn on_recoverable_error(&self, failures: u32, code: ErrorCode) -> RetryDecision;
}

/// Never retry automatically; the client re-requests the open
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualRetry;

impl RetryPolicy for ManualRetry {
    fn on_recoverable_error(&self, _failures: u32, _code: ErrorCode) -> RetryDecision {
        RetryDecision::AwaitRequest
    }
}

/// Retry after a constant delay
#[derive(Debug, Clone, Copy)]
pub struct FixedDelayRetry {
    pub delay: Duration,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl RetryPolicy for FixedDelayRetry {
    fn on_recoverable_error(&self, failures: u32, _code: ErrorCode) -> RetryDecision {
        if exhausted(failures, self.max_attempts) {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.delay)
    }
}

/// Retry with a doubling delay capped at `max_delay`
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl ExponentialBackoff {
    /// Delay before the retry that follows the `failures`-th failure
    pub fn delay_for(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(31);
        self.initial_delay
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn on_recoverable_error(&self, failures: u32, _code: ErrorCode) -> RetryDecision {
        if exhausted(failures, self.max_attempts) {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.delay_for(failures))
    }
}

/// `max_attempts` counts retries, so the n-th failure may still be retried while n <= max
fn exhausted(failures: u32, max_attempts: Option<u32>) -> bool {
    max_attempts.is_some_and(|max| failures > max)
}
