use std::time::Duration;

/// Retry state of one logical request
///
/// A request starts as `Attempted(0)`. Each failure moves it to `Retrying(n)`
/// (n = failures so far) while fewer than `max_attempts` failures have been
/// seen, and to `Dropped` once the budget is spent. `Dropped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempted(u32),
    Retrying(u32),
    Dropped,
}

/// What the engine should do with a failed work item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enqueue the same request
    Retry {
        /// Failures recorded so far for this request
        attempt: u32,
        /// Added to the item's current priority
        priority_adjustment: i32,
        /// Earliest time the retry may be dispatched
        delay: Duration,
    },

    /// Give up and emit one failure record
    Drop { attempts: u32 },
}

/// Bounded retry policy for application-level failures
///
/// `max_attempts` counts total attempts, not retries: a request is sent at
/// most `max_attempts` times, so it is retried at most `max_attempts - 1` times.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_backoff: Duration,
}

impl RetryPolicy {
    /// Creates a policy that drops a request after `max_attempts` consecutive failures
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Advances the state machine by one failure
    pub fn on_failure(&self, state: RetryState) -> RetryState {
        let failures = match state {
            RetryState::Attempted(n) | RetryState::Retrying(n) => n + 1,
            RetryState::Dropped => return RetryState::Dropped,
        };

        if failures < self.max_attempts {
            RetryState::Retrying(failures)
        } else {
            RetryState::Dropped
        }
    }

    /// Decides the fate of a work item that failed after `failures_before` earlier failures
    pub fn decide(&self, failures_before: u32, priority_adjustment: i32) -> RetryDecision {
        match self.on_failure(RetryState::Attempted(failures_before)) {
            RetryState::Retrying(attempt) => RetryDecision::Retry {
                attempt,
                priority_adjustment,
                delay: self.backoff(attempt),
            },
            _ => RetryDecision::Drop {
                attempts: failures_before + 1,
            },
        }
    }

    /// Exponential backoff, doubling per attempt and capped at 32× the base
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(5);
        self.base_backoff.saturating_mul(1 << exponent)
    }
}
