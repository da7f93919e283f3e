//! Consecutive-error tracking for the dispatcher loop.
//!
//! Each failed cycle pushes the retry delay out exponentially; a fully
//! successful cycle clears it. Once the error count reaches the configured
//! maximum the loop gives up.

use std::time::Duration;

/// Error streak state for one loop.
#[derive(Debug, Clone)]
pub struct ErrorBackoff {
    /// Number of cycle errors in a row.
    pub consecutive_errors: u32,
    base: Duration,
    max: Duration,
    limit: u32,
}

impl ErrorBackoff {
    /// Create a new backoff state.
    pub fn new(base: Duration, max: Duration, limit: u32) -> Self {
        Self {
            consecutive_errors: 0,
            base,
            max,
            limit,
        }
    }

    /// Record a failed cycle and return the delay before the next attempt.
    ///
    /// The delay is `base * 2^(n-1)`, capped at `max`.
    pub fn record_error(&mut self) -> Duration {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.current_delay()
    }

    /// Delay for the current streak (zero when there is none).
    pub fn current_delay(&self) -> Duration {
        if self.consecutive_errors == 0 {
            return Duration::ZERO;
        }
        let exponent = (self.consecutive_errors - 1).min(31);
        self.base.saturating_mul(1u32 << exponent).min(self.max)
    }

    /// Record a fully successful cycle.
    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
    }

    /// Whether the streak has reached the abort limit.
    pub fn exhausted(&self) -> bool {
        self.consecutive_errors >= self.limit
    }
}
