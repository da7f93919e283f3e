//! Dispatcher tuning knobs.

use std::time::Duration;

/// Configuration for one dispatcher loop
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum calls in RUNNING at once
    pub concurrency: usize,
    /// Sleep between active cycles
    pub poll_interval: Duration,
    /// Sleep between cycles while paused with nothing in flight
    pub paused_check_interval: Duration,
    /// Cycle errors in a row before the loop aborts
    pub max_consecutive_errors: u32,
    /// First retry delay after a cycle error
    pub base_backoff: Duration,
    /// Upper bound on the retry delay
    pub max_backoff: Duration,
    /// Above this many consecutive errors the trigger batch is capped
    pub degraded_error_threshold: u32,
    /// Trigger batch cap while degraded
    pub degraded_batch_cap: usize,
    /// RUNNING calls older than this are reaped
    pub stale_call_timeout: Duration,
    /// Reaper cadence, in successful cycles
    pub reaper_every_cycles: u64,
    /// Stored raw responses are truncated to this many bytes
    pub raw_response_max_bytes: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval: Duration::from_secs(5),
            paused_check_interval: Duration::from_secs(30),
            max_consecutive_errors: 10,
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            degraded_error_threshold: 2,
            degraded_batch_cap: 5,
            stale_call_timeout: Duration::from_secs(15 * 60),
            reaper_every_cycles: 12,
            raw_response_max_bytes: 10_000,
        }
    }
}

impl DispatcherConfig {
    /// Create a config with the given concurrency ceiling
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Default::default()
        }
    }

    /// Set both sleep intervals
    pub fn with_intervals(mut self, poll: Duration, paused_check: Duration) -> Self {
        self.poll_interval = poll;
        self.paused_check_interval = paused_check;
        self
    }

    /// Set the circuit breaker and its backoff curve
    pub fn with_backoff(mut self, max_errors: u32, base: Duration, max: Duration) -> Self {
        self.max_consecutive_errors = max_errors;
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    pub fn with_stale_timeout(mut self, timeout: Duration) -> Self {
        self.stale_call_timeout = timeout;
        self
    }

    pub fn with_reaper_every(mut self, cycles: u64) -> Self {
        self.reaper_every_cycles = cycles.max(1);
        self
    }

    /// Trigger capacity given the number of calls in flight.
    ///
    /// While degraded (more than `degraded_error_threshold` consecutive
    /// errors) the capacity is further capped at `degraded_batch_cap`.
    pub fn trigger_capacity(&self, running: usize, consecutive_errors: u32) -> usize {
        let capacity = self.concurrency.saturating_sub(running);
        if consecutive_errors > self.degraded_error_threshold {
            capacity.min(self.degraded_batch_cap)
        } else {
            capacity
        }
    }
}
