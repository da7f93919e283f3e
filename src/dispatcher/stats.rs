//! Loop state and counters, shared between a running loop and its supervisor.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stats shared between a loop task and whoever observes it
pub type SharedStats = Arc<Mutex<DispatcherStats>>;

/// Copy the current stats out of the shared cell.
pub fn snapshot(stats: &SharedStats) -> DispatcherStats {
    stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Mutate the shared stats. The lock is never held across an await.
pub fn update(stats: &SharedStats, f: impl FnOnce(&mut DispatcherStats)) {
    let mut guard = stats.lock().unwrap_or_else(|e| e.into_inner());
    f(&mut guard);
}

/// Lifecycle of one dispatcher loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopState {
    #[default]
    Idle,
    Running,
    /// Stopped on request, or the active campaign went away
    Stopped,
    /// The backlog drained and the campaign was marked COMPLETED
    Completed,
    /// Circuit breaker tripped; needs an external restart
    Aborted,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Idle => "IDLE",
            LoopState::Running => "RUNNING",
            LoopState::Stopped => "STOPPED",
            LoopState::Completed => "COMPLETED",
            LoopState::Aborted => "ABORTED",
        }
    }

    /// Check if the loop has finished.
    pub fn is_finished(&self) -> bool {
        matches!(self, LoopState::Stopped | LoopState::Completed | LoopState::Aborted)
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counters for one loop run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatcherStats {
    pub state: LoopState,
    /// Successful cycles since start
    pub cycles: u64,
    pub total_triggered: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_reaped: u64,
    pub consecutive_errors: u32,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DispatcherStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the loop as running
    pub fn start(&mut self, at: DateTime<Utc>) {
        self.state = LoopState::Running;
        self.started_at = Some(at);
        self.finished_at = None;
    }

    /// Record the final state
    pub fn finish(&mut self, state: LoopState, at: DateTime<Utc>) {
        self.state = state;
        self.finished_at = Some(at);
    }

    /// Record a loop that died without reaching a final state on its own
    pub fn abort(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        self.last_error = Some(error.into());
        self.finish(LoopState::Aborted, at);
    }

    /// Record a fully successful cycle
    pub fn cycle_ok(&mut self, at: DateTime<Utc>) {
        self.cycles += 1;
        self.consecutive_errors = 0;
        self.last_cycle_at = Some(at);
    }

    /// Record a failed cycle
    pub fn cycle_failed(&mut self, consecutive_errors: u32, error: impl Into<String>) {
        self.consecutive_errors = consecutive_errors;
        self.last_error = Some(error.into());
    }

    pub fn triggered(&mut self) {
        self.total_triggered += 1;
    }

    pub fn completed(&mut self) {
        self.total_completed += 1;
    }

    pub fn failed(&mut self) {
        self.total_failed += 1;
    }

    pub fn reaped(&mut self, count: usize) {
        self.total_reaped += count as u64;
    }

    /// A loop is healthy unless it aborted or is past the degraded threshold.
    pub fn is_healthy(&self, degraded_error_threshold: u32) -> bool {
        self.state != LoopState::Aborted && self.consecutive_errors <= degraded_error_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_state_default() {
        assert_eq!(LoopState::default(), LoopState::Idle);
        assert!(!LoopState::Idle.is_finished());
        assert!(!LoopState::Running.is_finished());
        assert!(LoopState::Stopped.is_finished());
        assert!(LoopState::Completed.is_finished());
        assert!(LoopState::Aborted.is_finished());
    }

    #[test]
    fn test_loop_state_serializes_uppercase() {
        let json = serde_json::to_string(&LoopState::Aborted).unwrap();
        assert_eq!(json, "\"ABORTED\"");
    }

    #[test]
    fn test_start_and_finish() {
        let mut stats = DispatcherStats::new();
        let now = Utc::now();
        stats.start(now);
        assert_eq!(stats.state, LoopState::Running);
        assert_eq!(stats.started_at, Some(now));

        stats.finish(LoopState::Completed, now);
        assert_eq!(stats.state, LoopState::Completed);
        assert_eq!(stats.finished_at, Some(now));
    }

    #[test]
    fn test_abort_records_error() {
        let mut stats = DispatcherStats::new();
        stats.start(Utc::now());
        stats.abort("task panicked", Utc::now());
        assert_eq!(stats.state, LoopState::Aborted);
        assert_eq!(stats.last_error.as_deref(), Some("task panicked"));
        assert!(stats.finished_at.is_some());
        assert!(!stats.is_healthy(2));
    }

    #[test]
    fn test_cycle_ok_resets_errors() {
        let mut stats = DispatcherStats::new();
        stats.cycle_failed(3, "db locked");
        assert_eq!(stats.consecutive_errors, 3);
        assert_eq!(stats.last_error.as_deref(), Some("db locked"));

        stats.cycle_ok(Utc::now());
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.consecutive_errors, 0);
        // Last error is kept for diagnostics
        assert!(stats.last_error.is_some());
    }

    #[test]
    fn test_totals() {
        let mut stats = DispatcherStats::new();
        stats.triggered();
        stats.triggered();
        stats.completed();
        stats.failed();
        stats.reaped(4);
        assert_eq!(stats.total_triggered, 2);
        assert_eq!(stats.total_completed, 1);
        assert_eq!(stats.total_failed, 1);
        assert_eq!(stats.total_reaped, 4);
    }

    #[test]
    fn test_shared_update_and_snapshot() {
        let shared: SharedStats = Arc::new(Mutex::new(DispatcherStats::new()));
        update(&shared, |s| s.triggered());
        update(&shared, |s| s.reaped(2));
        let copy = snapshot(&shared);
        assert_eq!(copy.total_triggered, 1);
        assert_eq!(copy.total_reaped, 2);
    }

    #[test]
    fn test_health() {
        let mut stats = DispatcherStats::new();
        stats.start(Utc::now());
        assert!(stats.is_healthy(2));

        stats.cycle_failed(2, "x");
        assert!(stats.is_healthy(2));
        stats.cycle_failed(3, "x");
        assert!(!stats.is_healthy(2));

        stats.cycle_ok(Utc::now());
        stats.finish(LoopState::Aborted, Utc::now());
        assert!(!stats.is_healthy(2));
    }
}
