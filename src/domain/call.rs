//! Call record and lifecycle
//!
//! A call is one attempt to reach one debtor. It is created PENDING by the
//! import step and is owned by the dispatcher until it reaches a terminal
//! status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CampaignId, Debtor, DebtorId, OutcomeCode};

pub type CallId = i64;

/// One attempt to reach one debtor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Call {
    pub id: CallId,
    pub campaign_id: CampaignId,
    pub debtor_id: DebtorId,

    /// 1-based attempt number
    pub attempt: u32,

    pub status: CallStatus,

    /// Provider handle, set only by a successful trigger
    pub run_id: Option<String>,

    pub triggered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub outcome: Option<OutcomeCode>,
    pub duration_secs: Option<u32>,
    pub summary: Option<String>,

    /// Size-capped copy of the provider's final response
    pub raw_response: Option<String>,
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Attached by `list_pending_calls` for payload building
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debtor: Option<Debtor>,
}

impl Call {
    /// Reference time for stale detection: trigger time, else last update.
    pub fn in_flight_since(&self) -> DateTime<Utc> {
        self.triggered_at.unwrap_or(self.updated_at)
    }
}

/// Call status state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallStatus {
    /// Waiting to be triggered
    Pending,
    /// Accepted by the provider, awaiting a terminal poll result
    Running,
    Completed,
    Failed,
    Canceled,
}

impl CallStatus {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Pending => "PENDING",
            CallStatus::Running => "RUNNING",
            CallStatus::Completed => "COMPLETED",
            CallStatus::Failed => "FAILED",
            CallStatus::Canceled => "CANCELED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(CallStatus::Pending),
            "RUNNING" => Some(CallStatus::Running),
            "COMPLETED" => Some(CallStatus::Completed),
            "FAILED" => Some(CallStatus::Failed),
            "CANCELED" => Some(CallStatus::Canceled),
            _ => None,
        }
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Completed | CallStatus::Failed | CallStatus::Canceled)
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Partial update applied to a call row. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallUpdate {
    pub status: Option<CallStatus>,
    pub run_id: Option<String>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: Option<OutcomeCode>,
    pub duration_secs: Option<u32>,
    pub summary: Option<String>,
    pub raw_response: Option<String>,
    pub error_message: Option<String>,
}

impl CallUpdate {
    /// Marks the moment a trigger request is about to be sent.
    pub fn triggering(at: DateTime<Utc>) -> Self {
        Self {
            triggered_at: Some(at),
            ..Default::default()
        }
    }

    /// Successful trigger: the provider accepted the call.
    pub fn running(run_id: impl Into<String>) -> Self {
        Self {
            status: Some(CallStatus::Running),
            run_id: Some(run_id.into()),
            ..Default::default()
        }
    }

    /// Terminal failure with an error detail.
    pub fn failed(error: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(CallStatus::Failed),
            error_message: Some(error.into()),
            completed_at: Some(at),
            ..Default::default()
        }
    }

    pub fn with_outcome(mut self, outcome: OutcomeCode) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Call counts for one campaign, grouped by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub canceled: usize,
}

impl CallCounts {
    pub fn get(&self, status: CallStatus) -> usize {
        match status {
            CallStatus::Pending => self.pending,
            CallStatus::Running => self.running,
            CallStatus::Completed => self.completed,
            CallStatus::Failed => self.failed,
            CallStatus::Canceled => self.canceled,
        }
    }

    pub fn set(&mut self, status: CallStatus, count: usize) {
        match status {
            CallStatus::Pending => self.pending = count,
            CallStatus::Running => self.running = count,
            CallStatus::Completed => self.completed = count,
            CallStatus::Failed => self.failed = count,
            CallStatus::Canceled => self.canceled = count,
        }
    }

    /// Calls not yet resolved: pending plus running.
    pub fn backlog(&self) -> usize {
        self.pending + self.running
    }
}
