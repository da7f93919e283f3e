//! Core provider client types and trait definitions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::CallStatus;

/// Voice-call provider: trigger a call, poll its run.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Ask the provider to place a call. Returns the run handle on acceptance.
    async fn trigger(&self, request: TriggerRequest) -> Result<TriggeredRun, ProviderError>;

    /// Fetch the current state of a run.
    async fn poll_status(&self, run_id: &str) -> PollOutcome;
}

/// Everything the provider needs to place one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub phone_number: String,
    /// Debtor/invoice context handed to the voice agent
    pub metadata: Value,
}

/// Provider accepted a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggeredRun {
    pub run_id: String,
}

/// Result of polling one run
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Provider answered with the run's current raw state
    Response(Value),
    /// Provider has no record of the run
    NotFound,
    /// Provider could not be reached or answered with an error; retry later
    Unavailable(String),
}

/// Run status as reported by the provider, mapped to the call vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRunStatus {
    InProgress,
    Terminal(CallStatus),
}

impl ProviderRunStatus {
    /// Read `status` (or `state`) from a raw poll response.
    ///
    /// Unknown or missing values count as still in progress.
    pub fn from_response(response: &Value) -> Self {
        let raw = response
            .get("status")
            .or_else(|| response.get("state"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        Self::parse(raw)
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "completed" | "complete" | "succeeded" | "success" | "finished" | "ended" => {
                ProviderRunStatus::Terminal(CallStatus::Completed)
            }
            "failed" | "failure" | "error" | "errored" => ProviderRunStatus::Terminal(CallStatus::Failed),
            "canceled" | "cancelled" | "aborted" => ProviderRunStatus::Terminal(CallStatus::Canceled),
            _ => ProviderRunStatus::InProgress,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProviderRunStatus::Terminal(_))
    }
}

/// Errors that can occur while talking to the provider
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Provider accepted the request but returned no run id")]
    MissingRunId,

    #[error("Missing API key: environment variable {env_var} not set")]
    MissingApiKey { env_var: String },

    #[error("Debtor has no phone number")]
    MissingPhone,

    #[error("Invalid provider URL: {0}")]
    InvalidUrl(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Network(_) => true,
            ProviderError::InvalidResponse(_) => false,
            ProviderError::MissingRunId => false,
            ProviderError::MissingApiKey { .. } => false,
            ProviderError::MissingPhone => false,
            ProviderError::InvalidUrl(_) => false,
        }
    }
}
