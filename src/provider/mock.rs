//! Scripted in-process provider for tests and dry runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::provider::client::{PollOutcome, ProviderClient, ProviderError, TriggerRequest, TriggeredRun};

#[derive(Debug, Default)]
struct MockState {
    next_run: u64,
    trigger_failures: HashMap<String, String>,
    polls: HashMap<String, PollOutcome>,
    triggered: Vec<TriggerRequest>,
    polled: Vec<String>,
}

/// Provider double: hands out `run-1`, `run-2`, ... and answers polls from a
/// script. Unscripted runs report `in_progress`.
#[derive(Debug, Default)]
pub struct MockProviderClient {
    state: Mutex<MockState>,
}

impl MockProviderClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reject triggers for this phone number with an API error.
    pub fn fail_trigger_for(&self, phone_number: &str, message: &str) {
        self.state()
            .trigger_failures
            .insert(phone_number.to_string(), message.to_string());
    }

    /// Script the answer for a run.
    pub fn set_poll(&self, run_id: &str, outcome: PollOutcome) {
        self.state().polls.insert(run_id.to_string(), outcome);
    }

    /// Script a terminal `completed` response carrying extra fields.
    pub fn complete_run(&self, run_id: &str, mut response: Value) {
        if let Some(obj) = response.as_object_mut() {
            obj.entry("status").or_insert_with(|| json!("completed"));
        }
        self.set_poll(run_id, PollOutcome::Response(response));
    }

    /// All trigger requests received so far, in order.
    pub fn triggered(&self) -> Vec<TriggerRequest> {
        self.state().triggered.clone()
    }

    /// Run ids polled so far, in order.
    pub fn polled(&self) -> Vec<String> {
        self.state().polled.clone()
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    async fn trigger(&self, request: TriggerRequest) -> Result<TriggeredRun, ProviderError> {
        let mut state = self.state();
        state.triggered.push(request.clone());

        if let Some(message) = state.trigger_failures.get(&request.phone_number) {
            return Err(ProviderError::Api {
                status: 422,
                message: message.clone(),
            });
        }

        state.next_run += 1;
        Ok(TriggeredRun {
            run_id: format!("run-{}", state.next_run),
        })
    }

    async fn poll_status(&self, run_id: &str) -> PollOutcome {
        let mut state = self.state();
        state.polled.push(run_id.to_string());
        state
            .polls
            .get(run_id)
            .cloned()
            .unwrap_or_else(|| PollOutcome::Response(json!({"id": run_id, "status": "in_progress"})))
    }
}
