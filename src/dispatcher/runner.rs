//! Dispatcher loop for one campaign.
//!
//! Each cycle re-reads the campaign from the repository, optionally reaps
//! stale calls, triggers pending calls up to the concurrency ceiling and
//! polls the ones in flight. Cycle-level errors back off exponentially and
//! trip a circuit breaker after too many in a row.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::backoff::ErrorBackoff;
use super::config::DispatcherConfig;
use super::payload::build_trigger_request;
use super::reaper::StaleCallReaper;
use super::stats::{self, DispatcherStats, LoopState, SharedStats};
use crate::classify::OutcomeClassifier;
use crate::domain::{Call, CallStatus, CallUpdate, CampaignId, CampaignStatus, CampaignUpdate, OutcomeCode};
use crate::error::Result;
use crate::provider::{PollOutcome, ProviderClient, ProviderError, ProviderRunStatus};
use crate::store::CallRepository;

/// What the loop should do after a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Sleep for this long, then run another cycle
    Continue(Duration),
    /// Leave the loop in this final state
    Exit(LoopState),
}

/// Drives calls of a single campaign through their lifecycle.
pub struct Dispatcher<R: CallRepository + ?Sized, P: ProviderClient + ?Sized> {
    campaign_id: CampaignId,
    repo: Arc<R>,
    provider: Arc<P>,
    classifier: OutcomeClassifier,
    reaper: StaleCallReaper<R>,
    config: DispatcherConfig,
    cancel: CancellationToken,
    stats: SharedStats,
    backoff: ErrorBackoff,
    reap_due: bool,
}

impl<R, P> Dispatcher<R, P>
where
    R: CallRepository + ?Sized,
    P: ProviderClient + ?Sized,
{
    pub fn new(campaign_id: CampaignId, repo: Arc<R>, provider: Arc<P>, config: DispatcherConfig) -> Self {
        let reaper = StaleCallReaper::new(repo.clone(), config.stale_call_timeout);
        let backoff = ErrorBackoff::new(config.base_backoff, config.max_backoff, config.max_consecutive_errors);

        Self {
            campaign_id,
            repo,
            provider,
            classifier: OutcomeClassifier::default(),
            reaper,
            config,
            cancel: CancellationToken::new(),
            stats: Arc::new(Mutex::new(DispatcherStats::new())),
            backoff,
            reap_due: true,
        }
    }

    /// Use a classifier with custom tables
    pub fn with_classifier(mut self, classifier: OutcomeClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Use an externally owned cancellation token
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn campaign_id(&self) -> CampaignId {
        self.campaign_id
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Handle for observing the stats while the loop runs
    pub fn stats_handle(&self) -> SharedStats {
        self.stats.clone()
    }

    pub fn stats(&self) -> DispatcherStats {
        stats::snapshot(&self.stats)
    }

    /// Run cycles until the loop reaches a final state.
    pub async fn run(mut self) -> LoopState {
        stats::update(&self.stats, |s| s.start(Utc::now()));
        info!("Dispatcher started for campaign {}", self.campaign_id);

        let final_state = loop {
            match self.run_cycle().await {
                CycleOutcome::Continue(delay) => {
                    if !self.sleep(delay).await {
                        break LoopState::Stopped;
                    }
                }
                CycleOutcome::Exit(state) => break state,
            }
        };

        stats::update(&self.stats, |s| s.finish(final_state, Utc::now()));
        info!("Dispatcher for campaign {} exited: {}", self.campaign_id, final_state);
        final_state
    }

    /// Run one cycle and apply the error policy to its result.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        match self.cycle().await {
            Ok(CycleOutcome::Continue(delay)) => {
                self.backoff.record_success();
                stats::update(&self.stats, |s| s.cycle_ok(Utc::now()));
                let cycles = stats::snapshot(&self.stats).cycles;
                if cycles % self.config.reaper_every_cycles.max(1) == 0 {
                    self.reap_due = true;
                }
                CycleOutcome::Continue(delay)
            }
            Ok(exit) => exit,
            Err(e) => {
                let delay = self.backoff.record_error();
                let errors = self.backoff.consecutive_errors;
                stats::update(&self.stats, |s| s.cycle_failed(errors, e.to_string()));

                if self.backoff.exhausted() {
                    error!(
                        "Dispatcher for campaign {} aborting after {} consecutive errors: {}",
                        self.campaign_id, errors, e
                    );
                    return CycleOutcome::Exit(LoopState::Aborted);
                }

                warn!(
                    "Dispatcher cycle failed ({}/{}), retrying in {:?}: {}",
                    errors, self.config.max_consecutive_errors, delay, e
                );
                CycleOutcome::Continue(delay)
            }
        }
    }

    /// Sleep unless cancelled. Returns false when cancellation won.
    async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn cycle(&mut self) -> Result<CycleOutcome> {
        if self.cancel.is_cancelled() {
            return Ok(CycleOutcome::Exit(LoopState::Stopped));
        }

        let Some(campaign) = self.repo.find_active_campaign().await? else {
            info!("No active campaign any more, stopping dispatcher for {}", self.campaign_id);
            return Ok(CycleOutcome::Exit(LoopState::Stopped));
        };
        if campaign.id != self.campaign_id {
            info!(
                "Active campaign changed from {} to {}, stopping dispatcher",
                self.campaign_id, campaign.id
            );
            return Ok(CycleOutcome::Exit(LoopState::Stopped));
        }
        if campaign.status == CampaignStatus::Completed {
            info!("Campaign {} is already completed, nothing to dispatch", campaign.id);
            return Ok(CycleOutcome::Exit(LoopState::Completed));
        }

        if campaign.started_at.is_none() {
            let update = CampaignUpdate {
                started_at: Some(Utc::now()),
                ..Default::default()
            };
            self.repo.update_campaign(campaign.id, &update).await?;
        }

        // Reap before counting so freed slots are usable this cycle
        if self.reap_due {
            let reaped = self.reaper.reap(Utc::now()).await?;
            self.reap_due = false;
            if reaped > 0 {
                stats::update(&self.stats, |s| s.reaped(reaped));
            }
        }

        let counts = self
            .repo
            .count_calls_by_status(campaign.id, &[CallStatus::Pending, CallStatus::Running])
            .await?;
        let paused = campaign.is_paused();

        if paused && counts.running == 0 {
            debug!(
                "Campaign {} paused with nothing in flight, checking again in {:?}",
                campaign.id, self.config.paused_check_interval
            );
            return Ok(CycleOutcome::Continue(self.config.paused_check_interval));
        }

        if !paused && counts.backlog() == 0 {
            self.repo
                .update_campaign(campaign.id, &CampaignUpdate::completed(Utc::now()))
                .await?;
            info!("Campaign {} has no calls left, marked completed", campaign.id);
            return Ok(CycleOutcome::Exit(LoopState::Completed));
        }

        if !paused {
            self.dispatch(counts.running).await?;
        }
        self.poll().await?;

        Ok(CycleOutcome::Continue(self.config.poll_interval))
    }

    /// Trigger pending calls, oldest first, up to the available capacity.
    async fn dispatch(&self, running: usize) -> Result<()> {
        let capacity = self
            .config
            .trigger_capacity(running, self.backoff.consecutive_errors);
        if capacity == 0 {
            debug!("No trigger capacity ({} running)", running);
            return Ok(());
        }

        let pending = self.repo.list_pending_calls(self.campaign_id, capacity).await?;
        for call in &pending {
            if self.cancel.is_cancelled() {
                info!("Stop requested, leaving remaining calls pending");
                break;
            }
            self.trigger_call(call).await?;
        }

        Ok(())
    }

    async fn trigger_call(&self, call: &Call) -> Result<()> {
        let request = match build_trigger_request(call) {
            Ok(request) => request,
            Err(e) => return self.fail_trigger(call, &e).await,
        };

        self.repo
            .update_call(call.id, &CallUpdate::triggering(Utc::now()))
            .await?;

        let run = match self.provider.trigger(request).await {
            Ok(run) => run,
            Err(e) => return self.fail_trigger(call, &e).await,
        };

        if let Err(e) = self.repo.update_call(call.id, &CallUpdate::running(run.run_id.clone())).await {
            // The provider is already dialing; the call must never be sent again
            error!("Failed to record run {} for call {}: {}", run.run_id, call.id, e);
            let message = format!("Provider accepted run {} but recording it failed: {}", run.run_id, e);
            let update = CallUpdate {
                run_id: Some(run.run_id.clone()),
                ..CallUpdate::failed(message, Utc::now())
            };
            if let Err(e2) = self.repo.update_call(call.id, &update).await {
                error!("Failed to mark call {} failed, leaving it to the reaper: {}", call.id, e2);
            } else {
                stats::update(&self.stats, |s| s.failed());
            }
            return Err(e);
        }

        stats::update(&self.stats, |s| s.triggered());
        info!("Triggered call {} as run {}", call.id, run.run_id);
        Ok(())
    }

    async fn fail_trigger(&self, call: &Call, e: &ProviderError) -> Result<()> {
        warn!(
            "Trigger failed for call {} ({}): {}",
            call.id,
            if e.is_retryable() { "transient" } else { "permanent" },
            e
        );
        self.repo
            .update_call(call.id, &CallUpdate::failed(e.to_string(), Utc::now()))
            .await?;
        stats::update(&self.stats, |s| s.failed());
        Ok(())
    }

    /// Poll every in-flight call once.
    async fn poll(&self) -> Result<()> {
        let running = self.repo.list_running_calls(self.campaign_id).await?;

        for call in &running {
            let Some(run_id) = call.run_id.as_deref() else {
                continue;
            };
            if self.cancel.is_cancelled() {
                break;
            }

            match self.provider.poll_status(run_id).await {
                PollOutcome::NotFound => {
                    warn!("Provider lost run {} for call {}", run_id, call.id);
                    let message = format!("Provider has no record of run {}", run_id);
                    let update = CallUpdate::failed(message, Utc::now()).with_outcome(OutcomeCode::CallLostByProvider);
                    self.repo.update_call(call.id, &update).await?;
                    stats::update(&self.stats, |s| s.failed());
                }
                PollOutcome::Unavailable(reason) => {
                    debug!("Poll for run {} unavailable: {}", run_id, reason);
                }
                PollOutcome::Response(response) => match ProviderRunStatus::from_response(&response) {
                    ProviderRunStatus::InProgress => {}
                    ProviderRunStatus::Terminal(status) => self.finish_call(call, status, &response).await?,
                },
            }
        }

        Ok(())
    }

    async fn finish_call(&self, call: &Call, status: CallStatus, response: &Value) -> Result<()> {
        let classification = self.classifier.classify(response, status);
        let raw = cap_raw_response(&response.to_string(), self.config.raw_response_max_bytes);

        let update = CallUpdate {
            status: Some(status),
            completed_at: Some(Utc::now()),
            outcome: Some(classification.outcome),
            duration_secs: classification.duration_secs,
            summary: classification.summary,
            raw_response: Some(raw),
            ..Default::default()
        };
        self.repo.update_call(call.id, &update).await?;

        stats::update(&self.stats, |s| {
            if status == CallStatus::Completed {
                s.completed();
            } else {
                s.failed();
            }
        });
        info!("Call {} finished {} with outcome {}", call.id, status, classification.outcome.as_str());
        Ok(())
    }
}

/// Truncate a raw response to at most `max_bytes`, on a char boundary.
pub fn cap_raw_response(raw: &str, max_bytes: usize) -> String {
    if raw.len() <= max_bytes {
        return raw.to_string();
    }
    let mut end = max_bytes;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    raw[..end].to_string()
}
