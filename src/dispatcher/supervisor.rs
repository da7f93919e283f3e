//! DispatcherSupervisor owns the dispatcher loops, keyed by campaign.
//!
//! It is the surface a control layer talks to: start the loop for the active
//! campaign, request a cooperative stop, and report status.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::DispatcherConfig;
use super::runner::Dispatcher;
use super::stats::{self, DispatcherStats, LoopState, SharedStats};
use crate::classify::{ClassifierTables, OutcomeClassifier};
use crate::domain::{CampaignId, CampaignStatus};
use crate::error::Result;
use crate::provider::ProviderClient;
use crate::store::CallRepository;

/// Reply to a start request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartResponse {
    /// True only when a new loop was spawned
    pub started: bool,
    pub campaign_id: Option<CampaignId>,
    pub message: String,
}

/// Reply to a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopResponse {
    /// True when at least one running loop was signalled
    pub accepted: bool,
}

/// Snapshot of a dispatcher loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherStatus {
    pub running: bool,
    pub healthy: bool,
    pub campaign_id: Option<CampaignId>,
    pub stats: DispatcherStats,
}

struct RunHandle {
    cancel: CancellationToken,
    stats: SharedStats,
    handle: JoinHandle<LoopState>,
}

impl RunHandle {
    fn is_running(&self) -> bool {
        !self.handle.is_finished() && !stats::snapshot(&self.stats).state.is_finished()
    }
}

/// Await a loop task and record a panic as an aborted run.
async fn watch(campaign_id: CampaignId, stats: SharedStats, task: JoinHandle<LoopState>) -> LoopState {
    match task.await {
        Ok(state) => state,
        Err(e) => {
            error!("Dispatcher task for campaign {} ended abnormally: {}", campaign_id, e);
            stats::update(&stats, |s| s.abort(format!("Dispatcher task ended abnormally: {e}"), Utc::now()));
            LoopState::Aborted
        }
    }
}

struct Runs {
    by_campaign: HashMap<CampaignId, RunHandle>,
    /// Campaign of the most recent start, reported by `status()`
    latest: Option<CampaignId>,
}

/// Manages dispatcher loop lifecycle
pub struct DispatcherSupervisor<R: CallRepository + ?Sized, P: ProviderClient + ?Sized> {
    repo: Arc<R>,
    provider: Arc<P>,
    config: DispatcherConfig,
    tables: ClassifierTables,
    runs: Mutex<Runs>,
}

impl<R, P> DispatcherSupervisor<R, P>
where
    R: CallRepository + ?Sized + 'static,
    P: ProviderClient + ?Sized + 'static,
{
    pub fn new(repo: Arc<R>, provider: Arc<P>, config: DispatcherConfig) -> Self {
        Self {
            repo,
            provider,
            config,
            tables: ClassifierTables::default(),
            runs: Mutex::new(Runs {
                by_campaign: HashMap::new(),
                latest: None,
            }),
        }
    }

    /// Use custom classifier tables for every loop started from now on
    pub fn with_classifier_tables(mut self, tables: ClassifierTables) -> Self {
        self.tables = tables;
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Start the loop for the active campaign.
    ///
    /// Idempotent: while a loop for that campaign is running, nothing new is
    /// spawned and `started` is false.
    pub async fn start(&self) -> Result<StartResponse> {
        let Some(campaign) = self.repo.find_active_campaign().await? else {
            return Ok(StartResponse {
                started: false,
                campaign_id: None,
                message: "No active campaign".to_string(),
            });
        };

        if campaign.status == CampaignStatus::Completed {
            return Ok(StartResponse {
                started: false,
                campaign_id: Some(campaign.id),
                message: format!("Campaign {} is already completed", campaign.id),
            });
        }

        let mut runs = self.runs.lock().await;
        if let Some(run) = runs.by_campaign.get(&campaign.id)
            && run.is_running()
        {
            return Ok(StartResponse {
                started: false,
                campaign_id: Some(campaign.id),
                message: format!("Dispatcher already running for campaign {}", campaign.id),
            });
        }

        let cancel = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            campaign.id,
            self.repo.clone(),
            self.provider.clone(),
            self.config.clone(),
        )
        .with_classifier(OutcomeClassifier::new(self.tables.clone()))
        .with_cancel_token(cancel.clone());

        let stats = dispatcher.stats_handle();
        let handle = tokio::spawn(watch(campaign.id, stats.clone(), tokio::spawn(dispatcher.run())));

        runs.by_campaign.insert(campaign.id, RunHandle { cancel, stats, handle });
        runs.latest = Some(campaign.id);
        info!("Started dispatcher for campaign {} ({})", campaign.id, campaign.name);

        Ok(StartResponse {
            started: true,
            campaign_id: Some(campaign.id),
            message: format!("Dispatcher started for campaign {}", campaign.id),
        })
    }

    /// Ask every running loop to stop after its current step.
    pub async fn request_stop(&self) -> StopResponse {
        let runs = self.runs.lock().await;
        let mut accepted = false;
        for (campaign_id, run) in &runs.by_campaign {
            if run.is_running() {
                run.cancel.cancel();
                accepted = true;
                info!("Stop requested for dispatcher of campaign {}", campaign_id);
            }
        }
        StopResponse { accepted }
    }

    /// Status of the most recently started loop.
    pub async fn status(&self) -> DispatcherStatus {
        let runs = self.runs.lock().await;
        match runs.latest {
            Some(campaign_id) => self.describe(&runs, campaign_id),
            None => DispatcherStatus {
                running: false,
                healthy: true,
                campaign_id: None,
                stats: DispatcherStats::new(),
            },
        }
    }

    /// Status of the loop for a given campaign, if one was ever started.
    pub async fn status_of(&self, campaign_id: CampaignId) -> Option<DispatcherStatus> {
        let runs = self.runs.lock().await;
        runs.by_campaign
            .contains_key(&campaign_id)
            .then(|| self.describe(&runs, campaign_id))
    }

    /// Number of loops currently running
    pub async fn running_count(&self) -> usize {
        let runs = self.runs.lock().await;
        runs.by_campaign.values().filter(|run| run.is_running()).count()
    }

    fn describe(&self, runs: &Runs, campaign_id: CampaignId) -> DispatcherStatus {
        match runs.by_campaign.get(&campaign_id) {
            Some(run) => {
                let stats = stats::snapshot(&run.stats);
                DispatcherStatus {
                    running: run.is_running(),
                    healthy: stats.is_healthy(self.config.degraded_error_threshold),
                    campaign_id: Some(campaign_id),
                    stats,
                }
            }
            None => DispatcherStatus {
                running: false,
                healthy: true,
                campaign_id: Some(campaign_id),
                stats: DispatcherStats::new(),
            },
        }
    }
}
