//! Stale-call reaper.
//!
//! A call stuck in RUNNING past the stale timeout is assumed lost: the
//! provider never reported a terminal state. The reaper resolves such calls
//! as FAILED with `SYSTEM_TIMEOUT` so they stop occupying capacity. A
//! PENDING call whose trigger went out without its run id being recorded
//! is resolved the same way, since it must never be dialed again.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::domain::{CallUpdate, OutcomeCode};
use crate::error::Result;
use crate::store::CallRepository;

/// Resolves RUNNING calls older than a timeout.
pub struct StaleCallReaper<R: CallRepository + ?Sized> {
    repo: Arc<R>,
    timeout: Duration,
}

impl<R: CallRepository + ?Sized> StaleCallReaper<R> {
    pub fn new(repo: Arc<R>, timeout: Duration) -> Self {
        Self { repo, timeout }
    }

    /// Calls in flight since before this instant are stale.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let timeout = chrono::Duration::from_std(self.timeout).unwrap_or(chrono::Duration::MAX);
        now.checked_sub_signed(timeout).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Run one pass.
    ///
    /// Returns the number of calls marked FAILED.
    pub async fn reap(&self, now: DateTime<Utc>) -> Result<usize> {
        let stale = self.repo.list_stale_running_calls(self.cutoff(now)).await?;

        if stale.is_empty() {
            debug!("Reaper: no stale calls");
            return Ok(0);
        }

        info!("Found {} stale running calls to reap", stale.len());

        for call in &stale {
            let message = format!(
                "No terminal status from provider within {}s (run {}, in flight since {})",
                self.timeout.as_secs(),
                call.run_id.as_deref().unwrap_or("unknown"),
                call.in_flight_since().to_rfc3339(),
            );
            let update = CallUpdate::failed(message, now).with_outcome(OutcomeCode::SystemTimeout);
            self.repo.update_call(call.id, &update).await?;
            info!("Reaped stale call {} (campaign {})", call.id, call.campaign_id);
        }

        Ok(stale.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CallStatus;
    use crate::store::SqliteRepository;

    fn setup() -> (Arc<SqliteRepository>, i64, i64) {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let campaign = repo.create_campaign("reaper").unwrap();
        repo.activate_campaign(campaign.id).unwrap();
        let debtor = repo.create_debtor("Alan Turing", "+441234", None).unwrap();
        (Arc::new(repo), campaign.id, debtor)
    }

    async fn running_since(repo: &SqliteRepository, campaign: i64, debtor: i64, since: DateTime<Utc>) -> i64 {
        let call = repo.enqueue_call(campaign, debtor, 1).unwrap();
        repo.update_call(call.id, &CallUpdate::triggering(since)).await.unwrap();
        repo.update_call(call.id, &CallUpdate::running(format!("run-{}", call.id)))
            .await
            .unwrap();
        call.id
    }

    #[test]
    fn test_cutoff() {
        let repo = Arc::new(SqliteRepository::open_in_memory().unwrap());
        let reaper = StaleCallReaper::new(repo, Duration::from_secs(900));
        let now = Utc::now();
        assert_eq!(now - reaper.cutoff(now), chrono::Duration::minutes(15));
    }

    #[tokio::test]
    async fn test_reap_marks_stale_calls_failed() {
        let (repo, campaign, debtor) = setup();
        let now = Utc::now();
        let stale = running_since(&repo, campaign, debtor, now - chrono::Duration::minutes(20)).await;
        let fresh = running_since(&repo, campaign, debtor, now - chrono::Duration::minutes(5)).await;

        let reaper = StaleCallReaper::new(repo.clone(), Duration::from_secs(15 * 60));
        assert_eq!(reaper.reap(now).await.unwrap(), 1);

        let reaped = repo.get_call(stale).unwrap().unwrap();
        assert_eq!(reaped.status, CallStatus::Failed);
        assert_eq!(reaped.outcome, Some(OutcomeCode::SystemTimeout));
        assert!(reaped.error_message.unwrap().contains("900s"));
        assert!(reaped.completed_at.is_some());

        let untouched = repo.get_call(fresh).unwrap().unwrap();
        assert_eq!(untouched.status, CallStatus::Running);
        assert!(untouched.outcome.is_none());
    }

    #[tokio::test]
    async fn test_reap_is_idempotent() {
        let (repo, campaign, debtor) = setup();
        let now = Utc::now();
        running_since(&repo, campaign, debtor, now - chrono::Duration::hours(2)).await;

        let reaper = StaleCallReaper::new(repo, Duration::from_secs(60));
        assert_eq!(reaper.reap(now).await.unwrap(), 1);
        assert_eq!(reaper.reap(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reap_ignores_pending() {
        let (repo, campaign, debtor) = setup();
        let pending = repo.enqueue_call(campaign, debtor, 1).unwrap();

        let reaper = StaleCallReaper::new(repo.clone(), Duration::ZERO);
        let later = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(reaper.reap(later).await.unwrap(), 0);
        assert_eq!(repo.get_call(pending.id).unwrap().unwrap().status, CallStatus::Pending);
    }
}
