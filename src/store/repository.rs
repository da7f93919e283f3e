//! Call repository contract consumed by the dispatcher.
//!
//! The repository is the single source of truth for campaign and call state;
//! the dispatcher holds no authoritative state of its own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Call, CallCounts, CallId, CallStatus, Campaign, CampaignId, CampaignUpdate, CallUpdate};
use crate::error::Result;

/// Read/write access to campaign and call rows.
#[async_trait]
pub trait CallRepository: Send + Sync {
    /// The single campaign currently flagged active, if any.
    async fn find_active_campaign(&self) -> Result<Option<Campaign>>;

    /// Count a campaign's calls for each requested status. Statuses not
    /// requested are reported as zero.
    async fn count_calls_by_status(&self, campaign_id: CampaignId, statuses: &[CallStatus]) -> Result<CallCounts>;

    /// Oldest-first PENDING calls that were never sent to the provider,
    /// with debtor and invoices attached.
    async fn list_pending_calls(&self, campaign_id: CampaignId, limit: usize) -> Result<Vec<Call>>;

    /// All RUNNING calls of a campaign.
    async fn list_running_calls(&self, campaign_id: CampaignId) -> Result<Vec<Call>>;

    /// RUNNING calls (any campaign) in flight since before `cutoff`,
    /// measured from trigger time or, lacking that, last update. PENDING
    /// calls that already carry a trigger time are included: their trigger
    /// went out but the run id was never recorded.
    async fn list_stale_running_calls(&self, cutoff: DateTime<Utc>) -> Result<Vec<Call>>;

    async fn update_call(&self, id: CallId, update: &CallUpdate) -> Result<()>;

    async fn update_campaign(&self, id: CampaignId, update: &CampaignUpdate) -> Result<()>;
}
