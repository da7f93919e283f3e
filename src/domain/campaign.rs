//! Campaign record and status
//!
//! A campaign is one bulk-calling effort over an imported debtor list.
//! At most one campaign is active system-wide at any time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Campaign identifier as assigned by the store
pub type CampaignId = i64;

/// A bulk-calling campaign
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,

    /// Exactly one campaign carries this flag at a time
    pub active: bool,

    /// Operator pause; dispatch halts but in-flight calls keep polling
    pub paused: bool,

    pub status: CampaignStatus,

    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    /// Whether dispatch of new calls is halted for this campaign.
    pub fn is_paused(&self) -> bool {
        self.paused || self.status == CampaignStatus::Paused
    }
}

/// Campaign lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Active,
    Paused,
    Completed,
    Archived,
}

impl CampaignStatus {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Active => "ACTIVE",
            CampaignStatus::Paused => "PAUSED",
            CampaignStatus::Completed => "COMPLETED",
            CampaignStatus::Archived => "ARCHIVED",
        }
    }

    /// Parse the stored string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(CampaignStatus::Active),
            "PAUSED" => Some(CampaignStatus::Paused),
            "COMPLETED" => Some(CampaignStatus::Completed),
            "ARCHIVED" => Some(CampaignStatus::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Partial update applied to a campaign row. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CampaignUpdate {
    pub status: Option<CampaignStatus>,
    pub active: Option<bool>,
    pub paused: Option<bool>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CampaignUpdate {
    /// Update that marks a campaign as finished.
    pub fn completed(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(CampaignStatus::Completed),
            completed_at: Some(at),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign(paused: bool, status: CampaignStatus) -> Campaign {
        Campaign {
            id: 1,
            name: "Spring reminders".to_string(),
            active: true,
            paused,
            status,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_campaign_status_round_trip_strings() {
        for status in [
            CampaignStatus::Active,
            CampaignStatus::Paused,
            CampaignStatus::Completed,
            CampaignStatus::Archived,
        ] {
            assert_eq!(CampaignStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CampaignStatus::parse("active"), None);
    }

    #[test]
    fn test_is_paused_from_flag_or_status() {
        assert!(!campaign(false, CampaignStatus::Active).is_paused());
        assert!(campaign(true, CampaignStatus::Active).is_paused());
        assert!(campaign(false, CampaignStatus::Paused).is_paused());
    }

    #[test]
    fn test_completed_update() {
        let now = Utc::now();
        let update = CampaignUpdate::completed(now);
        assert_eq!(update.status, Some(CampaignStatus::Completed));
        assert_eq!(update.completed_at, Some(now));
        assert!(update.active.is_none());
        assert!(!update.is_empty());
        assert!(CampaignUpdate::default().is_empty());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&CampaignStatus::Completed).unwrap();
        assert_eq!(json, "\"COMPLETED\"");
    }
}
