//! Domain types for the dialer
//!
//! This module contains the records the dispatcher reads and mutates:
//! - Campaign: one bulk-calling effort, with active/paused flags
//! - Call: one attempt to reach one debtor, with its own lifecycle
//! - Debtor / Invoice: read-only inputs to the trigger payload
//! - OutcomeCode: normalized classification of how a call ended

pub mod call;
pub mod campaign;
pub mod debtor;
pub mod outcome;

pub use call::{Call, CallCounts, CallId, CallStatus, CallUpdate};
pub use campaign::{Campaign, CampaignId, CampaignStatus, CampaignUpdate};
pub use debtor::{Debtor, DebtorId, Invoice};
pub use outcome::OutcomeCode;
