//! Provider client layer - the external voice-call service
//!
//! This module provides:
//! - ProviderClient trait: trigger a call, poll a run
//! - HttpProviderClient: REST implementation over reqwest
//! - MockProviderClient: scripted double for tests
//! - ProviderRunStatus: provider run states mapped to call statuses

pub mod client;
pub mod http;
pub mod mock;

pub use client::{PollOutcome, ProviderClient, ProviderError, ProviderRunStatus, TriggerRequest, TriggeredRun};
pub use http::{DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL, HttpProviderClient, HttpProviderConfig};
pub use mock::MockProviderClient;
