//! Call dispatcher - the loop that turns a backlog of calls into provider runs
//!
//! This module provides:
//! - DispatcherConfig: concurrency, intervals, backoff and reaper tuning
//! - Dispatcher: the per-campaign trigger/poll loop
//! - DispatcherSupervisor: start/stop/status surface, one loop per campaign
//! - StaleCallReaper: resolves calls stuck in RUNNING
//! - build_trigger_request: provider payload from a call and its debtor

pub mod backoff;
pub mod config;
pub mod payload;
pub mod reaper;
pub mod runner;
pub mod stats;
pub mod supervisor;

pub use backoff::ErrorBackoff;
pub use config::DispatcherConfig;
pub use payload::build_trigger_request;
pub use reaper::StaleCallReaper;
pub use runner::{CycleOutcome, Dispatcher, cap_raw_response};
pub use stats::{DispatcherStats, LoopState, SharedStats};
pub use supervisor::{DispatcherStatus, DispatcherSupervisor, StartResponse, StopResponse};
