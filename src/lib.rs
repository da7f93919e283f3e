//! Dialer - call-queue dispatcher for bulk-calling campaigns
//!
//! Turns a backlog of pending calls into bounded, monitored invocations of an
//! external voice-call provider, tracks each call to a terminal state and
//! classifies how it ended.

pub mod classify;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod provider;
pub mod store;

pub use error::{DialerError, Result};
