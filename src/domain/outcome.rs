//! Call outcome codes.
//!
//! Normalized classification of how a call ended.

use serde::{Deserialize, Serialize};

/// Outcome of a single call attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeCode {
    PaymentPromised,
    Declined,
    NoAnswer,
    Voicemail,
    WrongNumber,
    CallbackRequested,
    Disputed,
    SystemCanceled,
    /// Terminal response carried no recognizable classification
    CompletedUnknown,
    /// Zero-length call that ended without a classification
    ConnectFailed,
    /// Provider no longer knows a run it accepted earlier
    CallLostByProvider,
    /// Force-resolved by the stale-call reaper
    SystemTimeout,
}

impl OutcomeCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeCode::PaymentPromised => "PAYMENT_PROMISED",
            OutcomeCode::Declined => "DECLINED",
            OutcomeCode::NoAnswer => "NO_ANSWER",
            OutcomeCode::Voicemail => "VOICEMAIL",
            OutcomeCode::WrongNumber => "WRONG_NUMBER",
            OutcomeCode::CallbackRequested => "CALLBACK_REQUESTED",
            OutcomeCode::Disputed => "DISPUTED",
            OutcomeCode::SystemCanceled => "SYSTEM_CANCELED",
            OutcomeCode::CompletedUnknown => "COMPLETED_UNKNOWN",
            OutcomeCode::ConnectFailed => "CONNECT_FAILED",
            OutcomeCode::CallLostByProvider => "CALL_LOST_BY_PROVIDER",
            OutcomeCode::SystemTimeout => "SYSTEM_TIMEOUT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let code = match s {
            "PAYMENT_PROMISED" => OutcomeCode::PaymentPromised,
            "DECLINED" => OutcomeCode::Declined,
            "NO_ANSWER" => OutcomeCode::NoAnswer,
            "VOICEMAIL" => OutcomeCode::Voicemail,
            "WRONG_NUMBER" => OutcomeCode::WrongNumber,
            "CALLBACK_REQUESTED" => OutcomeCode::CallbackRequested,
            "DISPUTED" => OutcomeCode::Disputed,
            "SYSTEM_CANCELED" => OutcomeCode::SystemCanceled,
            "COMPLETED_UNKNOWN" => OutcomeCode::CompletedUnknown,
            "CONNECT_FAILED" => OutcomeCode::ConnectFailed,
            "CALL_LOST_BY_PROVIDER" => OutcomeCode::CallLostByProvider,
            "SYSTEM_TIMEOUT" => OutcomeCode::SystemTimeout,
            _ => return None,
        };
        Some(code)
    }
}

impl std::fmt::Display for OutcomeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
