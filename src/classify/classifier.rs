//! Outcome classifier over untyped provider responses.
//!
//! The provider's result shape is not contractually fixed, so the response is
//! treated as a JSON tree and searched depth-first for known field names.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::tables::ClassifierTables;
use crate::domain::{CallStatus, OutcomeCode};

/// Result of classifying one terminal provider response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub outcome: OutcomeCode,
    pub duration_secs: Option<u32>,
    pub summary: Option<String>,
}

/// Pure classifier: no I/O, no shared state.
#[derive(Debug, Clone, Default)]
pub struct OutcomeClassifier {
    tables: ClassifierTables,
}

impl OutcomeClassifier {
    pub fn new(tables: ClassifierTables) -> Self {
        Self { tables }
    }

    /// Classify a terminal response.
    ///
    /// `terminal` is the call status the provider's run status mapped to; it
    /// only matters for the zero-duration fallback.
    pub fn classify(&self, response: &Value, terminal: CallStatus) -> Classification {
        let found = self.search(response, 0, &|map| self.match_outcome(map));
        let duration_secs = self.search(response, 0, &|map| self.match_duration(map));
        let summary = self.search(response, 0, &|map| self.match_summary(map));

        let outcome = match found {
            Some(code) => code,
            None if duration_secs == Some(0)
                && matches!(terminal, CallStatus::Completed | CallStatus::Canceled) =>
            {
                OutcomeCode::ConnectFailed
            }
            None => OutcomeCode::CompletedUnknown,
        };

        Classification {
            outcome,
            duration_secs,
            summary,
        }
    }

    /// Depth-first search: check the current object first, then its children
    /// in document order. The first hit wins.
    fn search<T>(&self, value: &Value, depth: usize, matcher: &dyn Fn(&Map<String, Value>) -> Option<T>) -> Option<T> {
        if depth > self.tables.max_depth {
            return None;
        }

        match value {
            Value::Object(map) => {
                if let Some(hit) = matcher(map) {
                    return Some(hit);
                }
                map.values().find_map(|child| self.search(child, depth + 1, matcher))
            }
            Value::Array(items) => items.iter().find_map(|item| self.search(item, depth + 1, matcher)),
            _ => None,
        }
    }

    fn match_outcome(&self, map: &Map<String, Value>) -> Option<OutcomeCode> {
        self.tables.outcome_fields.iter().find_map(|field| match map.get(field.as_str()) {
            Some(Value::String(text)) => self.tables.match_keywords(text),
            _ => None,
        })
    }

    fn match_summary(&self, map: &Map<String, Value>) -> Option<String> {
        self.tables.summary_fields.iter().find_map(|field| match map.get(field.as_str()) {
            Some(Value::String(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
            _ => None,
        })
    }

    fn match_duration(&self, map: &Map<String, Value>) -> Option<u32> {
        let seconds = self
            .tables
            .duration_fields
            .iter()
            .find_map(|field| map.get(field.as_str()).and_then(as_seconds));
        if seconds.is_some() {
            return seconds;
        }

        self.tables
            .duration_ms_fields
            .iter()
            .find_map(|field| map.get(field.as_str()).and_then(as_seconds))
            .map(|ms| (ms as f64 / 1000.0).round() as u32)
    }
}

/// Read a non-negative number, or a numeric string, as whole seconds.
fn as_seconds(value: &Value) -> Option<u32> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    if raw.is_finite() && raw >= 0.0 {
        Some(raw.round().min(u32::MAX as f64) as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::KeywordRule;
    use serde_json::json;

    fn classify(response: Value, terminal: CallStatus) -> Classification {
        OutcomeClassifier::default().classify(&response, terminal)
    }

    #[test]
    fn test_classification_at_depth_two() {
        let response = json!({
            "data": {
                "analysis": { "classification": "Customer will pay next week" }
            }
        });
        let result = classify(response, CallStatus::Completed);
        assert_eq!(result.outcome, OutcomeCode::PaymentPromised);
    }

    #[test]
    fn test_empty_object_is_unknown() {
        assert_eq!(classify(json!({}), CallStatus::Completed).outcome, OutcomeCode::CompletedUnknown);
        assert_eq!(
            classify(json!({"a": {"b": {}}}), CallStatus::Failed).outcome,
            OutcomeCode::CompletedUnknown
        );
    }

    #[test]
    fn test_zero_duration_completed_is_connect_failed() {
        let result = classify(json!({"duration": 0}), CallStatus::Completed);
        assert_eq!(result.outcome, OutcomeCode::ConnectFailed);
        assert_eq!(result.duration_secs, Some(0));
    }

    #[test]
    fn test_zero_duration_canceled_is_connect_failed() {
        let result = classify(json!({"duration": 0}), CallStatus::Canceled);
        assert_eq!(result.outcome, OutcomeCode::ConnectFailed);
    }

    #[test]
    fn test_zero_duration_failed_stays_unknown() {
        let result = classify(json!({"duration": 0}), CallStatus::Failed);
        assert_eq!(result.outcome, OutcomeCode::CompletedUnknown);
    }

    #[test]
    fn test_classification_beats_zero_duration() {
        let result = classify(json!({"duration": 0, "outcome": "voicemail"}), CallStatus::Completed);
        assert_eq!(result.outcome, OutcomeCode::Voicemail);
    }

    #[test]
    fn test_field_priority_over_document_order() {
        // "result" appears first in the document but "outcome" is declared first
        let response = json!({"result": "went to voicemail", "outcome": "promised to pay"});
        assert_eq!(classify(response, CallStatus::Completed).outcome, OutcomeCode::PaymentPromised);
    }

    #[test]
    fn test_current_level_before_nested() {
        let response = json!({
            "details": { "outcome": "declined" },
            "disposition": "no answer"
        });
        assert_eq!(classify(response, CallStatus::Completed).outcome, OutcomeCode::NoAnswer);
    }

    #[test]
    fn test_unmatched_field_falls_through_to_next_field() {
        let response = json!({"outcome": "ok", "disposition": "wrong number"});
        assert_eq!(classify(response, CallStatus::Completed).outcome, OutcomeCode::WrongNumber);
    }

    #[test]
    fn test_first_branch_wins() {
        let response = json!({
            "first": { "result": "callback requested" },
            "second": { "result": "dispute" }
        });
        assert_eq!(classify(response, CallStatus::Completed).outcome, OutcomeCode::CallbackRequested);
    }

    #[test]
    fn test_searches_arrays() {
        let response = json!({
            "events": [
                { "type": "started" },
                { "type": "analysis", "disposition": "Debtor refused to pay" }
            ]
        });
        assert_eq!(classify(response, CallStatus::Completed).outcome, OutcomeCode::Declined);
    }

    #[test]
    fn test_depth_limit() {
        let mut response = json!({"outcome": "voicemail"});
        for _ in 0..11 {
            response = json!({ "nested": response });
        }
        assert_eq!(classify(response, CallStatus::Completed).outcome, OutcomeCode::CompletedUnknown);

        let mut shallow = json!({"outcome": "voicemail"});
        for _ in 0..10 {
            shallow = json!({ "nested": shallow });
        }
        assert_eq!(classify(shallow, CallStatus::Completed).outcome, OutcomeCode::Voicemail);
    }

    #[test]
    fn test_summary_and_duration_independent_of_outcome() {
        let response = json!({
            "status": "completed",
            "call": { "duration_seconds": "42.4" },
            "analysis": { "summary": "  Talked about invoice R-17.  " }
        });
        let result = classify(response, CallStatus::Completed);
        assert_eq!(result.outcome, OutcomeCode::CompletedUnknown);
        assert_eq!(result.duration_secs, Some(42));
        assert_eq!(result.summary.as_deref(), Some("Talked about invoice R-17."));
    }

    #[test]
    fn test_duration_milliseconds() {
        let result = classify(json!({"metrics": {"duration_ms": 61_500}}), CallStatus::Completed);
        assert_eq!(result.duration_secs, Some(62));
    }

    #[test]
    fn test_negative_duration_ignored() {
        let result = classify(json!({"duration": -5}), CallStatus::Completed);
        assert_eq!(result.duration_secs, None);
        assert_eq!(result.outcome, OutcomeCode::CompletedUnknown);
    }

    #[test]
    fn test_non_string_outcome_field_recurses() {
        let response = json!({"result": {"outcome": "Customer asked for a callback"}});
        assert_eq!(classify(response, CallStatus::Completed).outcome, OutcomeCode::CallbackRequested);
    }

    #[test]
    fn test_injected_tables() {
        let tables = ClassifierTables {
            outcome_fields: vec!["ergebnis".to_string()],
            rules: vec![KeywordRule::new(OutcomeCode::PaymentPromised, &["zahlt"])],
            ..Default::default()
        };
        let classifier = OutcomeClassifier::new(tables);
        let result = classifier.classify(&json!({"ergebnis": "Kunde zahlt morgen"}), CallStatus::Completed);
        assert_eq!(result.outcome, OutcomeCode::PaymentPromised);

        let ignored = classifier.classify(&json!({"outcome": "voicemail"}), CallStatus::Completed);
        assert_eq!(ignored.outcome, OutcomeCode::CompletedUnknown);
    }
}
