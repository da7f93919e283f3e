//! Field-name and keyword tables driving the outcome classifier.
//!
//! Providers embed result data under varying field names, so the tables are
//! plain data and can be swapped per provider without touching the traversal.

use crate::domain::OutcomeCode;

/// Default recursion limit for nested responses
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Keyword rule: any keyword matching (case-insensitive substring) yields `code`.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordRule {
    pub code: OutcomeCode,
    pub keywords: Vec<String>,
}

impl KeywordRule {
    pub fn new(code: OutcomeCode, keywords: &[&str]) -> Self {
        Self {
            code,
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }
}

/// Tables consulted by [`OutcomeClassifier`](super::OutcomeClassifier).
#[derive(Debug, Clone)]
pub struct ClassifierTables {
    /// Candidate classification fields, in priority order
    pub outcome_fields: Vec<String>,
    /// Candidate summary fields, in priority order
    pub summary_fields: Vec<String>,
    /// Candidate duration fields holding seconds
    pub duration_fields: Vec<String>,
    /// Candidate duration fields holding milliseconds
    pub duration_ms_fields: Vec<String>,
    /// Keyword rules, first match wins
    pub rules: Vec<KeywordRule>,
    pub max_depth: usize,
}

fn owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

impl Default for ClassifierTables {
    fn default() -> Self {
        Self {
            outcome_fields: owned(&[
                "outcome",
                "call_outcome",
                "disposition",
                "classification",
                "result",
                "call_result",
                "end_reason",
                "ended_reason",
            ]),
            summary_fields: owned(&["summary", "call_summary", "transcript_summary", "notes"]),
            duration_fields: owned(&[
                "duration",
                "duration_seconds",
                "duration_secs",
                "durationSeconds",
                "call_duration",
                "call_length",
            ]),
            duration_ms_fields: owned(&["duration_ms", "durationMs"]),
            rules: vec![
                KeywordRule::new(OutcomeCode::PaymentPromised, &["promise", "will pay"]),
                KeywordRule::new(OutcomeCode::Declined, &["decline", "refuse"]),
                KeywordRule::new(OutcomeCode::NoAnswer, &["no answer", "no_answer", "not reached"]),
                KeywordRule::new(OutcomeCode::Voicemail, &["voicemail", "voice mail"]),
                KeywordRule::new(OutcomeCode::WrongNumber, &["wrong number", "wrong_number", "invalid"]),
                KeywordRule::new(OutcomeCode::CallbackRequested, &["callback", "call back"]),
                KeywordRule::new(OutcomeCode::Disputed, &["dispute"]),
                KeywordRule::new(OutcomeCode::SystemCanceled, &["cancel"]),
            ],
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ClassifierTables {
    /// Map free text to an outcome code using the keyword rules.
    pub fn match_keywords(&self, text: &str) -> Option<OutcomeCode> {
        let lowered = text.to_lowercase();
        self.rules.iter().find(|rule| rule.matches(&lowered)).map(|rule| rule.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_matching_is_case_insensitive() {
        let tables = ClassifierTables::default();
        assert_eq!(tables.match_keywords("Reached VOICEMAIL"), Some(OutcomeCode::Voicemail));
        assert_eq!(tables.match_keywords("Customer Will Pay Friday"), Some(OutcomeCode::PaymentPromised));
        assert_eq!(tables.match_keywords("hello"), None);
    }

    #[test]
    fn test_rule_order_decides_overlaps() {
        let tables = ClassifierTables::default();
        // "promise" is declared before "dispute"
        assert_eq!(
            tables.match_keywords("promised to pay after dispute"),
            Some(OutcomeCode::PaymentPromised)
        );
        assert_eq!(tables.match_keywords("call was cancelled"), Some(OutcomeCode::SystemCanceled));
    }

    #[test]
    fn test_custom_rules() {
        let tables = ClassifierTables {
            rules: vec![KeywordRule::new(OutcomeCode::Disputed, &["WIDERSPRUCH"])],
            ..Default::default()
        };
        assert_eq!(tables.match_keywords("Kunde erhebt Widerspruch"), Some(OutcomeCode::Disputed));
        assert_eq!(tables.match_keywords("will pay"), None);
    }
}
