//! Outcome classification for terminal provider responses
//!
//! This module provides:
//! - ClassifierTables: injectable field-name and keyword tables
//! - OutcomeClassifier: depth-bounded search producing outcome, duration, summary

pub mod classifier;
pub mod tables;

pub use classifier::{Classification, OutcomeClassifier};
pub use tables::{ClassifierTables, DEFAULT_MAX_DEPTH, KeywordRule};
