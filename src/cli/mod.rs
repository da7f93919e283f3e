//! CLI module for dialer - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running the
//! dispatcher, inspecting a campaign, reaping stale calls and classifying
//! saved provider responses.

pub mod commands;

pub use commands::Cli;
