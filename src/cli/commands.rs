//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: dispatch the active campaign until it completes or is stopped
//! - status: campaign and call counts from the store
//! - reap: one-shot stale-call pass
//! - classify: run the outcome classifier over a saved response

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use dialer::domain::CallStatus;

/// Dialer - call-queue dispatcher for bulk-calling campaigns
#[derive(Parser, Debug)]
#[command(name = "dialer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the dispatcher for the active campaign
    Run {
        /// Override the concurrency ceiling
        #[arg(short = 'n', long)]
        concurrency: Option<usize>,
    },

    /// Show the active (or given) campaign and its call counts
    Status {
        /// Campaign ID to inspect instead of the active one
        #[arg(long)]
        campaign: Option<i64>,
    },

    /// Fail RUNNING calls that exceeded the stale timeout
    Reap {
        /// Override the stale timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Classify a saved raw provider response
    Classify {
        /// JSON file holding the response
        file: PathBuf,

        /// Terminal status the run ended with
        #[arg(short, long, value_enum, default_value_t = TerminalArg::Completed)]
        status: TerminalArg,
    },
}

/// Terminal run status accepted by `classify`
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalArg {
    Completed,
    Failed,
    Canceled,
}

impl From<TerminalArg> for CallStatus {
    fn from(arg: TerminalArg) -> Self {
        match arg {
            TerminalArg::Completed => CallStatus::Completed,
            TerminalArg::Failed => CallStatus::Failed,
            TerminalArg::Canceled => CallStatus::Canceled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["dialer"]).is_err());
    }

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::try_parse_from(["dialer", "-v", "status"]).unwrap();
        assert!(cli.is_verbose());
    }

    #[test]
    fn test_cli_config_option() {
        let cli = Cli::try_parse_from(["dialer", "status", "-c", "/path/to/dialer.yml"]).unwrap();
        assert_eq!(cli.config.as_ref(), Some(&PathBuf::from("/path/to/dialer.yml")));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::try_parse_from(["dialer", "run", "-n", "3"]).unwrap();
        match cli.command {
            Commands::Run { concurrency } => assert_eq!(concurrency, Some(3)),
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_status_command() {
        let cli = Cli::try_parse_from(["dialer", "status", "--campaign", "4"]).unwrap();
        match cli.command {
            Commands::Status { campaign } => assert_eq!(campaign, Some(4)),
            _ => panic!("Expected status command"),
        }
    }

    #[test]
    fn test_reap_command() {
        let cli = Cli::try_parse_from(["dialer", "reap", "--timeout-secs", "60"]).unwrap();
        match cli.command {
            Commands::Reap { timeout_secs } => assert_eq!(timeout_secs, Some(60)),
            _ => panic!("Expected reap command"),
        }
    }

    #[test]
    fn test_classify_command() {
        let cli = Cli::try_parse_from(["dialer", "classify", "resp.json"]).unwrap();
        match cli.command {
            Commands::Classify { file, status } => {
                assert_eq!(file, PathBuf::from("resp.json"));
                assert_eq!(status, TerminalArg::Completed);
            }
            _ => panic!("Expected classify command"),
        }

        let cli = Cli::try_parse_from(["dialer", "classify", "resp.json", "--status", "canceled"]).unwrap();
        match cli.command {
            Commands::Classify { status, .. } => assert_eq!(CallStatus::from(status), CallStatus::Canceled),
            _ => panic!("Expected classify command"),
        }
    }

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }
}
