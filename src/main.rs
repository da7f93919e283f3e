use chrono::Utc;
use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dialer::classify::OutcomeClassifier;
use dialer::dispatcher::{DispatcherStatus, DispatcherSupervisor, LoopState, StaleCallReaper};
use dialer::domain::CallStatus;
use dialer::provider::HttpProviderClient;
use dialer::store::{CallRepository, SqliteRepository};

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

const ALL_STATUSES: [CallStatus; 5] = [
    CallStatus::Pending,
    CallStatus::Running,
    CallStatus::Completed,
    CallStatus::Failed,
    CallStatus::Canceled,
];

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dialer")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("dialer.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::new();
    match std::env::var("RUST_LOG") {
        Ok(filters) => builder.parse_filters(&filters),
        Err(_) => builder.parse_filters(level.unwrap_or("info")),
    };
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn open_repository(config: &Config) -> Result<SqliteRepository> {
    let path = config.storage.resolved_path();
    SqliteRepository::open_at(&path).context(format!("Failed to open database {}", path.display()))
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run { concurrency } => handle_run_command(cli, config, *concurrency).await,
        Commands::Status { campaign } => handle_status_command(config, *campaign).await,
        Commands::Reap { timeout_secs } => handle_reap_command(config, *timeout_secs).await,
        Commands::Classify { file, status } => handle_classify_command(file, (*status).into()),
    }
}

async fn handle_run_command(cli: &Cli, config: &Config, concurrency: Option<usize>) -> Result<()> {
    let mut dispatch = config.dispatcher.to_dispatcher_config();
    if let Some(n) = concurrency {
        dispatch.concurrency = n;
    }
    info!("Running dispatcher with concurrency {}", dispatch.concurrency);

    let repo = Arc::new(open_repository(config)?);
    let provider = Arc::new(
        HttpProviderClient::new(config.provider.to_http_config()).context("Failed to create provider client")?,
    );
    let supervisor = DispatcherSupervisor::new(repo, provider, dispatch);

    let response = supervisor.start().await.context("Failed to start dispatcher")?;
    if !response.started {
        println!("{} {}", "Not started:".yellow(), response.message);
        return Ok(());
    }
    println!("{} {}", "Started:".green(), response.message);

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut stop_sent = false;
    let status = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c(), if !stop_sent => {
                println!("{}", "Stopping after the current step...".yellow());
                supervisor.request_stop().await;
                stop_sent = true;
            }
            _ = ticker.tick() => {
                let status = supervisor.status().await;
                if !status.running {
                    break status;
                }
                if cli.is_verbose() {
                    print_progress(&status);
                }
            }
        }
    };

    print_progress(&status);
    match status.stats.state {
        LoopState::Aborted => Err(eyre!(
            "Dispatcher aborted: {}",
            status.stats.last_error.as_deref().unwrap_or("unknown error")
        )),
        state => {
            println!("{} {}", "Finished:".green(), state);
            Ok(())
        }
    }
}

fn print_progress(status: &DispatcherStatus) {
    let stats = &status.stats;
    let health = if status.healthy { "healthy".green() } else { "degraded".red() };
    println!(
        "[{}] {} cycles={} triggered={} completed={} failed={} reaped={} errors={}",
        stats.state,
        health,
        stats.cycles,
        stats.total_triggered,
        stats.total_completed,
        stats.total_failed,
        stats.total_reaped,
        stats.consecutive_errors,
    );
}

async fn handle_status_command(config: &Config, campaign_id: Option<i64>) -> Result<()> {
    let repo = open_repository(config)?;

    let campaign = match campaign_id {
        Some(id) => repo.get_campaign(id)?,
        None => repo.find_active_campaign().await?,
    };
    let Some(campaign) = campaign else {
        println!("{}", "No campaign found".yellow());
        return Ok(());
    };

    let counts = repo.count_calls_by_status(campaign.id, &ALL_STATUSES).await?;

    println!("{} {} ({})", "Campaign:".cyan(), campaign.name, campaign.id);
    println!("  Status:    {}", campaign.status.as_str());
    println!("  Active:    {}", campaign.active);
    println!("  Paused:    {}", campaign.is_paused());
    if let Some(started) = campaign.started_at {
        println!("  Started:   {}", started.to_rfc3339());
    }
    if let Some(completed) = campaign.completed_at {
        println!("  Completed: {}", completed.to_rfc3339());
    }
    println!("{}", "Calls:".cyan());
    for status in ALL_STATUSES {
        println!("  {:<10} {}", status.as_str(), counts.get(status));
    }
    Ok(())
}

async fn handle_reap_command(config: &Config, timeout_secs: Option<u64>) -> Result<()> {
    let repo = Arc::new(open_repository(config)?);
    let timeout = timeout_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.dispatcher.to_dispatcher_config().stale_call_timeout);

    let reaper = StaleCallReaper::new(repo, timeout);
    let reaped = reaper.reap(Utc::now()).await.context("Reaper pass failed")?;
    println!("{} {} stale calls", "Reaped:".green(), reaped);
    Ok(())
}

fn handle_classify_command(file: &Path, terminal: CallStatus) -> Result<()> {
    let content = fs::read_to_string(file).context(format!("Failed to read {}", file.display()))?;
    let response: serde_json::Value = serde_json::from_str(&content).context("Response is not valid JSON")?;

    let classification = OutcomeClassifier::default().classify(&response, terminal);
    println!("{}", serde_json::to_string_pretty(&classification)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Logging level may come from the config, so it is set up second
    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
