use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dialer::dispatcher::DispatcherConfig;
use dialer::provider::{DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL, HttpProviderConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub dispatcher: DispatchSettings,
    pub provider: ProviderSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    pub paused_check_interval_ms: u64,
    pub max_consecutive_errors: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub degraded_error_threshold: u32,
    pub degraded_batch_cap: usize,
    pub stale_call_timeout_secs: u64,
    pub reaper_every_cycles: u64,
    pub raw_response_max_bytes: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        let defaults = DispatcherConfig::default();
        Self {
            concurrency: defaults.concurrency,
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            paused_check_interval_ms: defaults.paused_check_interval.as_millis() as u64,
            max_consecutive_errors: defaults.max_consecutive_errors,
            base_backoff_ms: defaults.base_backoff.as_millis() as u64,
            max_backoff_ms: defaults.max_backoff.as_millis() as u64,
            degraded_error_threshold: defaults.degraded_error_threshold,
            degraded_batch_cap: defaults.degraded_batch_cap,
            stale_call_timeout_secs: defaults.stale_call_timeout.as_secs(),
            reaper_every_cycles: defaults.reaper_every_cycles,
            raw_response_max_bytes: defaults.raw_response_max_bytes,
        }
    }
}

impl DispatchSettings {
    pub fn to_dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            concurrency: self.concurrency,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            paused_check_interval: Duration::from_millis(self.paused_check_interval_ms),
            max_consecutive_errors: self.max_consecutive_errors.max(1),
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            degraded_error_threshold: self.degraded_error_threshold,
            degraded_batch_cap: self.degraded_batch_cap,
            stale_call_timeout: Duration::from_secs(self.stale_call_timeout_secs),
            reaper_every_cycles: self.reaper_every_cycles.max(1),
            raw_response_max_bytes: self.raw_response_max_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key_env: String,
    pub agent_id: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            agent_id: None,
            timeout_ms: 30000,
        }
    }
}

impl ProviderSettings {
    pub fn to_http_config(&self) -> HttpProviderConfig {
        HttpProviderConfig {
            base_url: self.base_url.clone(),
            agent_id: self.agent_id.clone(),
            api_key_env: self.api_key_env.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Empty means `<data_local_dir>/dialer/dialer.db`
    pub database_path: String,
}

impl StorageSettings {
    /// Database path with a leading `~` expanded
    pub fn resolved_path(&self) -> PathBuf {
        if self.database_path.is_empty() {
            return dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(env!("CARGO_PKG_NAME"))
                .join("dialer.db");
        }
        match self.database_path.strip_prefix("~/") {
            Some(rest) => dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(rest),
            None => PathBuf::from(&self.database_path),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            dispatcher: DispatchSettings::default(),
            provider: ProviderSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain, then apply `DIALER_*` overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_overrides_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply `DIALER_*` overrides using the given variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, value: String) -> Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            value.trim().parse::<T>().context(format!("Invalid value for {}: {}", key, value))
        }

        let d = &mut self.dispatcher;
        if let Some(v) = lookup("DIALER_CONCURRENCY") {
            d.concurrency = parsed("DIALER_CONCURRENCY", v)?;
        }
        if let Some(v) = lookup("DIALER_POLL_INTERVAL_MS") {
            d.poll_interval_ms = parsed("DIALER_POLL_INTERVAL_MS", v)?;
        }
        if let Some(v) = lookup("DIALER_PAUSED_CHECK_INTERVAL_MS") {
            d.paused_check_interval_ms = parsed("DIALER_PAUSED_CHECK_INTERVAL_MS", v)?;
        }
        if let Some(v) = lookup("DIALER_MAX_CONSECUTIVE_ERRORS") {
            d.max_consecutive_errors = parsed("DIALER_MAX_CONSECUTIVE_ERRORS", v)?;
        }
        if let Some(v) = lookup("DIALER_STALE_CALL_TIMEOUT_SECS") {
            d.stale_call_timeout_secs = parsed("DIALER_STALE_CALL_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("DIALER_REAPER_EVERY_CYCLES") {
            d.reaper_every_cycles = parsed("DIALER_REAPER_EVERY_CYCLES", v)?;
        }
        if let Some(v) = lookup("DIALER_PROVIDER_URL") {
            self.provider.base_url = v;
        }
        if let Some(v) = lookup("DIALER_PROVIDER_AGENT_ID") {
            self.provider.agent_id = Some(v);
        }
        if let Some(v) = lookup("DIALER_DATABASE") {
            self.storage.database_path = v;
        }
        Ok(())
    }
}
