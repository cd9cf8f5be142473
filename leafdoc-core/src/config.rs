//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/leafdoc/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/leafdoc/` (~/.config/leafdoc/)
//! - Data: `$XDG_DATA_HOME/leafdoc/` (~/.local/share/leafdoc/)
//! - State/Logs: `$XDG_STATE_HOME/leafdoc/` (~/.local/state/leafdoc/)
//!
//! Orchestrators never read the environment themselves; they receive the
//! sections below through their constructors.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variables consulted (in order) for the API key.
const API_KEY_ENV_VARS: &[&str] = &["LEAFDOC_API_KEY", "GEMINI_API_KEY"];

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Inference endpoint configuration
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Retry/backoff configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Conversation store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Inference endpoint configuration
#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    /// Base URL of the generative API (no trailing path)
    #[serde(default = "default_endpoint_base_url")]
    pub endpoint_base_url: String,

    /// API key (can also use env var)
    pub api_key: Option<String>,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint_base_url: default_endpoint_base_url(),
            api_key: None,
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl InferenceConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.endpoint_base_url.trim().is_empty() {
            return Err(Error::Config(
                "inference.endpoint_base_url must not be empty".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Config("inference.model must not be empty".to_string()));
        }
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(Error::Config(format!(
                "inference.api_key (or {}) is required",
                API_KEY_ENV_VARS.join("/")
            ))),
        }
    }

    /// Returns the configured HTTP timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

fn default_endpoint_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// Which failures the retry executor retries
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryMode {
    /// Every failure is treated as transient
    #[default]
    All,
    /// Only transport failures are retried; others return immediately
    TransientOnly,
}

/// Retry/backoff configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial one)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay floor before the first retry; doubles each attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound of the uniform jitter added to each delay
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,

    /// Which failures are retried
    #[serde(default)]
    pub mode: RetryMode,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
            mode: RetryMode::default(),
        }
    }
}

impl RetryConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 || self.max_attempts > 10 {
            return Err(Error::Config(
                "retry.max_attempts must be between 1 and 10".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_jitter_ms() -> u64 {
    1000
}

/// Conversation store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Application namespace used to scope conversation identities
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Number of most recent turns delivered to subscribers
    #[serde(default = "default_window")]
    pub window: usize,

    /// Override path for the SQLite database
    pub database_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            window: default_window(),
            database_path: None,
        }
    }
}

impl StoreConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(Error::Config("store.namespace must not be empty".to_string()));
        }
        if self.window == 0 {
            return Err(Error::Config("store.window must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Database path, falling back to the XDG data directory
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(Config::database_path)
    }
}

fn default_namespace() -> String {
    "leafdoc".to_string()
}

fn default_window() -> usize {
    50
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Override the API key from the environment.
    ///
    /// The first non-blank variable in `LEAFDOC_API_KEY`, `GEMINI_API_KEY`
    /// wins over the file; when neither is set the file value stays.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let from_env = API_KEY_ENV_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .find(|value| !value.trim().is_empty());
        if let Some(key) = from_env {
            self.inference.api_key = Some(key);
        }
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.inference.validate()?;
        self.retry.validate()?;
        self.store.validate()
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/leafdoc/config.toml` (~/.config/leafdoc/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("leafdoc").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("leafdoc")
    }

    /// Returns the state directory path (for logs)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("leafdoc")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/leafdoc/conversations.db`
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("conversations.db")
    }
}
