use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Content selection settings used by browse-style functions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseConfig {
    /// Sort key passed to the content source.
    #[serde(default = "default_sort")]
    pub sort: String,
    /// Candidates per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Consecutive misses before the loop gives up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Oracle answer meaning "nothing interesting on this page".
    #[serde(default = "default_none_token")]
    pub none_token: String,
}

fn default_sort() -> String {
    "READS".to_string()
}

fn default_page_size() -> u32 {
    5
}

fn default_max_attempts() -> u32 {
    15
}

fn default_none_token() -> String {
    "none".to_string()
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            sort: default_sort(),
            page_size: default_page_size(),
            max_attempts: default_max_attempts(),
            none_token: default_none_token(),
        }
    }
}

/// Scheduler and worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Concurrent agent cycles.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Capacity of the fired-job queue between dispatcher and workers.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Persist pending jobs so they survive restarts.
    #[serde(default)]
    pub durable_jobs: bool,
    /// Seconds between polls of the admin control queue.
    #[serde(default = "default_control_poll_secs")]
    pub control_poll_secs: u64,
    #[serde(default)]
    pub browse: BrowseConfig,
}

fn default_workers() -> usize {
    8
}

fn default_queue_capacity() -> usize {
    256
}

fn default_control_poll_secs() -> u64 {
    2
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            durable_jobs: false,
            control_poll_secs: default_control_poll_secs(),
            browse: BrowseConfig::default(),
        }
    }
}

/// Content platform endpoints and client credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_server_uri")]
    pub server_uri: String,
    /// Client-credentials token endpoint.
    #[serde(default = "default_login_uri")]
    pub login_uri: String,
    /// Agent (user) login endpoint.
    #[serde(default = "default_agent_login_uri")]
    pub agent_login_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_server_uri() -> String {
    "http://127.0.0.1:8080/api".to_string()
}

fn default_login_uri() -> String {
    "http://127.0.0.1:8080/oauth2/token".to_string()
}

fn default_agent_login_uri() -> String {
    "http://127.0.0.1:8080/api/login".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            server_uri: default_server_uri(),
            login_uri: default_login_uri(),
            agent_login_uri: default_agent_login_uri(),
            client_id: String::new(),
            client_secret: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Chat-completions oracle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_oracle_uri")]
    pub api_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_oracle_uri() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_max_tokens() -> u32 {
    256
}

fn default_temperature() -> f32 {
    0.5
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_uri: default_oracle_uri(),
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path (defaults to ~/.pinbot/pinbot.db).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

/// Top-level pinbot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PinbotConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl PinbotConfig {
    /// Fill secrets from the environment when the file leaves them out.
    pub fn apply_env(&mut self) {
        if self.platform.client_secret.is_none() {
            self.platform.client_secret = std::env::var("PINBOT_CLIENT_SECRET").ok();
        }
        if self.oracle.api_key.is_none() {
            self.oracle.api_key = std::env::var("PINBOT_ORACLE_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok();
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.workers == 0 {
            return Err(ConfigError::Invalid("engine.workers must be at least 1".into()));
        }
        if self.engine.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "engine.queue_capacity must be at least 1".into(),
            ));
        }
        if self.engine.control_poll_secs == 0 {
            return Err(ConfigError::Invalid(
                "engine.control_poll_secs must be at least 1".into(),
            ));
        }
        if self.engine.browse.page_size == 0 {
            return Err(ConfigError::Invalid(
                "engine.browse.page_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the database path, defaulting into the config directory.
    pub fn db_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.db_path {
            Some(path) => Ok(path.clone()),
            None => Ok(ensure_config_dir()?.join("pinbot.db")),
        }
    }
}

/// Resolve the pinbot config directory (~/.pinbot/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".pinbot"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.pinbot/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from the default path, falling back to defaults.
pub fn load_config() -> Result<PinbotConfig, ConfigError> {
    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<PinbotConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        json5::from_str(&content)?
    } else {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        PinbotConfig::default()
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

/// Ensure the config directory exists.
pub fn ensure_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = config_dir()?;
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}
