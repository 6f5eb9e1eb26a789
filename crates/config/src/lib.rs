//! Configuration loading, validation, and management for Taconite.
//!
//! Loads configuration from `~/.taconite/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.taconite/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model used for new sessions
    #[serde(default = "default_model")]
    pub model: String,

    /// System prompt placed at the head of every new session
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Token budget per session
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Stream replies fragment by fragment instead of waiting for the whole text
    #[serde(default = "default_true")]
    pub stream_mode: bool,

    /// Where saved conversations are written
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,

    /// Characters per token for the default estimator
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    /// Model server settings
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Terminal presentation settings
    #[serde(default)]
    pub ui: UiConfig,

    /// REST server settings
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_model() -> String {
    "llama3.1:8b".into()
}
fn default_system_prompt() -> String {
    "You are a helpful assistant. Your name is Taconite. Be informative but concise and friendly."
        .into()
}
fn default_max_tokens() -> usize {
    4000
}
fn default_true() -> bool {
    true
}
fn default_save_dir() -> PathBuf {
    PathBuf::from("./conversations")
}
fn default_chars_per_token() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Base URL of the Ollama server
    #[serde(default = "default_inference_host")]
    pub host: String,

    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_secs: u64,

    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_secs: u64,
}

fn default_inference_host() -> String {
    "http://localhost:11434".into()
}
fn default_batch_timeout() -> u64 {
    60
}
fn default_stream_timeout() -> u64 {
    300
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            host: default_inference_host(),
            batch_timeout_secs: default_batch_timeout(),
            stream_timeout_secs: default_stream_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// Spinner frame interval while waiting for a batch reply
    #[serde(default = "default_spinner_tick")]
    pub spinner_tick_ms: u64,

    /// Pause after each streamed fragment; 0 disables it
    #[serde(default = "default_typewriter_delay")]
    pub typewriter_delay_ms: u64,
}

fn default_spinner_tick() -> u64 {
    120
}
fn default_typewriter_delay() -> u64 {
    10
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            spinner_tick_ms: default_spinner_tick(),
            typewriter_delay_ms: default_typewriter_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_port(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.taconite/config.toml).
    ///
    /// Environment variables override the file:
    /// - `OLLAMA_HOST`, `OLLAMA_MODEL`
    /// - `TACONITE_MAX_TOKENS`, `TACONITE_SAVE_DIR`
    /// - `PORT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("OLLAMA_HOST").filter(|h| !h.trim().is_empty()) {
            self.inference.host = normalize_host(&host);
        }

        if let Some(model) = lookup("OLLAMA_MODEL").filter(|m| !m.trim().is_empty()) {
            self.model = model;
        }

        if let Some(raw) = lookup("TACONITE_MAX_TOKENS") {
            self.max_tokens = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "TACONITE_MAX_TOKENS must be a positive integer, got '{raw}'"
                ))
            })?;
        }

        if let Some(dir) = lookup("TACONITE_SAVE_DIR").filter(|d| !d.trim().is_empty()) {
            self.save_dir = PathBuf::from(dir);
        }

        if let Some(raw) = lookup("PORT") {
            self.server.port = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("PORT must be a valid port, got '{raw}'"))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".taconite")
    }

    /// Get the configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "max_tokens must be greater than 0".into(),
            ));
        }

        if self.chars_per_token == 0 {
            return Err(ConfigError::ValidationError(
                "chars_per_token must be greater than 0".into(),
            ));
        }

        if self.ui.spinner_tick_ms == 0 {
            return Err(ConfigError::ValidationError(
                "ui.spinner_tick_ms must be greater than 0".into(),
            ));
        }

        if self.inference.batch_timeout_secs == 0 || self.inference.stream_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "inference timeouts must be greater than 0".into(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            system_prompt: default_system_prompt(),
            max_tokens: default_max_tokens(),
            stream_mode: true,
            save_dir: default_save_dir(),
            chars_per_token: default_chars_per_token(),
            inference: InferenceConfig::default(),
            ui: UiConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// `OLLAMA_HOST` is commonly given as `host:port`; the client needs a URL.
fn normalize_host(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for taconite_core::Error {
    fn from(err: ConfigError) -> Self {
        taconite_core::Error::Config {
            message: err.to_string(),
        }
    }
}
