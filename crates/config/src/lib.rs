//! Configuration loading, validation, and management for RustedCode.
//!
//! Loads configuration from `~/.rustedcode/config.toml` (or the file named by
//! `RUSTEDCODE_CONFIG`) with environment variable overrides. Validates all
//! settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.rustedcode/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Model provider used by the model-backed decision provider
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Event bus and trace retention
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Conversation state persistence
    #[serde(default)]
    pub state: StateConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("agent", &self.agent)
            .field("provider", &self.provider)
            .field("tools", &self.tools)
            .field("telemetry", &self.telemetry)
            .field("state", &self.state)
            .finish()
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard cap on REASONING iterations per turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Per tool call
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Replaces the built-in system prompt of the model-backed decision provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_iterations() -> u32 {
    15
}
fn default_tool_timeout_secs() -> u64 {
    60
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_timeout_secs: default_tool_timeout_secs(),
            system_prompt: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_name")]
    pub name: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_provider_name() -> String {
    "openai".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            api_key: None,
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Root for all filesystem tools. `~` is expanded.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,

    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,

    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,
}

fn default_workspace_root() -> String {
    ".".into()
}
fn default_forbidden_paths() -> Vec<String> {
    vec![
        "/etc".into(),
        "/proc".into(),
        "/sys".into(),
        "~/.ssh".into(),
        "~/.gnupg".into(),
        "~/.aws".into(),
    ]
}
fn default_max_file_bytes() -> u64 {
    1024 * 1024
}
fn default_max_search_results() -> usize {
    200
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            forbidden_paths: default_forbidden_paths(),
            max_file_bytes: default_max_file_bytes(),
            max_search_results: default_max_search_results(),
        }
    }
}

impl ToolsConfig {
    /// Workspace root with `~` expanded.
    pub fn resolved_workspace_root(&self) -> PathBuf {
        expand_home(&self.workspace_root)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Broadcast channel capacity of the event bus
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Closed traces kept for inspection
    #[serde(default = "default_retained_traces")]
    pub retained_traces: usize,

    /// Forward lifecycle events to the log
    #[serde(default = "default_true")]
    pub log_events: bool,
}

fn default_event_capacity() -> usize {
    256
}
fn default_retained_traces() -> usize {
    100
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            retained_traces: default_retained_traces(),
            log_events: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: StateBackend,

    /// Directory for the file backend. `~` is expanded.
    #[serde(default = "default_state_dir")]
    pub dir: String,
}

fn default_state_dir() -> String {
    "~/.rustedcode/conversations".into()
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::default(),
            dir: default_state_dir(),
        }
    }
}

impl StateConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        expand_home(&self.dir)
    }
}

impl AppConfig {
    /// Load configuration from `RUSTEDCODE_CONFIG` or the default path
    /// (~/.rustedcode/config.toml), then apply environment overrides:
    /// - `RUSTEDCODE_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `RUSTEDCODE_MODEL`
    /// - `RUSTEDCODE_BASE_URL`
    /// - `RUSTEDCODE_MAX_ITERATIONS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("RUSTEDCODE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_path());
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

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("RUSTEDCODE_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.provider.api_key = Some(key);
        }
        if let Some(model) = lookup("RUSTEDCODE_MODEL") {
            self.provider.model = model;
        }
        if let Some(url) = lookup("RUSTEDCODE_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(raw) = lookup("RUSTEDCODE_MAX_ITERATIONS") {
            self.agent.max_iterations = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "RUSTEDCODE_MAX_ITERATIONS must be a positive integer, got '{raw}'"
                ))
            })?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".rustedcode")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be greater than 0".into(),
            ));
        }

        if self.agent.tool_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.tool_timeout_secs must be greater than 0".into(),
            ));
        }

        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !self.provider.base_url.starts_with("http://")
            && !self.provider.base_url.starts_with("https://")
        {
            return Err(ConfigError::ValidationError(format!(
                "provider.base_url must be an http(s) URL, got '{}'",
                self.provider.base_url
            )));
        }

        if self.telemetry.event_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "telemetry.event_capacity must be greater than 0".into(),
            ));
        }

        if self.tools.max_file_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "tools.max_file_bytes must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// The effective config as TOML, with the API key removed.
    pub fn redacted_toml(&self) -> String {
        let mut config = self.clone();
        if config.provider.api_key.is_some() {
            config.provider.api_key = Some("[REDACTED]".into());
        }
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Generate a default config TOML string (for `config --default`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Expand a leading `~` to the home directory.
fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~") {
        Some(rest) => dirs_home().join(rest.trim_start_matches(['/', '\\'])),
        None => PathBuf::from(path),
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
