//! Configuration loading, validation, and management for deliberate.
//!
//! Loads configuration from `~/.deliberate/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.deliberate/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Reasoning pipeline settings
    #[serde(default)]
    pub reasoning: ReasoningConfig,

    /// Capability runtime settings
    #[serde(default)]
    pub capability_runtime: CapabilityRuntimeConfig,

    /// Declared tool-provider capabilities
    #[serde(default)]
    pub capabilities: Vec<CapabilityConfig>,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("reasoning", &self.reasoning)
            .field("capability_runtime", &self.capability_runtime)
            .field("capabilities", &self.capabilities)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Knobs for the advisor chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// Upper bound on iterative-refinement rounds per request
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Maximum actionable steps requested from the planner
    #[serde(default = "default_max_plan_steps")]
    pub max_plan_steps: usize,

    /// Maximum clarification questions requested from the planner
    #[serde(default = "default_max_plan_questions")]
    pub max_plan_questions: usize,

    /// Token budget for conversation history sent with each request
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Number of most recent messages read back from chat memory
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Bound on model → tool → model round trips in one request
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Abort a whole request after this many seconds (unbounded when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    /// Per-advisor switches
    #[serde(default = "default_true")]
    pub memory: bool,

    #[serde(default = "default_true")]
    pub planning: bool,

    /// Off by default: the iterative advisor already picks a next step each round
    #[serde(default)]
    pub next_step: bool,

    #[serde(default = "default_true")]
    pub iterative: bool,

    #[serde(default = "default_true")]
    pub critical: bool,
}

fn default_max_iterations() -> usize {
    4
}
fn default_max_plan_steps() -> usize {
    5
}
fn default_max_plan_questions() -> usize {
    3
}
fn default_token_budget() -> usize {
    4096
}
fn default_history_window() -> usize {
    20
}
fn default_max_tool_rounds() -> usize {
    8
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_plan_steps: default_max_plan_steps(),
            max_plan_questions: default_max_plan_questions(),
            token_budget: default_token_budget(),
            history_window: default_history_window(),
            max_tool_rounds: default_max_tool_rounds(),
            request_timeout_secs: None,
            memory: true,
            planning: true,
            next_step: false,
            iterative: true,
            critical: true,
        }
    }
}

/// Timeouts applied to tool-provider sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityRuntimeConfig {
    /// Bound on the `initialize` handshake
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Bound on each `tools/list` and `tools/call` request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Bound on the whole tool discovery, across every `tools/list` page
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_secs: u64,
}

fn default_handshake_timeout() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    60
}
fn default_discovery_timeout() -> u64 {
    30
}

impl Default for CapabilityRuntimeConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: default_handshake_timeout(),
            request_timeout_secs: default_request_timeout(),
            discovery_timeout_secs: default_discovery_timeout(),
        }
    }
}

/// One declared tool-provider integration.
///
/// ```toml
/// [[capabilities]]
/// type = "filesystem"
/// [capabilities.config]
/// paths = ["/home/me/projects"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    /// Capability type (e.g. "filesystem", "fetch", "command")
    #[serde(rename = "type")]
    pub kind: String,

    /// Type-specific settings
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl CapabilityConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            config: serde_json::Map::new(),
        }
    }

    /// Builder-style config entry.
    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.deliberate/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `DELIBERATE_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("DELIBERATE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("DELIBERATE_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("DELIBERATE_MODEL") {
            config.default_model = model;
        }

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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".deliberate")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.reasoning.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "reasoning.max_iterations must be at least 1".into(),
            ));
        }

        if self.reasoning.token_budget == 0 {
            return Err(ConfigError::ValidationError(
                "reasoning.token_budget must be > 0".into(),
            ));
        }

        if self.reasoning.history_window == 0 {
            return Err(ConfigError::ValidationError(
                "reasoning.history_window must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            reasoning: ReasoningConfig::default(),
            capability_runtime: CapabilityRuntimeConfig::default(),
            capabilities: vec![],
            providers: HashMap::new(),
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openrouter");
        assert_eq!(config.reasoning.max_iterations, 4);
        assert_eq!(config.capability_runtime.handshake_timeout_secs, 10);
        assert_eq!(config.capability_runtime.discovery_timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.reasoning.token_budget, config.reasoning.token_budget);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut config = AppConfig::default();
        config.reasoning.max_iterations = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_iterations"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().default_provider, "openrouter");
    }

    #[test]
    fn capability_declarations_parse() {
        let toml_str = r#"
[[capabilities]]
type = "filesystem"
[capabilities.config]
paths = ["/srv/docs", "/srv/code"]

[[capabilities]]
type = "fetch"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.capabilities.len(), 2);
        assert_eq!(config.capabilities[0].kind, "filesystem");
        assert_eq!(config.capabilities[0].config["paths"][1], "/srv/code");
        assert_eq!(config.capabilities[1].kind, "fetch");
        assert!(config.capabilities[1].config.is_empty());
    }

    #[test]
    fn reasoning_section_overrides_defaults() {
        let toml_str = r#"
[reasoning]
max_iterations = 2
critical = false
next_step = true
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.reasoning.max_iterations, 2);
        assert!(!config.reasoning.critical);
        assert!(config.reasoning.next_step);
        assert!(config.reasoning.planning);
        assert_eq!(config.reasoning.history_window, 20);
    }

    #[test]
    fn load_from_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_temperature = 3.5").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn load_from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "reasoning = \"not a table\"").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("openrouter"));
        assert!(toml_str.contains("max_iterations"));
    }
}
