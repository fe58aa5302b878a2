//! Configuration loading
//!
//! Optional TOML overrides for operator-tunable settings, plus ENV → TOML
//! resolution for the generative-AI API key. Feature flags and algorithm
//! tunables live in explicit config structs owned by the engine crate; this
//! module only covers what an operator sets from outside the process.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable holding the generative-AI API key.
pub const AI_API_KEY_ENV: &str = "CROPWATCH_AI_API_KEY";

/// Logging section of the TOML config
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "cropwatch_engine=debug")
    pub level: Option<String>,
}

/// TOML configuration file contents
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TomlConfig {
    /// Generative-AI API key (ENV takes priority)
    pub ai_api_key: Option<String>,
    /// Base URL of the completion service
    pub ai_base_url: Option<String>,
    /// Completion model identifier
    pub ai_model: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Load a TOML config file, returning defaults when the file is absent.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        return Ok(TomlConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Default config file path for the platform (`~/.config/cropwatch/config.toml`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cropwatch").join("config.toml"))
}

/// Resolve the generative-AI API key with ENV → TOML priority.
///
/// Warns when both sources are set (potential misconfiguration).
pub fn resolve_ai_api_key(toml_config: &TomlConfig) -> Result<String> {
    let env_key = std::env::var(AI_API_KEY_ENV).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_config.ai_api_key.as_ref().filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "AI API key found in both environment and TOML. Using environment (highest priority)."
        );
    }

    if let Some(key) = env_key {
        info!("AI API key loaded from environment variable");
        return Ok(key);
    }
    if let Some(key) = toml_key {
        info!("AI API key loaded from TOML config");
        return Ok(key.clone());
    }

    Err(Error::Config(format!(
        "AI API key not configured. Set {} or ai_api_key in the TOML config.",
        AI_API_KEY_ENV
    )))
}

/// Validate an API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
