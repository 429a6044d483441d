//! Tool configuration: which model to call and how.
//!
//! Resolution order, highest first: CLI flags, `TFLOW_LM_COMMAND`, the config
//! file (`--config` or `<config_dir>/tflow/config.json`), built-in defaults.
use crate::lm::anthropic::DEFAULT_BASE_URL;
use crate::lm::{RequestOptions, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const LM_COMMAND_ENV: &str = "TFLOW_LM_COMMAND";
const DEFAULT_LM_COMMAND: &str = "claude -p --model haiku";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Pipe prompts through a local command
    Command,
    /// Stream from the Anthropic Messages API
    Anthropic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolConfig {
    pub schema_version: u32,
    #[serde(default = "default_provider")]
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lm_command: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_provider() -> Provider {
    Provider::Command
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

/// Overrides collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub lm_command: Option<String>,
    pub provider: Option<Provider>,
    pub model: Option<String>,
}

/// Build the config used when no file is present.
pub fn default_config() -> ToolConfig {
    ToolConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        provider: default_provider(),
        lm_command: Some(DEFAULT_LM_COMMAND.to_string()),
        model: default_model(),
        api_key_env: default_api_key_env(),
        base_url: default_base_url(),
        max_tokens: default_max_tokens(),
        temperature: default_temperature(),
    }
}

/// Render a pretty JSON config stub for `tflow config`.
pub fn config_stub() -> Result<String> {
    serde_json::to_string_pretty(&default_config()).context("serialize config stub")
}

/// Default location: `<config_dir>/tflow/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tflow").join("config.json"))
}

pub fn load_config(path: &Path) -> Result<ToolConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: ToolConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    Ok(config)
}

pub fn validate_config(config: &ToolConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    config
        .request_options()
        .validate()
        .context("validate sampling options")?;
    match config.provider {
        Provider::Command => {
            let command = config.lm_command.as_deref().unwrap_or_default();
            if command.trim().is_empty() {
                return Err(anyhow!("provider \"command\" requires a non-empty lm_command"));
            }
        }
        Provider::Anthropic => {
            if config.model.trim().is_empty() {
                return Err(anyhow!("provider \"anthropic\" requires a model"));
            }
            if config.api_key_env.trim().is_empty() {
                return Err(anyhow!("api_key_env must be non-empty"));
            }
        }
    }
    Ok(())
}

/// Load, layer overrides and validate.
///
/// `env_command` is the value of `TFLOW_LM_COMMAND`, passed in so callers
/// (and tests) control the environment explicitly.
pub fn resolve_config(
    overrides: &ConfigOverrides,
    env_command: Option<String>,
) -> Result<ToolConfig> {
    let mut config = match &overrides.config_path {
        Some(path) => load_config(path)?,
        None => match default_config_path().filter(|path| path.is_file()) {
            Some(path) => load_config(&path)?,
            None => default_config(),
        },
    };
    if let Some(command) = env_command.filter(|c| !c.trim().is_empty()) {
        config.lm_command = Some(command);
    }
    if let Some(command) = &overrides.lm_command {
        config.lm_command = Some(command.clone());
        if overrides.provider.is_none() {
            config.provider = Provider::Command;
        }
    }
    if let Some(provider) = overrides.provider {
        config.provider = provider;
    }
    if let Some(model) = &overrides.model {
        config.model = model.clone();
    }
    validate_config(&config)?;
    tracing::debug!(provider = ?config.provider, model = %config.model, "resolved config");
    Ok(config)
}

impl ToolConfig {
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            system: None,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
