// callplan-core/src/config.rs

//! Runtime configuration for callplan binaries, parsed from TOML.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use url::Url;

use crate::llm::grammar::DEFAULT_COMMAND;

/// Validated runtime configuration. Created by parsing TOML content with
/// [`RuntimeConfig::from_toml_str`]; the API key is read separately from the
/// environment variable named in `llm.api_key_env_var`.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Chat-completions endpoint URL.
    pub endpoint: String,
    /// Model name expected by the endpoint.
    pub model: String,
    /// Environment variable holding the API key; empty means no key.
    #[serde(default)]
    pub api_key_env_var: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Enable grammar-constrained decoding (requires the converter command).
    #[serde(default)]
    pub use_grammar: bool,
    #[serde(default = "default_grammar_command")]
    pub grammar_command: Vec<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Per-call executor timeout, in seconds.
    #[serde(default = "default_call_timeout_secs")]
    pub timeout_secs: u64,
    /// Run top-level plan entries concurrently.
    #[serde(default)]
    pub concurrent: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_call_timeout_secs(),
            concurrent: false,
        }
    }
}

fn default_temperature() -> f64 {
    0.1
}

fn default_top_p() -> f64 {
    0.95
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_grammar_command() -> Vec<String> {
    DEFAULT_COMMAND.iter().map(|s| s.to_string()).collect()
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_call_timeout_secs() -> u64 {
    30
}

impl RuntimeConfig {
    /// Parses and validates TOML configuration content.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RuntimeConfig =
            toml::from_str(content).context("failed to parse configuration TOML content")?;

        if config.llm.endpoint.trim().is_empty() {
            return Err(anyhow!("'llm.endpoint' in config content is empty"));
        }
        Url::parse(&config.llm.endpoint).with_context(|| {
            format!("invalid URL format for endpoint '{}'", config.llm.endpoint)
        })?;
        if config.llm.model.trim().is_empty() {
            return Err(anyhow!("'llm.model' in config content is empty"));
        }
        if config.llm.timeout_secs == 0 {
            return Err(anyhow!("'llm.timeout_secs' must be positive"));
        }
        if config.execution.timeout_secs == 0 {
            return Err(anyhow!("'execution.timeout_secs' must be positive"));
        }
        if config.llm.use_grammar && config.llm.grammar_command.is_empty() {
            return Err(anyhow!(
                "'llm.use_grammar' is enabled but 'llm.grammar_command' is empty"
            ));
        }

        Ok(config)
    }

    /// The per-call executor timeout.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.execution.timeout_secs)
    }

    /// The LLM request timeout.
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }
}
