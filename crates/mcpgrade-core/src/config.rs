//! Runtime configuration and eval-suite file loading.
//!
//! Suite files are YAML or JSON, detected by extension. Values support
//! `${VAR}`, `$VAR`, and `${VAR:-default}` interpolation before parsing.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::eval::Eval;
use mcpgrade_mcp::StderrSink;

/// Default maximum agentic loop iterations.
pub const DEFAULT_MAX_STEPS: usize = 10;
/// Default maximum tokens per LLM request.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Cache time-to-live for prompt caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheTtl {
    /// 5-minute cache (free tier)
    #[default]
    FiveMinutes,
    /// 1-hour cache (premium)
    OneHour,
}

impl CacheTtl {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTtl::FiveMinutes => "5m",
            CacheTtl::OneHour => "1h",
        }
    }
}

impl fmt::Display for CacheTtl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheTtl {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "5m" => Ok(CacheTtl::FiveMinutes),
            "1h" => Ok(CacheTtl::OneHour),
            other => Err(ConfigError::Invalid(format!(
                "cache_ttl must be '5m' or '1h', got '{other}'"
            ))),
        }
    }
}

/// Runtime knobs for the eval client.
#[derive(Clone)]
pub struct ClientConfig {
    pub api_key: String,
    /// Override for the default Anthropic API endpoint
    pub base_url: Option<String>,
    /// Command to start the MCP server
    pub mcp_command: String,
    pub mcp_args: Vec<String>,
    /// `KEY=VALUE` entries layered over the inherited parent environment
    pub mcp_env: Vec<String>,
    pub model: String,
    /// Model for grading; defaults to `model`
    pub grading_model: Option<String>,
    /// Client-level agent system prompt; per-eval prompts take precedence
    pub agent_system_prompt: Option<String>,
    pub max_steps: usize,
    pub max_tokens: u32,
    pub enable_prompt_caching: bool,
    pub cache_ttl: CacheTtl,
    pub enforce_minimum_scores: bool,
    /// Called for each line the MCP server writes to stderr
    pub stderr_sink: Option<StderrSink>,
}

impl ClientConfig {
    /// Create a config with the defaults applied (10 steps, 4096 tokens,
    /// caching on with the 5-minute TTL, minimum-score enforcement on).
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        mcp_command: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            mcp_command: mcp_command.into(),
            mcp_args: Vec::new(),
            mcp_env: Vec::new(),
            model: model.into(),
            grading_model: None,
            agent_system_prompt: None,
            max_steps: DEFAULT_MAX_STEPS,
            max_tokens: DEFAULT_MAX_TOKENS,
            enable_prompt_caching: true,
            cache_ttl: CacheTtl::default(),
            enforce_minimum_scores: true,
            stderr_sink: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("model", &self.model)
            .field("grading_model", &self.grading_model)
            .field("mcp_command", &self.mcp_command)
            .field("max_steps", &self.max_steps)
            .field("max_tokens", &self.max_tokens)
            .field("enable_prompt_caching", &self.enable_prompt_caching)
            .field("cache_ttl", &self.cache_ttl)
            .field("enforce_minimum_scores", &self.enforce_minimum_scores)
            .finish_non_exhaustive()
    }
}

/// How to start the MCP server under evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Command to start the MCP server
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment variables (`KEY=VALUE`) for the server
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
}

/// Top-level eval-suite file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Anthropic model ID used for the agent
    pub model: String,
    /// Model used for grading (defaults to `model`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grading_model: Option<String>,
    /// Timeout for the whole batch, e.g. "2m" or "30s"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_prompt_caching: Option<bool>,
    /// "5m" (default) or "1h"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce_minimum_scores: Option<bool>,
    pub mcp_server: McpServerConfig,
    pub evals: Vec<Eval>,
}

/// Errors from config loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse {format} config: {message}")]
    Parse { format: &'static str, message: String },

    #[error("unsupported file extension '{0}' (expected .yaml, .yml, or .json)")]
    UnsupportedExtension(String),

    #[error("{0}")]
    Invalid(String),
}

impl EvalConfig {
    /// Load and validate a suite file. The format is detected from the file
    /// extension; environment variables are interpolated before parsing.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let expanded = expand_env(&raw);

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        let config: EvalConfig = match extension.as_str() {
            "yaml" | "yml" => {
                serde_yaml::from_str(&expanded).map_err(|e| ConfigError::Parse {
                    format: "YAML",
                    message: e.to_string(),
                })?
            }
            "json" => serde_json::from_str(&expanded).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            })?,
            other => return Err(ConfigError::UnsupportedExtension(other.to_string())),
        };

        config.validate()?;
        Ok(config)
    }

    /// Structural validation: required fields, unique non-empty eval names,
    /// non-empty prompts, well-formed rubrics, known cache TTL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.is_empty() {
            return Err(ConfigError::Invalid("model is required".to_string()));
        }
        if self.mcp_server.command.is_empty() {
            return Err(ConfigError::Invalid(
                "mcp_server.command is required".to_string(),
            ));
        }
        if self.evals.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one eval is required".to_string(),
            ));
        }
        if let Some(ttl) = &self.cache_ttl {
            ttl.parse::<CacheTtl>()?;
        }

        let mut seen = HashSet::new();
        for (i, eval) in self.evals.iter().enumerate() {
            if eval.name.is_empty() {
                return Err(ConfigError::Invalid(format!("eval[{i}] has an empty name")));
            }
            if !seen.insert(eval.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate eval name '{}'",
                    eval.name
                )));
            }
            if eval.prompt.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "eval '{}' has an empty prompt",
                    eval.name
                )));
            }
            if let Some(rubric) = &eval.grading_rubric {
                rubric.validate().map_err(|e| {
                    ConfigError::Invalid(format!("eval '{}' has invalid rubric: {e}", eval.name))
                })?;
            }
        }

        Ok(())
    }

    /// Build a [`ClientConfig`] from this suite, with the given credentials.
    pub fn to_client_config(
        &self,
        api_key: impl Into<String>,
        base_url: Option<String>,
    ) -> Result<ClientConfig, ConfigError> {
        let mut config = ClientConfig::new(api_key, &self.model, &self.mcp_server.command);
        config.base_url = base_url;
        config.mcp_args = self.mcp_server.args.clone();
        config.mcp_env = self.mcp_server.env.clone();
        config.grading_model = self.grading_model.clone();
        if let Some(max_steps) = self.max_steps {
            config.max_steps = max_steps;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(enabled) = self.enable_prompt_caching {
            config.enable_prompt_caching = enabled;
        }
        if let Some(ttl) = &self.cache_ttl {
            config.cache_ttl = ttl.parse()?;
        }
        if let Some(enforce) = self.enforce_minimum_scores {
            config.enforce_minimum_scores = enforce;
        }
        Ok(config)
    }
}

/// Interpolate environment variables in a config string.
///
/// Supports `$VAR`, `${VAR}`, and `${VAR:-default}`. Unset variables expand
/// to the default when given, otherwise to the empty string.
pub fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            out.push(ch);
            continue;
        }

        match chars.peek() {
            Some('{') => {
                chars.next();
                let mut body = String::new();
                let mut found_close = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        found_close = true;
                        break;
                    }
                    body.push(next);
                }
                if body.is_empty() || !found_close {
                    out.push('$');
                    out.push('{');
                    out.push_str(&body);
                    if found_close {
                        out.push('}');
                    }
                    continue;
                }
                let (name, default) = match body.split_once(":-") {
                    Some((name, default)) => (name.to_string(), Some(default.to_string())),
                    None => (body, None),
                };
                match std::env::var(&name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        if let Some(default) = default {
                            out.push_str(&default);
                        }
                    }
                }
            }
            Some(c) if c.is_ascii_alphabetic() || *c == '_' => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        name.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if let Ok(value) = std::env::var(&name) {
                    out.push_str(&value);
                }
            }
            _ => out.push('$'),
        }
    }

    out
}
