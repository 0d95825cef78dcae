use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LoopgraphError, Result};

/// Top-level loopgraph configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub log: Option<LogConfig>,
    /// Graph definition files (`.toml` / `.json`) registered at startup.
    #[serde(default)]
    pub graphs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Step budget used when a run request does not name one.
    #[serde(default = "default_max_steps")]
    pub default_max_steps: usize,
    /// Largest step budget a caller may request.
    #[serde(default = "default_max_steps_limit")]
    pub max_steps_limit: usize,
    /// Register the built-in code review graph on startup.
    #[serde(default = "default_register_builtin_graphs")]
    pub register_builtin_graphs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_steps: default_max_steps(),
            max_steps_limit: default_max_steps_limit(),
            register_builtin_graphs: default_register_builtin_graphs(),
        }
    }
}

fn default_max_steps() -> usize { 50 }
fn default_max_steps_limit() -> usize { 10_000 }
fn default_register_builtin_graphs() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String { "127.0.0.1:8000".to_string() }

/// JSONL run logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable run logging (default: true when section is present).
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// Directory for log files. Default: ./logs
    #[serde(default)]
    pub log_dir: Option<String>,
    /// 1 = run summary, 2 = every step.
    #[serde(default = "default_log_level")]
    pub level: u8,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: None,
            level: default_log_level(),
        }
    }
}

impl LogConfig {
    pub fn dir(&self) -> PathBuf {
        PathBuf::from(self.log_dir.as_deref().unwrap_or("logs"))
    }
}

fn default_log_enabled() -> bool { true }
fn default_log_level() -> u8 { 1 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| LoopgraphError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| LoopgraphError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    fn check(&self) -> Result<()> {
        let engine = &self.engine;
        if engine.default_max_steps == 0 || engine.default_max_steps > engine.max_steps_limit {
            return Err(LoopgraphError::Config(format!(
                "engine.default_max_steps must be between 1 and {} (max_steps_limit), got {}",
                engine.max_steps_limit, engine.default_max_steps
            )));
        }
        Ok(())
    }
}

/// Substitutes `${NAME}` with the variable's value. Unset names and an
/// unclosed `${` stay as written.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find('}') else {
            rest = &rest[open..];
            break;
        };
        let name = &after[..close];
        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => out.push_str(&rest[open..open + 2 + close + 1]),
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}
