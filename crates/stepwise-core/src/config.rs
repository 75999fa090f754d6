use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StepwiseError};

/// Top-level Stepwise configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepwiseConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    /// JSONL trace logging configuration.
    #[serde(default)]
    pub log: Option<LogConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on step executions per run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Attach state snapshots to step events.
    #[serde(default = "default_snapshot_state")]
    pub snapshot_state: bool,
    /// Capacity of the broadcast channel used for workflow events.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            snapshot_state: default_snapshot_state(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Runtime trace logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// Directory for JSONL trace files. Default: ~/.stepwise/logs
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// 1 = run summary, 2 = per step, 3 = per step with state and custom events.
    #[serde(default = "default_log_level")]
    pub level: u8,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            level: default_log_level(),
        }
    }
}

impl LogConfig {
    /// Resolve the log directory (expand ~).
    pub fn resolved_log_dir(&self) -> PathBuf {
        expand_home(&self.log_dir)
    }
}

fn default_max_iterations() -> usize { 1000 }
fn default_snapshot_state() -> bool { true }
fn default_event_capacity() -> usize { 256 }
fn default_log_enabled() -> bool { true }
fn default_log_dir() -> String { "~/.stepwise/logs".to_string() }
fn default_log_level() -> u8 { 2 }

impl StepwiseConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| StepwiseError::ConfigNotFound(path.display().to_string()))?;

        let config = Self::parse(&content)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn parse(content: &str) -> Result<Self> {
        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| StepwiseError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.engine.max_iterations == 0 {
            return Err(StepwiseError::Config(
                "engine.max_iterations must be at least 1".to_string(),
            ));
        }
        if let Some(log) = &self.log {
            if !(1..=3).contains(&log.level) {
                return Err(StepwiseError::Config(format!(
                    "log.level must be 1, 2 or 3 (got {})",
                    log.level
                )));
            }
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_STEPWISE_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_STEPWISE_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_STEPWISE_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_STEPWISE_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_STEPWISE_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = StepwiseConfig::parse("").unwrap();
        assert_eq!(config.engine.max_iterations, 1000);
        assert!(config.engine.snapshot_state);
        assert_eq!(config.engine.event_capacity, 256);
        assert!(config.log.is_none());
    }

    #[test]
    fn test_partial_log_section() {
        let config = StepwiseConfig::parse(
            r#"
[log]
level = 3
"#,
        )
        .unwrap();
        let log = config.log.unwrap();
        assert!(log.enabled);
        assert_eq!(log.level, 3);
        assert_eq!(log.log_dir, "~/.stepwise/logs");
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let err = StepwiseConfig::parse("[engine]\nmax_iterations = 0\n").unwrap_err();
        assert!(matches!(err, StepwiseError::Config(_)));
    }

    #[test]
    fn test_rejects_bad_log_level() {
        let err = StepwiseConfig::parse("[log]\nlevel = 7\n").unwrap_err();
        assert!(err.to_string().contains("log.level"));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/tmp/logs"), PathBuf::from("/tmp/logs"));
    }
}
