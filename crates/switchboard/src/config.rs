//! Router configuration
//!
//! Defaults, an optional YAML file and environment overrides, applied in
//! that order by [`RouterConfig::load`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RouterError, RouterResult};

/// Default bounded wait of one poll, in milliseconds
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 10_000;

/// Default length prompts and outputs are truncated to in logs
pub const DEFAULT_LOG_TRUNCATE_LEN: usize = 100;

/// Default tracing directives when neither `RUST_LOG` nor the config sets one
pub const DEFAULT_LOG_FILTER: &str = "switchboard=info";

/// Router configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouterConfig {
    /// How long one poll waits for a completion before giving up
    pub poll_timeout_ms: u64,
    /// Maximum characters of prompts/outputs written to logs
    pub log_truncate_len: usize,
    /// Log an ASCII tree of the graph when execution starts
    pub render_graph_on_start: bool,
    /// `EnvFilter` directives used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            log_truncate_len: DEFAULT_LOG_TRUNCATE_LEN,
            render_graph_on_start: true,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl RouterConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Set the poll timeout
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the log truncation length
    pub fn with_log_truncate_len(mut self, len: usize) -> Self {
        self.log_truncate_len = len;
        self
    }

    /// Enable or disable the graph dump on execution start
    pub fn with_graph_rendering(mut self, enabled: bool) -> Self {
        self.render_graph_on_start = enabled;
        self
    }

    /// Read a YAML config file; missing keys keep their defaults
    pub fn from_yaml_file(path: impl AsRef<Path>) -> RouterResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RouterError::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_yaml::from_str(&content)
            .map_err(|e| RouterError::Config(format!("invalid config {}: {e}", path.display())))
    }

    /// Set the tracing directives
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Apply `SWITCHBOARD_POLL_TIMEOUT_MS`, `SWITCHBOARD_LOG_TRUNCATE` and
    /// `SWITCHBOARD_LOG`
    pub fn with_env_overrides(mut self) -> RouterResult<Self> {
        if let Ok(value) = std::env::var("SWITCHBOARD_POLL_TIMEOUT_MS") {
            self.poll_timeout_ms = value.trim().parse().map_err(|_| {
                RouterError::Config(format!("SWITCHBOARD_POLL_TIMEOUT_MS is not a number: {value}"))
            })?;
        }
        if let Ok(value) = std::env::var("SWITCHBOARD_LOG_TRUNCATE") {
            self.log_truncate_len = value.trim().parse().map_err(|_| {
                RouterError::Config(format!("SWITCHBOARD_LOG_TRUNCATE is not a number: {value}"))
            })?;
        }
        if let Ok(value) = std::env::var("SWITCHBOARD_LOG") {
            self.log_filter = value;
        }
        Ok(self)
    }

    /// Defaults, then the config file if present, then the environment
    pub fn load() -> RouterResult<Self> {
        let path = config_file();
        let config = if path.exists() {
            tracing::debug!(path = %path.display(), "Loading router config");
            Self::from_yaml_file(&path)?
        } else {
            Self::default()
        };
        config.with_env_overrides()
    }
}

/// Directory holding the config file (`SWITCHBOARD_CONFIG_DIR` or `~/.switchboard`)
pub fn config_dir() -> PathBuf {
    std::env::var("SWITCHBOARD_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".switchboard")
        })
}

pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}
