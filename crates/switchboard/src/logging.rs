//! Tracing setup and log helpers

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::RouterConfig;
use crate::error::{RouterError, RouterResult};

/// Directives for the global filter: `RUST_LOG` when set, otherwise the
/// configured `log_filter`.
pub fn log_directives(config: &RouterConfig) -> String {
    match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => directives,
        _ => config.log_filter.clone(),
    }
}

/// Install the global subscriber: plain or JSON lines on stderr, filtered
/// by [`log_directives`].
pub fn init_tracing(config: &RouterConfig, json: bool) -> RouterResult<()> {
    let directives = log_directives(config);
    let filter = EnvFilter::try_new(&directives)
        .map_err(|e| RouterError::Config(format!("invalid log filter {directives:?}: {e}")))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    installed.map_err(|e| RouterError::Config(format!("tracing already initialised: {e}")))
}

/// Collapse whitespace and cut `text` to at most `max_chars` characters,
/// appending `...` when something was cut.
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let truncated: String = collapsed.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
