//! Tracing subscriber setup.
//!
//! - `LOG_FORMAT`: `text` (default) or `json`
//! - `RUST_LOG`: filter directives, `info` when unset

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// `json` selects JSON lines; anything else falls back to text.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") { LogFormat::Json } else { LogFormat::Text }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { format: LogFormat::Text, filter: "info".to_string() }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let format = lookup("LOG_FORMAT").map(|v| LogFormat::parse(&v)).unwrap_or_default();
        let filter = lookup("RUST_LOG")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());

        Self { format, filter }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .with_context(|| format!("Invalid log filter '{}'", config.filter))?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false).with_span_list(false))
            .try_init(),
    };
    installed.context("Failed to install tracing subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parses_format() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Text);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Text);
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(LoggingConfig::from_lookup(|_| None), LoggingConfig::default());
    }

    #[test]
    fn reads_env_names() {
        let env = HashMap::from([("LOG_FORMAT", "json"), ("RUST_LOG", "weatherzip=debug")]);
        let config = LoggingConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter, "weatherzip=debug");
    }

    #[test]
    fn rejects_bad_filter() {
        let config = LoggingConfig { filter: "weatherzip=loud".into(), ..Default::default() };
        let err = init_logging(&config).unwrap_err();
        assert!(err.to_string().contains("Invalid log filter"));
    }
}
