//! Logging configuration and tracing setup.

use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level for everything ("trace" through "error").
    pub level: String,
    pub format: LogFormat,
    /// Per-module overrides, e.g. `router = "debug"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_levels: Option<HashMap<String, String>>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            component_levels: None,
        }
    }
}

/// Build the tracing filter string: the base level plus any
/// component-specific levels scoped to this crate.
pub fn build_filter_directives(config: &LoggingConfig) -> String {
    let mut filter = config.level.clone();
    if let Some(component_levels) = &config.component_levels {
        for (component, level) in component_levels {
            filter.push_str(&format!(",prism::{}={}", component, level));
        }
    }
    filter
}

/// Install the global tracing subscriber from the logging configuration.
///
/// Fails if a subscriber is already installed or the filter string does
/// not parse.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = tracing_subscriber::EnvFilter::try_new(build_filter_directives(config))
        .map_err(|e| ConfigError::Validation {
            field: "logging.level".to_string(),
            message: e.to_string(),
        })?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| ConfigError::Validation {
        field: "logging".to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn log_format_from_str() {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert!(LogFormat::from_str("xml").is_err());
    }

    #[test]
    fn filter_directives_include_component_levels() {
        let mut component_levels = HashMap::new();
        component_levels.insert("router".to_string(), "debug".to_string());
        let config = LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            component_levels: Some(component_levels),
        };
        assert_eq!(build_filter_directives(&config), "info,prism::router=debug");
    }
}
