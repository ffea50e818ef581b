//! Configuration loading.
//!
//! Layered: a TOML file provides the base, `PRISM_*` environment
//! variables override it, and everything has a working default.
//!
//! # Example
//!
//! ```rust
//! use prism::config::GatewayConfig;
//!
//! let toml = r#"
//! [routing]
//! strategy = "priority"
//! fallback = "parallel"
//!
//! [translation]
//! strategy = "hybrid"
//!
//! [[translation.mappings]]
//! from = "gpt-4o"
//! to = "claude-sonnet-4"
//! "#;
//! let config: GatewayConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.routing.strategy, "priority");
//! ```

pub mod error;
pub mod logging;

pub use error::ConfigError;
pub use logging::{build_filter_directives, init_tracing, LogFormat, LoggingConfig};

use crate::router::{
    FallbackStrategy, ModelTranslator, ReverseMappingPolicy, RoutingStrategy, TranslationStrategy,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Unified gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    pub routing: RoutingConfig,
    pub translation: TranslationConfig,
    pub middleware: MiddlewareConfig,
    pub logging: LoggingConfig,
}

/// Backend selection and fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub strategy: String,
    pub fallback: String,
    /// Backends consulted per request, in order. Unset means every
    /// registered backend in registration order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_chain: Option<Vec<String>>,
    /// Static backend definitions, in priority order.
    pub backends: Vec<BackendTargetConfig>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            strategy: "round_robin".to_string(),
            fallback: "sequential".to_string(),
            fallback_chain: None,
            backends: Vec::new(),
        }
    }
}

impl RoutingConfig {
    pub fn routing_strategy(&self) -> Result<RoutingStrategy, ConfigError> {
        self.strategy.parse().map_err(|message| ConfigError::Validation {
            field: "routing.strategy".to_string(),
            message,
        })
    }

    pub fn fallback_strategy(&self) -> Result<FallbackStrategy, ConfigError> {
        self.fallback.parse().map_err(|message| ConfigError::Validation {
            field: "routing.fallback".to_string(),
            message,
        })
    }
}

/// One statically configured backend target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendTargetConfig {
    pub name: String,
    /// Provider kind: "openai" or "anthropic".
    pub provider: String,
    /// API key, or the name of the environment variable holding it when
    /// prefixed with `env:`.
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

fn default_weight() -> u32 {
    1
}

impl BackendTargetConfig {
    /// Resolve the API key, dereferencing an `env:VAR` indirection.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        match self.api_key.strip_prefix("env:") {
            Some(var) => std::env::var(var).map_err(|_| ConfigError::Validation {
                field: format!("backends.{}.api_key", self.name),
                message: format!("environment variable '{var}' is not set"),
            }),
            None => Ok(self.api_key.clone()),
        }
    }
}

/// Model-name translation rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub strategy: String,
    pub strict: bool,
    pub reverse_policy: String,
    /// Global exact mappings, in declaration order.
    pub mappings: Vec<MappingConfig>,
    /// Per-backend exact mappings.
    pub backend_mappings: Vec<BackendMappingConfig>,
    /// Regex rules.
    pub patterns: Vec<PatternConfig>,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            strategy: "hybrid".to_string(),
            strict: false,
            reverse_policy: "last_wins".to_string(),
            mappings: Vec::new(),
            backend_mappings: Vec::new(),
            patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendMappingConfig {
    pub backend: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    pub pattern: String,
    pub target: String,
    #[serde(default)]
    pub priority: i32,
}

impl TranslationConfig {
    /// Build the translator this configuration describes.
    pub fn build(&self) -> Result<ModelTranslator, ConfigError> {
        let strategy: TranslationStrategy =
            self.strategy.parse().map_err(|message| ConfigError::Validation {
                field: "translation.strategy".to_string(),
                message,
            })?;
        let mut translator = ModelTranslator::new(strategy);
        translator.set_strict(self.strict);
        translator.set_reverse_policy(match self.reverse_policy.to_lowercase().as_str() {
            "last_wins" => ReverseMappingPolicy::LastWins,
            "first_wins" => ReverseMappingPolicy::FirstWins,
            other => {
                return Err(ConfigError::Validation {
                    field: "translation.reverse_policy".to_string(),
                    message: format!("unknown reverse policy '{other}'"),
                })
            }
        });
        for mapping in &self.mappings {
            translator.add_global_mapping(&mapping.from, &mapping.to);
        }
        for mapping in &self.backend_mappings {
            translator.add_backend_mapping(&mapping.backend, &mapping.from, &mapping.to);
        }
        for rule in &self.patterns {
            translator
                .add_pattern_rule(&rule.pattern, &rule.target, rule.priority)
                .map_err(|e| ConfigError::Validation {
                    field: "translation.patterns".to_string(),
                    message: e.message,
                })?;
        }
        Ok(translator)
    }
}

/// Built-in middleware toggles and tuning.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MiddlewareConfig {
    pub retry: Option<RetryConfig>,
    pub cache: Option<CacheConfig>,
    pub logging: bool,
    pub telemetry: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supports PRISM_* environment variables for common settings.
    /// Invalid values are silently ignored (defaults are kept).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(strategy) = std::env::var("PRISM_ROUTING_STRATEGY") {
            self.routing.strategy = strategy;
        }
        if let Ok(fallback) = std::env::var("PRISM_FALLBACK_STRATEGY") {
            self.routing.fallback = fallback;
        }
        if let Ok(level) = std::env::var("PRISM_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("PRISM_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.routing.routing_strategy()?;
        self.routing.fallback_strategy()?;
        self.translation.build()?;
        for (i, backend) in self.routing.backends.iter().enumerate() {
            if backend.name.is_empty() {
                return Err(ConfigError::Validation {
                    field: format!("routing.backends[{}].name", i),
                    message: "name cannot be empty".to_string(),
                });
            }
            if !matches!(backend.provider.as_str(), "openai" | "anthropic") {
                return Err(ConfigError::Validation {
                    field: format!("routing.backends[{}].provider", i),
                    message: format!("unknown provider '{}'", backend.provider),
                });
            }
        }
        if let Some(retry) = &self.middleware.retry {
            if retry.max_attempts == 0 {
                return Err(ConfigError::Validation {
                    field: "middleware.retry.max_attempts".to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }
}
