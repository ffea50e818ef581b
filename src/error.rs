//! Error taxonomy for the gateway.
//!
//! Errors are categorized rather than typed per failure site: every error
//! carries a machine-readable `code`, an [`ErrorCategory`], a retryability
//! flag, and [`Provenance`] recording which frontend/backend/middleware/
//! router produced it. Routing exhaustion additionally aggregates each
//! attempt's underlying error.

use crate::ir::Provenance;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse failure category, stable across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    Authorization,
    RateLimit,
    Validation,
    Provider,
    AdapterConversion,
    Network,
    Streaming,
    Routing,
    Middleware,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Authorization => "authorization",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Provider => "provider",
            ErrorCategory::AdapterConversion => "adapter_conversion",
            ErrorCategory::Network => "network",
            ErrorCategory::Streaming => "streaming",
            ErrorCategory::Routing => "routing",
            ErrorCategory::Middleware => "middleware",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// One failed backend attempt within an exhausted fallback chain.
#[derive(Debug)]
pub struct BackendAttempt {
    pub backend: String,
    pub error: Box<GatewayError>,
}

/// The gateway error type.
#[derive(Debug, Error)]
#[error("[{category}/{code}] {message}")]
pub struct GatewayError {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    pub retryable: bool,
    pub provenance: Provenance,
    /// Populated only when a whole fallback chain was exhausted.
    pub attempts: Vec<BackendAttempt>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl GatewayError {
    fn new(category: ErrorCategory, code: &str, message: impl Into<String>) -> Self {
        Self {
            category,
            code: code.to_string(),
            message: message.into(),
            retryable: false,
            provenance: Provenance::default(),
            attempts: Vec::new(),
            source: None,
        }
    }

    pub fn authentication(code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Authentication, code, message)
    }

    pub fn authorization(code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Authorization, code, message)
    }

    /// Rate limits are retryable by definition.
    pub fn rate_limit(code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::RateLimit, code, message).retryable(true)
    }

    pub fn validation(code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, code, message)
    }

    pub fn provider(code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Provider, code, message)
    }

    pub fn conversion(code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::AdapterConversion, code, message)
    }

    /// Network failures are transient; marked retryable.
    pub fn network(code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Network, code, message).retryable(true)
    }

    pub fn streaming(code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Streaming, code, message)
    }

    pub fn routing(code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Routing, code, message)
    }

    pub fn middleware(code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Middleware, code, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Unknown, "UNKNOWN", message)
    }

    /// Request was cancelled by the caller's cancellation signal.
    pub fn cancelled() -> Self {
        Self::new(ErrorCategory::Network, "CANCELLED", "request cancelled")
    }

    /// Aggregate error for a fully exhausted fallback chain.
    pub fn all_backends_failed(attempts: Vec<BackendAttempt>) -> Self {
        let summary = attempts
            .iter()
            .map(|a| format!("{}: {}", a.backend, a.error))
            .collect::<Vec<_>>()
            .join("; ");
        let mut err = Self::new(
            ErrorCategory::Routing,
            "ALL_BACKENDS_FAILED",
            format!("all backends failed ({} attempts): {}", attempts.len(), summary),
        );
        err.attempts = attempts;
        err
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_frontend(mut self, name: impl Into<String>) -> Self {
        self.provenance.frontend = Some(name.into());
        self
    }

    pub fn with_backend(mut self, name: impl Into<String>) -> Self {
        self.provenance.backend = Some(name.into());
        self
    }

    pub fn with_middleware(mut self, name: impl Into<String>) -> Self {
        self.provenance.middleware.push(name.into());
        self
    }

    pub fn with_router(mut self, name: impl Into<String>) -> Self {
        self.provenance.router = Some(name.into());
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.code == "CANCELLED"
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        let code = if err.is_timeout() { "TIMEOUT" } else { "CONNECT" };
        GatewayError::network(code, err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::conversion("JSON", err.to_string()).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_retryable() {
        assert!(GatewayError::network("CONNECT", "refused").retryable);
        assert!(GatewayError::rate_limit("RATE", "slow down").retryable);
        assert!(!GatewayError::validation("EMPTY", "no messages").retryable);
    }

    #[test]
    fn aggregate_error_references_every_attempt() {
        let attempts = vec![
            BackendAttempt {
                backend: "a".to_string(),
                error: Box::new(GatewayError::network("CONNECT", "refused")),
            },
            BackendAttempt {
                backend: "b".to_string(),
                error: Box::new(GatewayError::provider("HTTP_500", "boom")),
            },
        ];
        let err = GatewayError::all_backends_failed(attempts);
        assert_eq!(err.category, ErrorCategory::Routing);
        assert_eq!(err.attempts.len(), 2);
        assert!(err.message.contains("a:"));
        assert!(err.message.contains("b:"));
    }

    #[test]
    fn provenance_builders_accumulate() {
        let err = GatewayError::provider("HTTP_500", "boom")
            .with_backend("anthropic-main")
            .with_middleware("retry")
            .with_router("router");
        assert_eq!(err.provenance.backend.as_deref(), Some("anthropic-main"));
        assert_eq!(err.provenance.middleware, vec!["retry".to_string()]);
        assert_eq!(err.provenance.router.as_deref(), Some("router"));
    }
}
