//! Request/response logging middleware.
//!
//! Observes traffic without mutating it. Message bodies and configured
//! metadata fields are redacted from the logged representation only; the
//! request itself is untouched.

use super::{Middleware, Next, PipelineOutcome, RequestContext};
use crate::error::GatewayError;
use async_trait::async_trait;
use std::time::Instant;

/// Log verbosity for the middleware's own records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
}

pub struct LoggingMiddleware {
    level: LogLevel,
    /// Keys in `metadata.custom` whose values are replaced in log output.
    redact_fields: Vec<String>,
    /// Log message text content (off by default; bodies may be sensitive).
    log_bodies: bool,
}

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self {
            level: LogLevel::Info,
            redact_fields: Vec::new(),
            log_bodies: false,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn redact(mut self, fields: impl IntoIterator<Item = String>) -> Self {
        self.redact_fields.extend(fields);
        self
    }

    pub fn with_bodies(mut self, log_bodies: bool) -> Self {
        self.log_bodies = log_bodies;
        self
    }

    fn custom_for_log(&self, ctx: &RequestContext) -> serde_json::Value {
        let mut custom = serde_json::Map::new();
        for (key, value) in &ctx.request.metadata.custom {
            let logged = if self.redact_fields.iter().any(|f| f == key) {
                serde_json::Value::String("[redacted]".to_string())
            } else {
                value.clone()
            };
            custom.insert(key.clone(), logged);
        }
        serde_json::Value::Object(custom)
    }
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! log_at {
    ($level:expr, $($arg:tt)*) => {
        match $level {
            LogLevel::Debug => tracing::debug!($($arg)*),
            LogLevel::Info => tracing::info!($($arg)*),
        }
    };
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(
        &self,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<PipelineOutcome, GatewayError> {
        let request_id = ctx.request.metadata.request_id.clone();
        let model = ctx.request.parameters.model.clone();
        let custom = self.custom_for_log(ctx);
        log_at!(
            self.level,
            request_id = %request_id,
            backend = %ctx.backend_name,
            model = %model,
            messages = ctx.request.messages.len(),
            stream = ctx.request.stream,
            custom = %custom,
            "request dispatched"
        );
        if self.log_bodies {
            for message in &ctx.request.messages {
                tracing::debug!(request_id = %request_id, role = ?message.role, body = %message.text_content(), "request message");
            }
        }

        let started = Instant::now();
        let outcome = next.run(ctx).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(PipelineOutcome::Response(response)) => {
                log_at!(
                    self.level,
                    request_id = %request_id,
                    latency_ms,
                    finish_reason = ?response.finish_reason,
                    prompt_tokens = response.usage.map(|u| u.prompt_tokens).unwrap_or(0),
                    completion_tokens = response.usage.map(|u| u.completion_tokens).unwrap_or(0),
                    "request completed"
                );
            }
            Ok(PipelineOutcome::Stream(_)) => {
                log_at!(self.level, request_id = %request_id, latency_ms, "stream established");
            }
            Err(error) => {
                tracing::warn!(
                    request_id = %request_id,
                    latency_ms,
                    category = %error.category,
                    code = %error.code,
                    "request failed"
                );
            }
        }
        outcome
    }
}
