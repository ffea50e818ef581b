//! Telemetry middleware: count/latency/token metrics and lifecycle events
//! emitted to a pluggable sink.

use super::{Middleware, Next, PipelineOutcome, RequestContext};
use crate::error::GatewayError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Where metrics and events go. The gateway owns no exporter.
pub trait TelemetrySink: Send + Sync + 'static {
    fn record_metric(&self, name: &str, value: f64, labels: &[(&str, String)]);
    fn record_event(&self, name: &str, attributes: &[(&str, String)]);
}

/// Sink forwarding to the `metrics` facade; events become debug logs.
#[derive(Default)]
pub struct MetricsSink;

impl TelemetrySink for MetricsSink {
    fn record_metric(&self, name: &str, value: f64, labels: &[(&str, String)]) {
        let labels: Vec<metrics::Label> = labels
            .iter()
            .map(|(k, v)| metrics::Label::new(k.to_string(), v.clone()))
            .collect();
        metrics::histogram!(name.to_string(), labels).record(value);
    }

    fn record_event(&self, name: &str, attributes: &[(&str, String)]) {
        tracing::debug!(event = name, ?attributes, "telemetry event");
    }
}

pub struct TelemetryMiddleware {
    sink: Arc<dyn TelemetrySink>,
}

impl TelemetryMiddleware {
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self { sink }
    }
}

impl Default for TelemetryMiddleware {
    fn default() -> Self {
        Self::new(Arc::new(MetricsSink))
    }
}

#[async_trait]
impl Middleware for TelemetryMiddleware {
    fn name(&self) -> &str {
        "telemetry"
    }

    async fn handle(
        &self,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<PipelineOutcome, GatewayError> {
        let labels = [
            ("backend", ctx.backend_name.clone()),
            ("model", ctx.request.parameters.model.clone()),
        ];
        self.sink.record_event(
            "request.start",
            &[("request_id", ctx.request.metadata.request_id.clone())],
        );
        self.sink.record_metric("gateway.requests", 1.0, &labels);

        let started = Instant::now();
        let outcome = next.run(ctx).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.sink
            .record_metric("gateway.latency_ms", latency_ms, &labels);

        match &outcome {
            Ok(PipelineOutcome::Response(response)) => {
                if let Some(usage) = response.usage {
                    self.sink.record_metric(
                        "gateway.tokens.prompt",
                        usage.prompt_tokens as f64,
                        &labels,
                    );
                    self.sink.record_metric(
                        "gateway.tokens.completion",
                        usage.completion_tokens as f64,
                        &labels,
                    );
                }
                self.sink.record_event(
                    "request.complete",
                    &[("request_id", ctx.request.metadata.request_id.clone())],
                );
            }
            Ok(PipelineOutcome::Stream(_)) => {
                self.sink.record_event(
                    "request.stream_established",
                    &[("request_id", ctx.request.metadata.request_id.clone())],
                );
            }
            Err(error) => {
                self.sink.record_metric("gateway.errors", 1.0, &labels);
                self.sink.record_event(
                    "request.error",
                    &[
                        ("request_id", ctx.request.metadata.request_id.clone()),
                        ("category", error.category.to_string()),
                        ("code", error.code.clone()),
                    ],
                );
            }
        }
        outcome
    }
}
