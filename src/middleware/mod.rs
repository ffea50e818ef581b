//! Middleware pipeline: an ordered chain of request/response interceptors
//! wrapping a single terminal backend call.
//!
//! Execution is onion-ordered: the interceptor registered first runs its
//! pre-logic first and its post-logic last. State written into
//! [`RequestContext::state`] by an earlier interceptor is visible to every
//! later one within the same request. An interceptor that returns an error
//! without calling `next` short-circuits the chain; the error propagates
//! outward unless an outer interceptor recovers it.

use crate::adapter::{AdapterMetadata, ChunkStream};
use crate::error::GatewayError;
use crate::ir::{ChatRequest, ChatResponse};
use crate::stream::StreamOptions;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod cache;
pub mod logging;
pub mod retry;
pub mod telemetry;
pub mod transform;

pub use cache::{CacheStorage, CachingMiddleware, InMemoryCache};
pub use logging::LoggingMiddleware;
pub use retry::RetryMiddleware;
pub use telemetry::{MetricsSink, TelemetryMiddleware, TelemetrySink};
pub use transform::TransformMiddleware;

/// What the terminal call produced: a complete response or an established
/// chunk stream. The same onion wraps both execution paths.
pub enum PipelineOutcome {
    Response(ChatResponse),
    Stream(ChunkStream),
}

impl std::fmt::Debug for PipelineOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineOutcome::Response(response) => {
                f.debug_tuple("Response").field(response).finish()
            }
            PipelineOutcome::Stream(_) => f.debug_tuple("Stream").finish_non_exhaustive(),
        }
    }
}

impl PipelineOutcome {
    pub fn into_response(self) -> Result<ChatResponse, GatewayError> {
        match self {
            PipelineOutcome::Response(response) => Ok(response),
            PipelineOutcome::Stream(_) => Err(GatewayError::middleware(
                "UNEXPECTED_STREAM",
                "expected a response outcome, got a stream",
            )),
        }
    }

    pub fn into_stream(self) -> Result<ChunkStream, GatewayError> {
        match self {
            PipelineOutcome::Stream(stream) => Ok(stream),
            PipelineOutcome::Response(_) => Err(GatewayError::middleware(
                "UNEXPECTED_RESPONSE",
                "expected a stream outcome, got a response",
            )),
        }
    }
}

/// Open key/value bag shared across the chain for one request, with typed
/// accessor helpers per well-known key.
#[derive(Debug, Default, Clone)]
pub struct StateBag {
    values: HashMap<String, serde_json::Value>,
}

impl StateBag {
    pub fn put(&mut self, key: impl Into<String>, value: impl Serialize) {
        if let Ok(value) = serde_json::to_value(value) {
            self.values.insert(key.into(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

/// Mutable request-scoped context threaded through the chain.
pub struct RequestContext {
    /// The IR request; interceptors may rewrite it before `next`.
    pub request: ChatRequest,
    /// Shared cross-interceptor state.
    pub state: StateBag,
    /// Name the backend was registered under (or the adapter name for a
    /// plain bridge).
    pub backend_name: String,
    /// Read-only backend facts.
    pub backend_metadata: AdapterMetadata,
    /// Cancellation signal for this request.
    pub cancellation: CancellationToken,
    /// Streaming options the terminal passes to `Backend::execute_stream`;
    /// ignored on the non-streaming path.
    pub stream_options: StreamOptions,
}

impl RequestContext {
    pub fn new(
        request: ChatRequest,
        backend_name: impl Into<String>,
        backend_metadata: AdapterMetadata,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            request,
            state: StateBag::default(),
            backend_name: backend_name.into(),
            backend_metadata,
            cancellation,
            stream_options: StreamOptions::default(),
        }
    }
}

/// The terminal call at the center of the onion.
#[async_trait]
pub trait Terminal: Send + Sync {
    async fn call(&self, ctx: &mut RequestContext) -> Result<PipelineOutcome, GatewayError>;
}

/// Continuation invoking the remainder of the chain and ultimately the
/// terminal call. `Copy` so an interceptor (retry) can re-enter it.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    terminal: &'a dyn Terminal,
}

impl<'a> Next<'a> {
    pub async fn run(self, ctx: &mut RequestContext) -> Result<PipelineOutcome, GatewayError> {
        match self.chain.split_first() {
            Some((mw, rest)) => {
                mw.handle(ctx, Next { chain: rest, terminal: self.terminal })
                    .await
                    .map_err(|e| e.with_middleware(mw.name()))
            }
            None => self.terminal.call(ctx).await,
        }
    }
}

/// One interceptor in the chain.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Stable name, recorded in error provenance.
    fn name(&self) -> &str;

    async fn handle(
        &self,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<PipelineOutcome, GatewayError>;
}

/// Ordered interceptor chain. Order is insertion order.
#[derive(Default, Clone)]
pub struct MiddlewarePipeline {
    chain: Vec<Arc<dyn Middleware>>,
}

impl MiddlewarePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor; it wraps everything added after it.
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.chain.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub async fn execute(
        &self,
        ctx: &mut RequestContext,
        terminal: &dyn Terminal,
    ) -> Result<PipelineOutcome, GatewayError> {
        Next { chain: &self.chain, terminal }.run(ctx).await
    }
}
