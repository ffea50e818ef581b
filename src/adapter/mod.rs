//! Adapter contracts: the two polymorphic roles every provider integration
//! implements.
//!
//! A [`Frontend`] normalizes one provider's wire format to and from IR; a
//! [`Backend`] executes IR against one provider's actual API. Routing and
//! middleware depend only on these traits and on [`AdapterMetadata`], never
//! on a concrete provider shape.
//!
//! # Object safety
//!
//! Both traits are object-safe and used as `Arc<dyn Frontend>` /
//! `Arc<dyn Backend>`. All async methods use `async_trait`.
//!
//! # Cancellation safety
//!
//! Backend methods take a [`CancellationToken`]; cancelling it aborts the
//! in-flight upstream call. Dropping a returned stream releases the
//! upstream connection.

use crate::error::GatewayError;
use crate::ir::{ChatRequest, ChatResponse, Message, Role, StreamChunk};
use crate::stream::StreamOptions;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub mod anthropic;
pub mod openai;

pub use anthropic::{AnthropicBackend, AnthropicConfig, AnthropicFrontend};
pub use openai::{OpenAiBackend, OpenAiConfig, OpenAiFrontend};

/// Lazy, pull-driven sequence of canonical chunks. Errors after the stream
/// is established arrive in-band as a terminal [`StreamChunk::Error`].
pub type ChunkStream = BoxStream<'static, StreamChunk>;

/// Lazy sequence of provider-shaped wire events (SSE payload strings).
pub type EventStream = BoxStream<'static, Result<String, GatewayError>>;

/// How a backend expects system messages to be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemMessageStrategy {
    /// System messages stay in the message list (OpenAI style).
    InMessages,
    /// System text is lifted into a separate request parameter
    /// (Anthropic style).
    SeparateParameter,
}

/// Read-only capability facts about an adapter, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterCapabilities {
    pub streaming: bool,
    pub multi_modal: bool,
    pub tools: bool,
    pub max_context_tokens: Option<u32>,
    pub system_message_strategy: SystemMessageStrategy,
    pub supports_multiple_system_messages: bool,
}

/// Identity and capabilities of one adapter instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterMetadata {
    pub name: String,
    pub version: String,
    pub provider: String,
    pub capabilities: AdapterCapabilities,
}

/// Where a model listing came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelListSource {
    Remote,
    Static,
    Cache,
}

/// Pricing per 1k tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input: f64,
    pub output: f64,
}

/// Observed latency profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Latency {
    pub p50_ms: u32,
    pub p95_ms: u32,
}

/// Per-model capability facts. Absent fields are neutral for matching:
/// no hard exclusion, no scoring bonus or penalty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub context_window: Option<u32>,
    pub max_tokens: Option<u32>,
    pub supports_streaming: Option<bool>,
    pub supports_vision: Option<bool>,
    pub supports_tools: Option<bool>,
    pub supports_json: Option<bool>,
    pub pricing: Option<Pricing>,
    pub latency: Option<Latency>,
    /// 0-100.
    pub quality_score: Option<f32>,
}

/// A model offered by some backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiModel {
    pub id: String,
    pub name: String,
    pub capabilities: Option<ModelCapabilities>,
}

/// Result of [`Backend::list_models`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelList {
    pub models: Vec<AiModel>,
    pub source: ModelListSource,
    pub fetched_at: DateTime<Utc>,
    pub is_complete: bool,
}

impl ModelList {
    /// Empty static listing, the default for backends without discovery.
    pub fn empty_static() -> Self {
        Self {
            models: Vec::new(),
            source: ModelListSource::Static,
            fetched_at: Utc::now(),
            is_complete: false,
        }
    }
}

/// Normalizes one provider's wire format to and from IR.
pub trait Frontend: Send + Sync + 'static {
    /// Immutable adapter identity and capabilities.
    fn metadata(&self) -> &AdapterMetadata;

    /// Parse a provider-shaped request into IR.
    ///
    /// # Errors
    ///
    /// Returns a validation error on malformed input (missing model, empty
    /// messages, unknown roles).
    fn to_ir(&self, request: serde_json::Value) -> Result<ChatRequest, GatewayError>;

    /// Serialize an IR response into this provider's shape.
    fn from_ir(&self, response: &ChatResponse) -> Result<serde_json::Value, GatewayError>;

    /// Re-serialize a canonical chunk stream into this provider's wire
    /// stream. Lazy, finite, forward-only.
    fn from_ir_stream(&self, chunks: ChunkStream, options: StreamOptions) -> EventStream;

    /// Reconstruct this provider's error envelope from a categorized
    /// gateway error, so clients always receive errors in the format they
    /// expect.
    fn error_envelope(&self, error: &GatewayError) -> serde_json::Value;
}

/// Executes IR requests against one provider's API.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Immutable adapter identity and capabilities.
    fn metadata(&self) -> &AdapterMetadata;

    /// Execute a non-streaming request.
    ///
    /// # Errors
    ///
    /// Fails with authentication, validation, provider, network, or
    /// adapter-conversion errors.
    async fn execute(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, GatewayError>;

    /// Execute a streaming request, translating upstream events under the
    /// caller's streaming options. Errors before the stream is established
    /// are returned directly; later failures arrive in-band as a terminal
    /// error chunk.
    async fn execute_stream(
        &self,
        request: &ChatRequest,
        options: StreamOptions,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream, GatewayError>;

    /// Liveness probe. Defaults to healthy for backends without one.
    async fn health_check(&self) -> bool {
        true
    }

    /// Estimated cost of the request in dollars, if this backend can price
    /// it.
    fn estimate_cost(&self, _request: &ChatRequest) -> Option<f64> {
        None
    }

    /// Models this backend can serve. Defaults to an empty static listing.
    async fn list_models(&self) -> Result<ModelList, GatewayError> {
        Ok(ModelList::empty_static())
    }
}

/// Split system messages out of a conversation according to the target
/// backend's capabilities.
///
/// Returns the extracted system text (if the backend wants it as a
/// separate parameter) and the remaining messages. When the backend keeps
/// system messages inline but supports only one, consecutive system
/// messages are collapsed into the first.
pub fn normalize_system_messages(
    messages: &[Message],
    capabilities: &AdapterCapabilities,
) -> (Option<String>, Vec<Message>) {
    match capabilities.system_message_strategy {
        SystemMessageStrategy::SeparateParameter => {
            let system: Vec<String> = messages
                .iter()
                .filter(|m| m.role == Role::System)
                .map(|m| m.text_content())
                .collect();
            let rest: Vec<Message> = messages
                .iter()
                .filter(|m| m.role != Role::System)
                .cloned()
                .collect();
            let system = if system.is_empty() {
                None
            } else {
                Some(system.join("\n\n"))
            };
            (system, rest)
        }
        SystemMessageStrategy::InMessages => {
            if capabilities.supports_multiple_system_messages {
                return (None, messages.to_vec());
            }
            // Merge all system text into one leading system message.
            let system: Vec<String> = messages
                .iter()
                .filter(|m| m.role == Role::System)
                .map(|m| m.text_content())
                .collect();
            if system.len() <= 1 {
                return (None, messages.to_vec());
            }
            let mut merged = vec![Message::text(Role::System, system.join("\n\n"))];
            merged.extend(
                messages
                    .iter()
                    .filter(|m| m.role != Role::System)
                    .cloned(),
            );
            (None, merged)
        }
    }
}
