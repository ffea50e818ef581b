//! Anthropic messages-API adapter.
//!
//! Unlike the chat-completions format, this wire format carries system
//! text as a top-level `system` parameter and streams named SSE events
//! (`message_start`, `content_block_delta`, `message_delta`,
//! `message_stop`).

use super::{
    normalize_system_messages, AdapterCapabilities, AdapterMetadata, AiModel, ChunkStream,
    EventStream, Frontend, ModelList, ModelListSource, SystemMessageStrategy,
};
use crate::error::{ErrorCategory, GatewayError};
use crate::ir::{
    ChatRequest, ChatResponse, ContentBlock, FinishReason, ImageSource, Message, MessageContent,
    Parameters, RequestMetadata, Role, StreamChunk, ToolDefinition, Usage,
};
use crate::stream::{translate_stream, BackendEvent, StreamMode, StreamOptions};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

fn adapter_metadata() -> AdapterMetadata {
    AdapterMetadata {
        name: "anthropic".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        provider: "anthropic".to_string(),
        capabilities: AdapterCapabilities {
            streaming: true,
            multi_modal: true,
            tools: true,
            max_context_tokens: None,
            system_message_strategy: SystemMessageStrategy::SeparateParameter,
            supports_multiple_system_messages: false,
        },
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct WireRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(default)]
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireTool {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    id: String,
    model: String,
    content: Vec<serde_json::Value>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(wire: WireUsage) -> Self {
        Usage {
            prompt_tokens: wire.input_tokens,
            completion_tokens: wire.output_tokens,
            total_tokens: wire.input_tokens + wire.output_tokens,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn error_type(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Authentication => "authentication_error",
        ErrorCategory::Authorization => "permission_error",
        ErrorCategory::RateLimit => "rate_limit_error",
        ErrorCategory::Validation => "invalid_request_error",
        _ => "api_error",
    }
}

fn parse_stop_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

fn stop_reason_name(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "end_turn",
        FinishReason::Length => "max_tokens",
        FinishReason::ToolCalls => "tool_use",
        FinishReason::ContentFilter | FinishReason::Error => "end_turn",
    }
}

fn parse_block(block: &serde_json::Value) -> Result<ContentBlock, GatewayError> {
    match block["type"].as_str().unwrap_or_default() {
        "text" => Ok(ContentBlock::Text {
            text: block["text"].as_str().unwrap_or_default().to_string(),
        }),
        "image" => {
            let source = &block["source"];
            let source = match source["type"].as_str().unwrap_or_default() {
                "base64" => ImageSource::Base64 {
                    media_type: source["media_type"].as_str().unwrap_or_default().to_string(),
                    data: source["data"].as_str().unwrap_or_default().to_string(),
                },
                "url" => ImageSource::Url {
                    url: source["url"].as_str().unwrap_or_default().to_string(),
                },
                other => {
                    return Err(GatewayError::validation(
                        "BAD_IMAGE_SOURCE",
                        format!("unknown image source type '{other}'"),
                    ))
                }
            };
            Ok(ContentBlock::Image { source })
        }
        "tool_use" => Ok(ContentBlock::ToolCall {
            id: block["id"].as_str().unwrap_or_default().to_string(),
            name: block["name"].as_str().unwrap_or_default().to_string(),
            arguments: block["input"].clone(),
        }),
        "tool_result" => Ok(ContentBlock::ToolResult {
            tool_call_id: block["tool_use_id"].as_str().unwrap_or_default().to_string(),
            content: match &block["content"] {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            },
            is_error: block["is_error"].as_bool(),
        }),
        other => Err(GatewayError::validation(
            "UNKNOWN_CONTENT_BLOCK",
            format!("unknown content block type '{other}'"),
        )),
    }
}

fn parse_content(content: &serde_json::Value) -> Result<MessageContent, GatewayError> {
    match content {
        serde_json::Value::String(text) => Ok(MessageContent::Text(text.clone())),
        serde_json::Value::Array(blocks) => Ok(MessageContent::Blocks(
            blocks.iter().map(parse_block).collect::<Result<_, _>>()?,
        )),
        other => Err(GatewayError::validation(
            "BAD_CONTENT",
            format!("unsupported content shape: {other}"),
        )),
    }
}

fn wire_block(block: &ContentBlock) -> serde_json::Value {
    match block {
        ContentBlock::Text { text } => serde_json::json!({"type": "text", "text": text}),
        ContentBlock::Image { source } => {
            let source = match source {
                ImageSource::Base64 { media_type, data } => serde_json::json!({
                    "type": "base64", "media_type": media_type, "data": data,
                }),
                ImageSource::Url { url } => serde_json::json!({"type": "url", "url": url}),
            };
            serde_json::json!({"type": "image", "source": source})
        }
        ContentBlock::ToolCall { id, name, arguments } => serde_json::json!({
            "type": "tool_use", "id": id, "name": name, "input": arguments,
        }),
        ContentBlock::ToolResult { tool_call_id, content, is_error } => serde_json::json!({
            "type": "tool_result",
            "tool_use_id": tool_call_id,
            "content": content,
            "is_error": is_error,
        }),
    }
}

fn wire_content(content: &MessageContent) -> serde_json::Value {
    match content {
        MessageContent::Text(text) => serde_json::Value::String(text.clone()),
        MessageContent::Blocks(blocks) => {
            serde_json::Value::Array(blocks.iter().map(wire_block).collect())
        }
    }
}

/// Build the wire request, lifting system messages into the `system`
/// parameter. Tool-result messages keep the `user` role on the wire.
fn wire_request(request: &ChatRequest) -> WireRequest {
    let (system, messages) =
        normalize_system_messages(&request.messages, &adapter_metadata().capabilities);
    WireRequest {
        model: request.parameters.model.clone(),
        max_tokens: request.parameters.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        messages: messages
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    Role::Assistant => "assistant".to_string(),
                    _ => "user".to_string(),
                },
                content: wire_content(&m.content),
            })
            .collect(),
        system,
        temperature: request.parameters.temperature,
        top_p: request.parameters.top_p,
        top_k: request.parameters.top_k,
        stop_sequences: request.parameters.stop_sequences.clone(),
        tools: request.parameters.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|t| WireTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters.clone(),
                })
                .collect()
        }),
        stream: request.stream,
    }
}

// ---------------------------------------------------------------------------
// Frontend
// ---------------------------------------------------------------------------

/// Speaks the messages-API wire format to clients.
pub struct AnthropicFrontend {
    metadata: AdapterMetadata,
}

impl AnthropicFrontend {
    pub fn new() -> Self {
        Self {
            metadata: adapter_metadata(),
        }
    }
}

impl Default for AnthropicFrontend {
    fn default() -> Self {
        Self::new()
    }
}

impl Frontend for AnthropicFrontend {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    fn to_ir(&self, request: serde_json::Value) -> Result<ChatRequest, GatewayError> {
        let wire: WireRequest = serde_json::from_value(request)
            .map_err(|e| GatewayError::validation("MALFORMED_REQUEST", e.to_string()))?;
        if wire.model.is_empty() {
            return Err(GatewayError::validation("MISSING_MODEL", "model is required"));
        }
        if wire.messages.is_empty() {
            return Err(GatewayError::validation(
                "EMPTY_MESSAGES",
                "at least one message is required",
            ));
        }
        let mut messages = Vec::with_capacity(wire.messages.len() + 1);
        // The system parameter becomes a leading system message in IR.
        if let Some(system) = wire.system.filter(|s| !s.is_empty()) {
            messages.push(Message::text(Role::System, system));
        }
        for m in wire.messages {
            let role = match m.role.as_str() {
                "user" => Role::User,
                "assistant" => Role::Assistant,
                other => {
                    return Err(GatewayError::validation(
                        "UNKNOWN_ROLE",
                        format!("unknown message role '{other}'"),
                    ))
                }
            };
            messages.push(Message {
                role,
                content: parse_content(&m.content)?,
            });
        }
        Ok(ChatRequest {
            messages,
            parameters: Parameters {
                temperature: wire.temperature,
                top_p: wire.top_p,
                top_k: wire.top_k,
                max_tokens: Some(wire.max_tokens),
                stop_sequences: wire.stop_sequences,
                tools: wire.tools.map(|tools| {
                    tools
                        .into_iter()
                        .map(|t| ToolDefinition {
                            name: t.name,
                            description: t.description,
                            parameters: t.input_schema,
                        })
                        .collect()
                }),
                ..Parameters::for_model(wire.model)
            },
            metadata: RequestMetadata::new(),
            stream: wire.stream,
        })
    }

    fn from_ir(&self, response: &ChatResponse) -> Result<serde_json::Value, GatewayError> {
        let content = match &response.message.content {
            MessageContent::Text(text) => {
                vec![serde_json::json!({"type": "text", "text": text})]
            }
            MessageContent::Blocks(blocks) => blocks.iter().map(wire_block).collect(),
        };
        Ok(serde_json::json!({
            "id": format!("msg_{}", response.metadata.request_id),
            "type": "message",
            "role": "assistant",
            "content": content,
            "stop_reason": stop_reason_name(response.finish_reason),
            "usage": response.usage.map(|u| serde_json::json!({
                "input_tokens": u.prompt_tokens,
                "output_tokens": u.completion_tokens,
            })),
        }))
    }

    fn from_ir_stream(&self, mut chunks: ChunkStream, options: StreamOptions) -> EventStream {
        fn frame(event: &str, data: serde_json::Value) -> String {
            format!("event: {event}\ndata: {data}\n\n")
        }
        Box::pin(async_stream::stream! {
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    StreamChunk::Start { request_id, model, .. } => {
                        yield Ok(frame("message_start", serde_json::json!({
                            "type": "message_start",
                            "message": {
                                "id": format!("msg_{request_id}"),
                                "type": "message",
                                "role": "assistant",
                                "model": model,
                                "content": [],
                            },
                        })));
                        yield Ok(frame("content_block_start", serde_json::json!({
                            "type": "content_block_start",
                            "index": 0,
                            "content_block": {"type": "text", "text": ""},
                        })));
                    }
                    StreamChunk::Content { delta, accumulated, .. } => {
                        let text = match options.mode {
                            StreamMode::Accumulated => accumulated.unwrap_or(delta),
                            StreamMode::Delta => delta,
                        };
                        yield Ok(frame("content_block_delta", serde_json::json!({
                            "type": "content_block_delta",
                            "index": 0,
                            "delta": {"type": "text_delta", "text": text},
                        })));
                    }
                    StreamChunk::ToolCall { arguments_delta, .. } => {
                        yield Ok(frame("content_block_delta", serde_json::json!({
                            "type": "content_block_delta",
                            "index": 0,
                            "delta": {"type": "input_json_delta", "partial_json": arguments_delta},
                        })));
                    }
                    StreamChunk::Done { finish_reason, usage, .. } => {
                        yield Ok(frame("content_block_stop", serde_json::json!({
                            "type": "content_block_stop",
                            "index": 0,
                        })));
                        yield Ok(frame("message_delta", serde_json::json!({
                            "type": "message_delta",
                            "delta": {"stop_reason": stop_reason_name(finish_reason)},
                            "usage": usage.map(|u| serde_json::json!({
                                "output_tokens": u.completion_tokens,
                            })),
                        })));
                        yield Ok(frame("message_stop", serde_json::json!({
                            "type": "message_stop",
                        })));
                        return;
                    }
                    StreamChunk::Error { error, .. } => {
                        yield Ok(frame("error", serde_json::json!({
                            "type": "error",
                            "error": {
                                "type": error_type(error.category),
                                "message": error.message,
                            },
                        })));
                        return;
                    }
                }
            }
        })
    }

    fn error_envelope(&self, error: &GatewayError) -> serde_json::Value {
        serde_json::json!({
            "type": "error",
            "error": {
                "type": error_type(error.category),
                "message": error.message,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Executes IR requests against the messages API.
pub struct AnthropicBackend {
    metadata: AdapterMetadata,
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(config: AnthropicConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(GatewayError::from)?;
        Ok(Self {
            metadata: adapter_metadata(),
            config,
            client,
        })
    }

    fn request_builder(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or(body);
        let code = format!("HTTP_{}", status.as_u16());
        Err(match status.as_u16() {
            401 => GatewayError::authentication(&code, message),
            403 => GatewayError::authorization(&code, message),
            429 => GatewayError::rate_limit(&code, message),
            529 => GatewayError::provider(&code, message).retryable(true),
            400..=499 => GatewayError::validation(&code, message),
            _ => GatewayError::provider(&code, message).retryable(true),
        })
    }
}

#[async_trait]
impl super::Backend for AnthropicBackend {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn execute(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, GatewayError> {
        let mut wire = wire_request(request);
        wire.stream = false;
        let send = async {
            let response = self
                .request_builder(reqwest::Method::POST, "/v1/messages")
                .json(&wire)
                .send()
                .await?;
            let response = Self::check_status(response).await?;
            let body: WireResponse = response.json().await?;
            Ok::<WireResponse, GatewayError>(body)
        };
        let body = tokio::select! {
            result = send => result?,
            _ = cancel.cancelled() => return Err(GatewayError::cancelled()),
        };

        tracing::debug!(id = %body.id, model = %body.model, "message received");
        let blocks = body
            .content
            .iter()
            .map(parse_block)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| GatewayError::conversion("BAD_MESSAGE", e.message))?;
        Ok(ChatResponse {
            message: Message {
                role: Role::Assistant,
                content: MessageContent::Blocks(blocks),
            },
            finish_reason: parse_stop_reason(body.stop_reason.as_deref()),
            usage: body.usage.map(Usage::from),
            metadata: request.metadata.clone(),
            raw: None,
        })
    }

    async fn execute_stream(
        &self,
        request: &ChatRequest,
        options: StreamOptions,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream, GatewayError> {
        let mut wire = wire_request(request);
        wire.stream = true;
        let response = self
            .request_builder(reqwest::Method::POST, "/v1/messages")
            .json(&wire)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let cancel = cancel.clone();
        let mut body = response.bytes_stream();
        let events = async_stream::stream! {
            let mut buffer = String::new();
            // Accumulated across message_delta and message_stop.
            let mut finish_reason = FinishReason::Stop;
            let mut usage = WireUsage::default();
            loop {
                let bytes = tokio::select! {
                    next = body.next() => next,
                    _ = cancel.cancelled() => {
                        yield BackendEvent::TransportError(GatewayError::cancelled());
                        return;
                    }
                };
                let bytes = match bytes {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(error)) => {
                        yield BackendEvent::TransportError(GatewayError::from(error));
                        return;
                    }
                    None => return,
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);
                    // Event names are redundant with the data payload's
                    // `type` field; only data lines are parsed.
                    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                        continue;
                    };
                    let event: serde_json::Value = match serde_json::from_str(data) {
                        Ok(event) => event,
                        Err(error) => {
                            yield BackendEvent::TransportError(GatewayError::streaming(
                                "BAD_EVENT",
                                format!("unparseable stream event: {error}"),
                            ));
                            return;
                        }
                    };
                    match event["type"].as_str().unwrap_or_default() {
                        "message_start" => {
                            if let Ok(u) = serde_json::from_value::<WireUsage>(
                                event["message"]["usage"].clone(),
                            ) {
                                usage.input_tokens = u.input_tokens;
                            }
                            yield BackendEvent::Start {
                                model: event["message"]["model"].as_str().map(str::to_string),
                            };
                        }
                        "content_block_start" => {
                            let block = &event["content_block"];
                            if block["type"] == "tool_use" {
                                yield BackendEvent::ToolCallDelta {
                                    id: block["id"].as_str().map(str::to_string),
                                    name: block["name"].as_str().map(str::to_string),
                                    arguments: String::new(),
                                };
                            }
                        }
                        "content_block_delta" => match event["delta"]["type"].as_str() {
                            Some("text_delta") => {
                                let text = event["delta"]["text"].as_str().unwrap_or_default();
                                if !text.is_empty() {
                                    yield BackendEvent::Delta(text.to_string());
                                }
                            }
                            Some("input_json_delta") => {
                                yield BackendEvent::ToolCallDelta {
                                    id: None,
                                    name: None,
                                    arguments: event["delta"]["partial_json"]
                                        .as_str()
                                        .unwrap_or_default()
                                        .to_string(),
                                };
                            }
                            _ => {}
                        },
                        "message_delta" => {
                            if let Some(reason) = event["delta"]["stop_reason"].as_str() {
                                finish_reason = parse_stop_reason(Some(reason));
                            }
                            if let Some(out) = event["usage"]["output_tokens"].as_u64() {
                                usage.output_tokens = out as u32;
                            }
                        }
                        "message_stop" => {
                            yield BackendEvent::Done {
                                finish_reason,
                                usage: Some(Usage::from(usage)),
                            };
                            return;
                        }
                        "error" => {
                            yield BackendEvent::TransportError(GatewayError::provider(
                                "STREAM_ERROR",
                                event["error"]["message"].as_str().unwrap_or("stream error"),
                            ));
                            return;
                        }
                        // ping, content_block_stop
                        _ => {}
                    }
                }
            }
        };
        Ok(translate_stream(
            request.metadata.request_id.clone(),
            options,
            Box::pin(events),
        ))
    }

    async fn list_models(&self) -> Result<ModelList, GatewayError> {
        let response = self
            .request_builder(reqwest::Method::GET, "/v1/models")
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let body: serde_json::Value = response.json().await?;
        let models = body["data"]
            .as_array()
            .map(|data| {
                data.iter()
                    .filter_map(|m| {
                        let id = m["id"].as_str()?;
                        Some(AiModel {
                            id: id.to_string(),
                            name: m["display_name"].as_str().unwrap_or(id).to_string(),
                            capabilities: None,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(ModelList {
            models,
            source: ModelListSource::Remote,
            fetched_at: Utc::now(),
            is_complete: true,
        })
    }
}
