//! OpenAI chat-completions adapter: frontend (wire format to and from IR)
//! and backend (IR execution against the API).

use super::{
    AdapterCapabilities, AdapterMetadata, AiModel, ChunkStream, EventStream, Frontend, ModelList,
    ModelListSource, Pricing, SystemMessageStrategy,
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

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

fn adapter_metadata() -> AdapterMetadata {
    AdapterMetadata {
        name: "openai".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        provider: "openai".to_string(),
        capabilities: AdapterCapabilities {
            streaming: true,
            multi_modal: true,
            tools: true,
            max_context_tokens: None,
            system_message_strategy: SystemMessageStrategy::InMessages,
            supports_multiple_system_messages: true,
        },
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(default)]
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded argument object, as the wire format ships it.
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    id: String,
    model: String,
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<WireStreamChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    delta: WireDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct WireToolCallDelta {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
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

fn parse_role(role: &str) -> Result<Role, GatewayError> {
    match role {
        "system" | "developer" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "tool" => Ok(Role::Tool),
        other => Err(GatewayError::validation(
            "UNKNOWN_ROLE",
            format!("unknown message role '{other}'"),
        )),
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn parse_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("length") => FinishReason::Length,
        Some("tool_calls") => FinishReason::ToolCalls,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

fn finish_reason_name(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "stop",
        FinishReason::Length => "length",
        FinishReason::ToolCalls => "tool_calls",
        FinishReason::ContentFilter => "content_filter",
        FinishReason::Error => "stop",
    }
}

/// Parse wire content: a plain string or an array of typed parts.
fn parse_content(content: serde_json::Value) -> Result<MessageContent, GatewayError> {
    match content {
        serde_json::Value::String(text) => Ok(MessageContent::Text(text)),
        serde_json::Value::Array(parts) => {
            let mut blocks = Vec::with_capacity(parts.len());
            for part in parts {
                let kind = part["type"].as_str().unwrap_or_default().to_string();
                match kind.as_str() {
                    "text" => blocks.push(ContentBlock::Text {
                        text: part["text"].as_str().unwrap_or_default().to_string(),
                    }),
                    "image_url" => blocks.push(ContentBlock::Image {
                        source: ImageSource::Url {
                            url: part["image_url"]["url"]
                                .as_str()
                                .unwrap_or_default()
                                .to_string(),
                        },
                    }),
                    other => {
                        return Err(GatewayError::validation(
                            "UNKNOWN_CONTENT_PART",
                            format!("unknown content part type '{other}'"),
                        ))
                    }
                }
            }
            Ok(MessageContent::Blocks(blocks))
        }
        other => Err(GatewayError::validation(
            "BAD_CONTENT",
            format!("unsupported content shape: {other}"),
        )),
    }
}

fn parse_message(wire: WireMessage) -> Result<Message, GatewayError> {
    let role = parse_role(&wire.role)?;
    if !wire.tool_calls.is_empty() {
        let mut blocks = Vec::new();
        if let Some(content) = wire.content {
            if let MessageContent::Text(text) = parse_content(content)? {
                if !text.is_empty() {
                    blocks.push(ContentBlock::Text { text });
                }
            }
        }
        for call in wire.tool_calls {
            blocks.push(ContentBlock::ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: serde_json::from_str(&call.function.arguments)
                    .unwrap_or(serde_json::Value::Null),
            });
        }
        return Ok(Message {
            role,
            content: MessageContent::Blocks(blocks),
        });
    }
    if let Some(tool_call_id) = wire.tool_call_id {
        let content = wire
            .content
            .and_then(|c| c.as_str().map(str::to_string))
            .unwrap_or_default();
        return Ok(Message {
            role,
            content: MessageContent::Blocks(vec![ContentBlock::ToolResult {
                tool_call_id,
                content,
                is_error: None,
            }]),
        });
    }
    let content = wire.content.ok_or_else(|| {
        GatewayError::validation("EMPTY_MESSAGE", "message has neither content nor tool calls")
    })?;
    Ok(Message {
        role,
        content: parse_content(content)?,
    })
}

fn wire_message(message: &Message) -> WireMessage {
    let mut tool_calls = Vec::new();
    let mut tool_call_id = None;
    let content = match &message.content {
        MessageContent::Text(text) => Some(serde_json::Value::String(text.clone())),
        MessageContent::Blocks(blocks) => {
            let mut parts = Vec::new();
            let mut result_text = None;
            for block in blocks {
                match block {
                    ContentBlock::Text { text } => {
                        parts.push(serde_json::json!({"type": "text", "text": text}));
                    }
                    ContentBlock::Image { source } => {
                        let url = match source {
                            ImageSource::Url { url } => url.clone(),
                            ImageSource::Base64 { media_type, data } => {
                                format!("data:{media_type};base64,{data}")
                            }
                        };
                        parts.push(serde_json::json!({
                            "type": "image_url",
                            "image_url": {"url": url},
                        }));
                    }
                    ContentBlock::ToolCall { id, name, arguments } => {
                        tool_calls.push(WireToolCall {
                            id: id.clone(),
                            kind: "function".to_string(),
                            function: WireFunctionCall {
                                name: name.clone(),
                                arguments: arguments.to_string(),
                            },
                        });
                    }
                    ContentBlock::ToolResult { tool_call_id: id, content, .. } => {
                        tool_call_id = Some(id.clone());
                        result_text = Some(content.clone());
                    }
                }
            }
            if let Some(text) = result_text {
                Some(serde_json::Value::String(text))
            } else if parts.is_empty() {
                None
            } else {
                Some(serde_json::Value::Array(parts))
            }
        }
    };
    WireMessage {
        role: role_name(message.role).to_string(),
        content,
        tool_calls,
        tool_call_id,
    }
}

fn wire_request(request: &ChatRequest) -> WireRequest {
    WireRequest {
        model: request.parameters.model.clone(),
        messages: request.messages.iter().map(wire_message).collect(),
        temperature: request.parameters.temperature,
        top_p: request.parameters.top_p,
        max_tokens: request.parameters.max_tokens,
        stop: request.parameters.stop_sequences.clone(),
        tools: request.parameters.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|t| WireTool {
                    kind: "function".to_string(),
                    function: WireFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect()
        }),
        stream: request.stream,
    }
}

// ---------------------------------------------------------------------------
// Frontend
// ---------------------------------------------------------------------------

/// Speaks the chat-completions wire format to clients.
pub struct OpenAiFrontend {
    metadata: AdapterMetadata,
}

impl OpenAiFrontend {
    pub fn new() -> Self {
        Self {
            metadata: adapter_metadata(),
        }
    }
}

impl Default for OpenAiFrontend {
    fn default() -> Self {
        Self::new()
    }
}

impl Frontend for OpenAiFrontend {
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
        let messages = wire
            .messages
            .into_iter()
            .map(parse_message)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ChatRequest {
            messages,
            parameters: Parameters {
                temperature: wire.temperature,
                top_p: wire.top_p,
                top_k: None,
                max_tokens: wire.max_tokens,
                stop_sequences: wire.stop,
                tools: wire.tools.map(|tools| {
                    tools
                        .into_iter()
                        .map(|t| ToolDefinition {
                            name: t.function.name,
                            description: t.function.description,
                            parameters: t.function.parameters,
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
        let message = wire_message(&response.message);
        Ok(serde_json::json!({
            "id": format!("chatcmpl-{}", response.metadata.request_id),
            "object": "chat.completion",
            "created": response.metadata.timestamp.timestamp(),
            "model": response.metadata.provenance.backend.clone().unwrap_or_default(),
            "choices": [{
                "index": 0,
                "message": message,
                "finish_reason": finish_reason_name(response.finish_reason),
            }],
            "usage": response.usage.map(|u| serde_json::json!({
                "prompt_tokens": u.prompt_tokens,
                "completion_tokens": u.completion_tokens,
                "total_tokens": u.total_tokens,
            })),
        }))
    }

    fn from_ir_stream(&self, mut chunks: ChunkStream, options: StreamOptions) -> EventStream {
        Box::pin(async_stream::stream! {
            let mut id = String::new();
            let mut model = String::new();
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    StreamChunk::Start { request_id, model: m, .. } => {
                        id = format!("chatcmpl-{request_id}");
                        model = m.unwrap_or_default();
                    }
                    StreamChunk::Content { delta, accumulated, .. } => {
                        // Accumulated mode carries the running text in the
                        // content slot; the wire has no second slot for it.
                        let text = match options.mode {
                            StreamMode::Accumulated => accumulated.unwrap_or(delta),
                            StreamMode::Delta => delta,
                        };
                        let frame = serde_json::json!({
                            "id": id,
                            "object": "chat.completion.chunk",
                            "model": model,
                            "choices": [{
                                "index": 0,
                                "delta": {"content": text},
                                "finish_reason": serde_json::Value::Null,
                            }],
                        });
                        yield Ok(format!("data: {frame}\n\n"));
                    }
                    StreamChunk::ToolCall { id: call_id, name, arguments_delta, .. } => {
                        let frame = serde_json::json!({
                            "id": id,
                            "object": "chat.completion.chunk",
                            "model": model,
                            "choices": [{
                                "index": 0,
                                "delta": {"tool_calls": [{
                                    "index": 0,
                                    "id": call_id,
                                    "function": {"name": name, "arguments": arguments_delta},
                                }]},
                                "finish_reason": serde_json::Value::Null,
                            }],
                        });
                        yield Ok(format!("data: {frame}\n\n"));
                    }
                    StreamChunk::Done { finish_reason, usage, .. } => {
                        let frame = serde_json::json!({
                            "id": id,
                            "object": "chat.completion.chunk",
                            "model": model,
                            "choices": [{
                                "index": 0,
                                "delta": {},
                                "finish_reason": finish_reason_name(finish_reason),
                            }],
                            "usage": usage.map(|u| serde_json::json!({
                                "prompt_tokens": u.prompt_tokens,
                                "completion_tokens": u.completion_tokens,
                                "total_tokens": u.total_tokens,
                            })),
                        });
                        yield Ok(format!("data: {frame}\n\n"));
                        yield Ok("data: [DONE]\n\n".to_string());
                        return;
                    }
                    StreamChunk::Error { error, .. } => {
                        let frame = serde_json::json!({
                            "error": {
                                "message": error.message,
                                "type": error_type(error.category),
                                "code": error.code,
                            }
                        });
                        yield Ok(format!("data: {frame}\n\n"));
                        return;
                    }
                }
            }
        })
    }

    fn error_envelope(&self, error: &GatewayError) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "message": error.message,
                "type": error_type(error.category),
                "code": error.code,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub organization: Option<String>,
    pub timeout: Duration,
    /// Cost per 1k tokens, used for request cost estimation.
    pub pricing: Option<Pricing>,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            organization: None,
            timeout: Duration::from_secs(120),
            pricing: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = Some(pricing);
        self
    }
}

/// Executes IR requests against the chat-completions API.
pub struct OpenAiBackend {
    metadata: AdapterMetadata,
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self, GatewayError> {
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

    fn request_builder(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(format!("{}{path}", self.config.base_url))
            .bearer_auth(&self.config.api_key);
        if let Some(org) = &self.config.organization {
            builder = builder.header("OpenAI-Organization", org);
        }
        builder
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
            400..=499 => GatewayError::validation(&code, message),
            _ => GatewayError::provider(&code, message).retryable(true),
        })
    }
}

#[async_trait]
impl super::Backend for OpenAiBackend {
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
                .request_builder("/chat/completions")
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

        tracing::debug!(id = %body.id, model = %body.model, "completion received");
        let choice = body.choices.into_iter().next().ok_or_else(|| {
            GatewayError::conversion("NO_CHOICES", "response contained no choices")
        })?;
        Ok(ChatResponse {
            message: parse_message(choice.message)
                .map_err(|e| GatewayError::conversion("BAD_MESSAGE", e.message))?,
            finish_reason: parse_finish_reason(choice.finish_reason.as_deref()),
            usage: body.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
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
            .request_builder("/chat/completions")
            .json(&wire)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let cancel = cancel.clone();
        let mut body = response.bytes_stream();
        let events = async_stream::stream! {
            let mut buffer = String::new();
            let mut started = false;
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
                    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                        continue;
                    };
                    if data == "[DONE]" {
                        return;
                    }
                    let parsed: WireStreamChunk = match serde_json::from_str(data) {
                        Ok(parsed) => parsed,
                        Err(error) => {
                            yield BackendEvent::TransportError(GatewayError::streaming(
                                "BAD_EVENT",
                                format!("unparseable stream event: {error}"),
                            ));
                            return;
                        }
                    };
                    if !started {
                        started = true;
                        yield BackendEvent::Start { model: parsed.model.clone() };
                    }
                    for choice in &parsed.choices {
                        if let Some(content) = &choice.delta.content {
                            if !content.is_empty() {
                                yield BackendEvent::Delta(content.clone());
                            }
                        }
                        for call in &choice.delta.tool_calls {
                            yield BackendEvent::ToolCallDelta {
                                id: call.id.clone(),
                                name: call.function.as_ref().and_then(|f| f.name.clone()),
                                arguments: call
                                    .function
                                    .as_ref()
                                    .and_then(|f| f.arguments.clone())
                                    .unwrap_or_default(),
                            };
                        }
                        if let Some(reason) = &choice.finish_reason {
                            yield BackendEvent::Done {
                                finish_reason: parse_finish_reason(Some(reason)),
                                usage: parsed.usage.map(|u| Usage {
                                    prompt_tokens: u.prompt_tokens,
                                    completion_tokens: u.completion_tokens,
                                    total_tokens: u.total_tokens,
                                }),
                            };
                            return;
                        }
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

    fn estimate_cost(&self, request: &ChatRequest) -> Option<f64> {
        let pricing = self.config.pricing?;
        let bpe = tiktoken_rs::get_bpe_from_model(&request.parameters.model)
            .or_else(|_| tiktoken_rs::cl100k_base())
            .ok()?;
        let prompt_tokens: usize = request
            .messages
            .iter()
            .map(|m| bpe.encode_with_special_tokens(&m.text_content()).len())
            .sum();
        let input_cost = prompt_tokens as f64 / 1000.0 * pricing.input;
        let output_cost = request
            .parameters
            .max_tokens
            .map(|t| t as f64 / 1000.0 * pricing.output)
            .unwrap_or(0.0);
        Some(input_cost + output_cost)
    }

    async fn list_models(&self) -> Result<ModelList, GatewayError> {
        let response = self
            .client
            .get(format!("{}/models", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let body: serde_json::Value = response.json().await?;
        let models = body["data"]
            .as_array()
            .map(|data| {
                data.iter()
                    .filter_map(|m| m["id"].as_str())
                    .map(|id| AiModel {
                        id: id.to_string(),
                        name: id.to_string(),
                        capabilities: None,
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
