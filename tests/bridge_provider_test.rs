//! End-to-end bridge tests against mocked provider APIs.
//!
//! Covers same-protocol round trips, cross-protocol translation (client
//! speaks one wire format, upstream speaks another), error-envelope
//! reconstruction, and streaming over SSE.

use futures_util::StreamExt;
use prism::adapter::{
    AnthropicBackend, AnthropicConfig, AnthropicFrontend, OpenAiBackend, OpenAiConfig,
    OpenAiFrontend,
};
use prism::bridge::Bridge;
use prism::error::ErrorCategory;
use prism::stream::{StreamMode, StreamOptions};
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn openai_backend(server: &MockServer) -> Arc<OpenAiBackend> {
    Arc::new(
        OpenAiBackend::new(OpenAiConfig::new("sk-test").with_base_url(server.uri())).unwrap(),
    )
}

fn anthropic_backend(server: &MockServer) -> Arc<AnthropicBackend> {
    Arc::new(
        AnthropicBackend::new(AnthropicConfig::new("sk-ant-test").with_base_url(server.uri()))
            .unwrap(),
    )
}

fn openai_completion(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1677652288,
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

fn anthropic_message(text: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "msg_123",
        "type": "message",
        "role": "assistant",
        "model": "claude-sonnet-4",
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 10, "output_tokens": 5}
    })
}

fn openai_request(model: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [{"role": "user", "content": "Hi"}]
    })
}

#[tokio::test]
async fn openai_to_openai_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_completion("Hello!")))
        .mount(&server)
        .await;

    let bridge = Bridge::new(Arc::new(OpenAiFrontend::new()), openai_backend(&server));
    let response = bridge.chat(openai_request("gpt-4o")).await.unwrap();

    assert_eq!(response["object"], "chat.completion");
    assert_eq!(response["choices"][0]["message"]["content"], "Hello!");
    assert_eq!(response["choices"][0]["finish_reason"], "stop");
    assert_eq!(response["usage"]["total_tokens"], 15);
}

#[tokio::test]
async fn anthropic_to_anthropic_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(body_partial_json(serde_json::json!({"system": "be brief"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_message("Hello!")))
        .mount(&server)
        .await;

    let bridge = Bridge::new(Arc::new(AnthropicFrontend::new()), anthropic_backend(&server));
    let response = bridge
        .chat(serde_json::json!({
            "model": "claude-sonnet-4",
            "max_tokens": 256,
            "system": "be brief",
            "messages": [{"role": "user", "content": "Hi"}]
        }))
        .await
        .unwrap();

    assert_eq!(response["type"], "message");
    assert_eq!(response["content"][0]["text"], "Hello!");
    assert_eq!(response["stop_reason"], "end_turn");
}

#[tokio::test]
async fn openai_client_against_anthropic_upstream() {
    let server = MockServer::start().await;
    // The upstream must receive the messages-API shape: system lifted out
    // of the message list.
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(serde_json::json!({
            "system": "be brief",
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_message("Bonjour")))
        .mount(&server)
        .await;

    let bridge = Bridge::new(Arc::new(OpenAiFrontend::new()), anthropic_backend(&server));
    let response = bridge
        .chat(serde_json::json!({
            "model": "claude-sonnet-4",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "Hi"}
            ]
        }))
        .await
        .unwrap();

    // The client still receives the chat-completions shape.
    assert_eq!(response["object"], "chat.completion");
    assert_eq!(response["choices"][0]["message"]["content"], "Bonjour");
}

#[tokio::test]
async fn upstream_auth_failure_maps_to_authentication_category() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let bridge = Bridge::new(Arc::new(OpenAiFrontend::new()), openai_backend(&server));
    let err = bridge.chat(openai_request("gpt-4o")).await.unwrap_err();

    assert_eq!(err.category, ErrorCategory::Authentication);
    assert_eq!(err.code, "HTTP_401");
    assert!(err.message.contains("Incorrect API key"));

    // And the frontend can re-serialize it for the client.
    let envelope = bridge.error_response(&err);
    assert_eq!(envelope["error"]["type"], "authentication_error");
}

#[tokio::test]
async fn rate_limit_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": {"message": "Rate limit reached", "type": "rate_limit_error"}
        })))
        .mount(&server)
        .await;

    let bridge = Bridge::new(Arc::new(OpenAiFrontend::new()), openai_backend(&server));
    let err = bridge.chat(openai_request("gpt-4o")).await.unwrap_err();

    assert_eq!(err.category, ErrorCategory::RateLimit);
    assert!(err.retryable);
}

#[tokio::test]
async fn openai_sse_stream_is_reserialized_for_the_client() {
    let server = MockServer::start().await;
    let sse_body = concat!(
        "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n",
        "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":null}]}\n\n",
        "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let bridge = Bridge::new(Arc::new(OpenAiFrontend::new()), openai_backend(&server));
    let mut request = openai_request("gpt-4o");
    request["stream"] = serde_json::json!(true);
    let events: Vec<String> = bridge
        .chat_stream(request, StreamOptions::default())
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;

    let deltas: String = events
        .iter()
        .filter_map(|e| e.strip_prefix("data: "))
        .filter(|d| !d.starts_with("[DONE]"))
        .map(|d| {
            serde_json::from_str::<serde_json::Value>(d.trim()).unwrap()["choices"][0]["delta"]
                ["content"]
                .as_str()
                .unwrap_or("")
                .to_string()
        })
        .collect();
    assert_eq!(deltas, "Hello");
    assert_eq!(events.last().unwrap(), "data: [DONE]\n\n");
}

#[tokio::test]
async fn accumulated_mode_grows_the_content_of_each_client_event() {
    let server = MockServer::start().await;
    let sse_body = concat!(
        "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n",
        "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":null}]}\n\n",
        "data: {\"id\":\"c1\",\"object\":\"chat.completion.chunk\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .mount(&server)
        .await;

    let bridge = Bridge::new(Arc::new(OpenAiFrontend::new()), openai_backend(&server));
    let mut request = openai_request("gpt-4o");
    request["stream"] = serde_json::json!(true);
    let events: Vec<String> = bridge
        .chat_stream(
            request,
            StreamOptions { mode: StreamMode::Accumulated, include_both: false },
        )
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;

    let contents: Vec<String> = events
        .iter()
        .filter_map(|e| e.strip_prefix("data: "))
        .filter(|d| !d.starts_with("[DONE]"))
        .filter_map(|d| {
            serde_json::from_str::<serde_json::Value>(d.trim()).unwrap()["choices"][0]["delta"]
                ["content"]
                .as_str()
                .map(str::to_string)
        })
        .collect();
    // Each content event carries the running text, not the delta.
    assert_eq!(contents, vec!["Hel", "Hello"]);
}

#[tokio::test]
async fn anthropic_sse_stream_translates_to_openai_client_format() {
    let server = MockServer::start().await;
    let sse_body = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"model\":\"claude-sonnet-4\",\"usage\":{\"input_tokens\":9}}}\n\n",
        "event: content_block_start\n",
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi!\"}}\n\n",
        "event: content_block_stop\n",
        "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":3}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .mount(&server)
        .await;

    let bridge = Bridge::new(Arc::new(OpenAiFrontend::new()), anthropic_backend(&server));
    let events: Vec<String> = bridge
        .chat_stream(
            serde_json::json!({
                "model": "claude-sonnet-4",
                "stream": true,
                "messages": [{"role": "user", "content": "Hi"}]
            }),
            StreamOptions::default(),
        )
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;

    // The anthropic upstream stream arrives chat-completions shaped.
    assert!(events.iter().any(|e| e.contains("chat.completion.chunk")));
    assert!(events.iter().any(|e| e.contains("\"content\":\"Hi!\"")));
    assert_eq!(events.last().unwrap(), "data: [DONE]\n\n");
}
