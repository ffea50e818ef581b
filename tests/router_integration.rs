//! Router integration tests over mocked provider APIs: fallback across
//! real HTTP backends, per-hop model translation on the wire, and the
//! provider-shaped entry points.

use prism::adapter::{OpenAiBackend, OpenAiConfig, OpenAiFrontend};
use prism::config::GatewayConfig;
use prism::middleware::RetryMiddleware;
use prism::router::{FallbackStrategy, Router, RoutingStrategy};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion(content: &str, model: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1677652288,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

fn backend(server: &MockServer) -> Arc<OpenAiBackend> {
    Arc::new(
        OpenAiBackend::new(OpenAiConfig::new("sk-test").with_base_url(server.uri())).unwrap(),
    )
}

fn chat_request(model: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [{"role": "user", "content": "Hi"}]
    })
}

#[tokio::test]
async fn fallback_crosses_real_http_backends() {
    let failing = MockServer::start().await;
    let healthy = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(1)
        .mount(&failing)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("rescued", "gpt-4o")))
        .expect(1)
        .mount(&healthy)
        .await;

    let router = Router::new("gateway", Arc::new(OpenAiFrontend::new()));
    router.register("primary", backend(&failing));
    router.register("secondary", backend(&healthy));
    router.set_routing_strategy(RoutingStrategy::Priority);

    let response = router.chat(chat_request("gpt-4o")).await.unwrap();
    assert_eq!(response["choices"][0]["message"]["content"], "rescued");
}

#[tokio::test]
async fn exhausted_chain_surfaces_an_aggregate_error_envelope() {
    let a = MockServer::start().await;
    let b = MockServer::start().await;
    for server in [&a, &b] {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .expect(1)
            .mount(server)
            .await;
    }

    let router = Router::new("gateway", Arc::new(OpenAiFrontend::new()));
    router.register("a", backend(&a));
    router.register("b", backend(&b));
    router.set_routing_strategy(RoutingStrategy::Priority);

    let err = router.chat(chat_request("gpt-4o")).await.unwrap_err();
    assert_eq!(err.code, "ALL_BACKENDS_FAILED");
    assert_eq!(err.attempts.len(), 2);

    let envelope = router.error_response(&err);
    assert_eq!(envelope["error"]["code"], "ALL_BACKENDS_FAILED");
}

#[tokio::test]
async fn translated_model_name_reaches_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({"model": "llama3:70b"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok", "llama3:70b")))
        .expect(1)
        .mount(&server)
        .await;

    let router = Router::new("gateway", Arc::new(OpenAiFrontend::new()));
    router.register("local", backend(&server));
    router.configure_translation(|t| {
        t.add_backend_mapping("local", "gpt-4o", "llama3:70b");
    });

    let response = router.chat(chat_request("gpt-4o")).await.unwrap();
    assert_eq!(response["choices"][0]["message"]["content"], "ok");
}

#[tokio::test]
async fn apply_config_wires_backends_translation_and_strategy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({"model": "llama3:70b"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok", "llama3:70b")))
        .expect(1)
        .mount(&server)
        .await;

    let toml = format!(
        r#"
        [routing]
        strategy = "priority"

        [[routing.backends]]
        name = "local"
        provider = "openai"
        api_key = "sk-test"
        base_url = "{}"

        [[translation.backend_mappings]]
        backend = "local"
        from = "gpt-4o"
        to = "llama3:70b"

        [middleware.retry]
        max_attempts = 2
        base_delay_ms = 1
    "#,
        server.uri()
    );
    let config: GatewayConfig = toml::from_str(&toml).unwrap();
    config.validate().unwrap();

    let mut router = Router::new("gateway", Arc::new(OpenAiFrontend::new()));
    router.apply_config(&config).unwrap();

    let response = router.chat(chat_request("gpt-4o")).await.unwrap();
    assert_eq!(response["choices"][0]["message"]["content"], "ok");
}

#[tokio::test]
async fn parallel_fallback_wins_with_the_fastest_backend() {
    let slow = MockServer::start().await;
    let fast = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("slow", "gpt-4o"))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&slow)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("fast", "gpt-4o")))
        .mount(&fast)
        .await;

    let router = Router::new("gateway", Arc::new(OpenAiFrontend::new()));
    router.register("slow", backend(&slow));
    router.register("fast", backend(&fast));
    router.set_routing_strategy(RoutingStrategy::Priority);
    router.set_fallback_strategy(FallbackStrategy::Parallel);

    let response = router.chat(chat_request("gpt-4o")).await.unwrap();
    assert_eq!(response["choices"][0]["message"]["content"], "fast");
}

#[tokio::test]
async fn retry_middleware_recovers_a_flaky_backend_without_fallback() {
    let server = MockServer::start().await;
    // First call fails, the retry succeeds.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("recovered", "gpt-4o")))
        .expect(1)
        .mount(&server)
        .await;

    let mut router = Router::new("gateway", Arc::new(OpenAiFrontend::new()));
    router.use_middleware(Arc::new(RetryMiddleware::new(
        2,
        Duration::from_millis(1),
    )));
    router.register("flaky", backend(&server));

    let response = router.chat(chat_request("gpt-4o")).await.unwrap();
    assert_eq!(response["choices"][0]["message"]["content"], "recovered");
}

#[tokio::test]
async fn per_backend_stats_accumulate_over_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok", "gpt-4o")))
        .mount(&server)
        .await;

    let router = Router::new("gateway", Arc::new(OpenAiFrontend::new()));
    router.register("only", backend(&server));
    for _ in 0..3 {
        router.chat(chat_request("gpt-4o")).await.unwrap();
    }

    let stats = router.stats();
    assert_eq!(stats["only"].requests, 3);
    assert_eq!(stats["only"].successes, 3);
    assert_eq!(stats["only"].failures, 0);
}
