//! Router: one frontend fanned out over many registered backends, with
//! selection strategies, per-hop model translation, and fallback.
//!
//! Configuration lives in an immutable [`RouterPolicy`] snapshot behind an
//! `RwLock<Arc<_>>`; every mutation clones the current policy, applies the
//! change, and swaps the `Arc`, so an in-flight request observes one
//! consistent policy for its whole fallback chain. Counters are lock-free
//! and shared across snapshots.

use crate::adapter::{
    AnthropicBackend, AnthropicConfig, Backend, ChunkStream, EventStream, Frontend, OpenAiBackend,
    OpenAiConfig,
};
use crate::bridge::BackendTerminal;
use crate::config::{ConfigError, GatewayConfig};
use crate::error::{BackendAttempt, GatewayError};
use crate::ir::{ChatRequest, ChatResponse};
use crate::matcher::{self, CapabilityRequirements, ModelCandidate};
use crate::middleware::{
    CachingMiddleware, LoggingMiddleware, Middleware, MiddlewarePipeline, PipelineOutcome,
    RequestContext, RetryMiddleware, TelemetryMiddleware,
};
use crate::stream::StreamOptions;
use dashmap::DashMap;
use futures_util::stream::{FuturesUnordered, StreamExt};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub mod stats;
pub mod strategy;
pub mod translation;

pub use stats::{BackendInfo, BackendStats, BackendStatsSnapshot};
pub use strategy::{FallbackStrategy, RoutingStrategy};
pub use translation::{ModelTranslator, PatternRule, ReverseMappingPolicy, TranslationStrategy};

/// Metadata key carrying per-request capability requirements.
pub const CAPABILITIES_KEY: &str = "capabilities";

/// Pure selection function for [`RoutingStrategy::Custom`]. Receives the
/// request and the consultable backend names in consultation order (the
/// configured fallback chain when one is set).
pub type CustomSelector =
    Arc<dyn Fn(&ChatRequest, &[String]) -> Option<String> + Send + Sync>;

/// One registered backend with its routing attributes.
#[derive(Clone)]
pub struct BackendEntry {
    pub name: String,
    pub backend: Arc<dyn Backend>,
    /// Relative weight for [`RoutingStrategy::Weighted`].
    pub weight: u32,
    /// Model used when hybrid translation finds no mapping.
    pub default_model: Option<String>,
}

/// Immutable routing configuration snapshot.
#[derive(Clone, Default)]
pub struct RouterPolicy {
    pub routing: RoutingStrategy,
    pub fallback: FallbackStrategy,
    pub translator: ModelTranslator,
    backends: Vec<BackendEntry>,
    /// Backends consulted per request, in consultation order. `None`
    /// consults every registered backend in registration order.
    fallback_chain: Option<Vec<String>>,
    custom_selector: Option<CustomSelector>,
    /// Router-level default for capability-based selection; a request may
    /// override it through its metadata.
    capability_requirements: Option<CapabilityRequirements>,
    /// Plain strategy used when capability-based selection finds no
    /// qualifying model.
    capability_fallback: RoutingStrategy,
}

impl RouterPolicy {
    fn entry(&self, name: &str) -> Option<&BackendEntry> {
        self.backends.iter().find(|b| b.name == name)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.backends.iter().position(|b| b.name == name)
    }

    /// The backends a request may be dispatched to, in consultation
    /// order. Chain names with no registered backend are skipped.
    fn chain(&self) -> Vec<&BackendEntry> {
        match &self.fallback_chain {
            Some(names) => names.iter().filter_map(|name| self.entry(name)).collect(),
            None => self.backends.iter().collect(),
        }
    }
}

/// One planned dispatch attempt. Capability-based selection pins the
/// matched model directly and skips translation for that hop.
#[derive(Debug, Clone)]
struct Hop {
    backend: String,
    model_override: Option<String>,
}

pub struct Router {
    name: String,
    frontend: Arc<dyn Frontend>,
    policy: RwLock<Arc<RouterPolicy>>,
    pipeline: MiddlewarePipeline,
    round_robin: AtomicU64,
    stats: DashMap<String, Arc<BackendStats>>,
}

impl Router {
    pub fn new(name: impl Into<String>, frontend: Arc<dyn Frontend>) -> Self {
        Self {
            name: name.into(),
            frontend,
            policy: RwLock::new(Arc::new(RouterPolicy::default())),
            pipeline: MiddlewarePipeline::new(),
            round_robin: AtomicU64::new(0),
            stats: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frontend(&self) -> &Arc<dyn Frontend> {
        &self.frontend
    }

    /// Append a middleware; the pipeline wraps every backend attempt
    /// individually, so e.g. caching can satisfy a fallback hop.
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.pipeline.push(middleware);
        self
    }

    fn snapshot(&self) -> Arc<RouterPolicy> {
        self.policy
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn update_policy(&self, mutate: impl FnOnce(&mut RouterPolicy)) {
        let mut guard = self.policy.write().unwrap_or_else(|e| e.into_inner());
        let mut next = (**guard).clone();
        mutate(&mut next);
        *guard = Arc::new(next);
    }

    /// Register a backend with weight 1 and no default model.
    pub fn register(&self, name: impl Into<String>, backend: Arc<dyn Backend>) {
        self.register_entry(BackendEntry {
            name: name.into(),
            backend,
            weight: 1,
            default_model: None,
        });
    }

    /// Register a backend with explicit routing attributes. Re-registering
    /// a name replaces the previous entry but keeps its counters.
    pub fn register_entry(&self, entry: BackendEntry) {
        self.stats
            .entry(entry.name.clone())
            .or_insert_with(|| Arc::new(BackendStats::default()));
        self.update_policy(|policy| {
            if let Some(pos) = policy.position(&entry.name) {
                policy.backends[pos] = entry;
            } else {
                policy.backends.push(entry);
            }
        });
    }

    /// Remove a backend. Returns whether it was registered. In-flight
    /// requests holding the previous snapshot still complete against it.
    pub fn unregister(&self, name: &str) -> bool {
        let mut removed = false;
        self.update_policy(|policy| {
            if let Some(pos) = policy.position(name) {
                policy.backends.remove(pos);
                removed = true;
            }
        });
        removed
    }

    pub fn set_routing_strategy(&self, strategy: RoutingStrategy) {
        self.update_policy(|policy| policy.routing = strategy);
    }

    pub fn set_fallback_strategy(&self, strategy: FallbackStrategy) {
        self.update_policy(|policy| policy.fallback = strategy);
    }

    /// Restrict and order the backends consulted per request. `None`
    /// restores the default of every registered backend in registration
    /// order. Names may be set before their backends are registered.
    pub fn set_fallback_chain(&self, chain: Option<Vec<String>>) {
        self.update_policy(|policy| policy.fallback_chain = chain);
    }

    /// Plain strategy applied when capability-based selection finds no
    /// qualifying model. Round-robin by default.
    pub fn set_capability_fallback(&self, strategy: RoutingStrategy) {
        self.update_policy(|policy| policy.capability_fallback = strategy);
    }

    pub fn set_translator(&self, translator: ModelTranslator) {
        self.update_policy(|policy| policy.translator = translator);
    }

    /// Mutate the translator in place (snapshot-swap under the hood).
    pub fn configure_translation(&self, configure: impl FnOnce(&mut ModelTranslator)) {
        self.update_policy(|policy| configure(&mut policy.translator));
    }

    pub fn set_custom_selector(&self, selector: CustomSelector) {
        self.update_policy(|policy| policy.custom_selector = Some(selector));
    }

    pub fn set_capability_requirements(&self, requirements: CapabilityRequirements) {
        self.update_policy(|policy| policy.capability_requirements = Some(requirements));
    }

    /// Apply a parsed [`GatewayConfig`]: strategies, translator, statically
    /// declared backends, and the configured middleware stack.
    pub fn apply_config(&mut self, config: &GatewayConfig) -> Result<(), ConfigError> {
        self.set_routing_strategy(config.routing.routing_strategy()?);
        self.set_fallback_strategy(config.routing.fallback_strategy()?);
        self.set_fallback_chain(config.routing.fallback_chain.clone());
        self.set_translator(config.translation.build()?);

        for target in &config.routing.backends {
            let api_key = target.resolve_api_key()?;
            let backend: Arc<dyn Backend> = match target.provider.as_str() {
                "openai" => {
                    let mut cfg = OpenAiConfig::new(api_key);
                    if let Some(url) = &target.base_url {
                        cfg = cfg.with_base_url(url);
                    }
                    Arc::new(OpenAiBackend::new(cfg).map_err(|e| ConfigError::Validation {
                        field: format!("routing.backends.{}", target.name),
                        message: e.message,
                    })?)
                }
                "anthropic" => {
                    let mut cfg = AnthropicConfig::new(api_key);
                    if let Some(url) = &target.base_url {
                        cfg = cfg.with_base_url(url);
                    }
                    Arc::new(AnthropicBackend::new(cfg).map_err(|e| ConfigError::Validation {
                        field: format!("routing.backends.{}", target.name),
                        message: e.message,
                    })?)
                }
                other => {
                    return Err(ConfigError::Validation {
                        field: format!("routing.backends.{}.provider", target.name),
                        message: format!("unknown provider '{other}'"),
                    })
                }
            };
            self.register_entry(BackendEntry {
                name: target.name.clone(),
                backend,
                weight: target.weight,
                default_model: target.default_model.clone(),
            });
        }

        if config.middleware.logging {
            self.use_middleware(Arc::new(LoggingMiddleware::new()));
        }
        if let Some(cache) = &config.middleware.cache {
            self.use_middleware(Arc::new(CachingMiddleware::in_memory(cache.ttl())));
        }
        if let Some(retry) = &config.middleware.retry {
            self.use_middleware(Arc::new(
                RetryMiddleware::new(retry.max_attempts, retry.base_delay())
                    .with_max_delay(retry.max_delay()),
            ));
        }
        if config.middleware.telemetry {
            self.use_middleware(Arc::new(TelemetryMiddleware::default()));
        }
        Ok(())
    }

    /// Counters per registered backend, including unregistered ones that
    /// have historical traffic.
    pub fn stats(&self) -> std::collections::HashMap<String, BackendStatsSnapshot> {
        self.stats
            .iter()
            .map(|e| (e.key().clone(), e.value().snapshot()))
            .collect()
    }

    /// Registration attributes plus counters, in registration order.
    pub fn backend_info(&self) -> Vec<BackendInfo> {
        let policy = self.snapshot();
        policy
            .backends
            .iter()
            .map(|entry| BackendInfo {
                name: entry.name.clone(),
                weight: entry.weight,
                default_model: entry.default_model.clone(),
                stats: self
                    .stats
                    .get(&entry.name)
                    .map(|s| s.snapshot())
                    .unwrap_or_else(|| BackendStats::default().snapshot()),
            })
            .collect()
    }

    /// Execute a non-streaming IR request through selection, translation,
    /// the middleware pipeline, and fallback.
    pub async fn execute(
        &self,
        mut request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResponse, GatewayError> {
        request.stream = false;
        self.dispatch(request, StreamOptions::default(), cancel)
            .await?
            .into_response()
    }

    /// Streaming variant. Fallback covers failures to establish the
    /// stream; once chunks flow, errors arrive in-band.
    pub async fn execute_stream(
        &self,
        mut request: ChatRequest,
        options: StreamOptions,
        cancel: CancellationToken,
    ) -> Result<ChunkStream, GatewayError> {
        request.stream = true;
        self.dispatch(request, options, cancel).await?.into_stream()
    }

    /// Provider-shaped non-streaming entry point.
    pub async fn chat(
        &self,
        provider_request: serde_json::Value,
    ) -> Result<serde_json::Value, GatewayError> {
        self.chat_with(provider_request, CancellationToken::new())
            .await
    }

    pub async fn chat_with(
        &self,
        provider_request: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value, GatewayError> {
        let mut request = self.frontend.to_ir(provider_request)?;
        request.metadata.provenance.frontend = Some(self.frontend.metadata().name.clone());
        let response = self.execute(request, cancel).await?;
        self.frontend.from_ir(&response)
    }

    /// Provider-shaped streaming entry point.
    pub async fn chat_stream(
        &self,
        provider_request: serde_json::Value,
        options: StreamOptions,
    ) -> Result<EventStream, GatewayError> {
        self.chat_stream_with(provider_request, options, CancellationToken::new())
            .await
    }

    pub async fn chat_stream_with(
        &self,
        provider_request: serde_json::Value,
        options: StreamOptions,
        cancel: CancellationToken,
    ) -> Result<EventStream, GatewayError> {
        let mut request = self.frontend.to_ir(provider_request)?;
        request.metadata.provenance.frontend = Some(self.frontend.metadata().name.clone());
        let chunks = self.execute_stream(request, options, cancel).await?;
        Ok(self.frontend.from_ir_stream(chunks, options))
    }

    /// Provider-shaped error envelope for this router's inbound format.
    pub fn error_response(&self, error: &GatewayError) -> serde_json::Value {
        self.frontend.error_envelope(error)
    }

    async fn dispatch(
        &self,
        request: ChatRequest,
        options: StreamOptions,
        cancel: CancellationToken,
    ) -> Result<PipelineOutcome, GatewayError> {
        let policy = self.snapshot();
        if policy.backends.is_empty() {
            return Err(GatewayError::routing(
                "NO_BACKEND_AVAILABLE",
                "no backends registered",
            )
            .with_router(self.name.clone()));
        }

        let hops = self.plan(&policy, &request).await;
        if hops.is_empty() {
            return Err(GatewayError::routing(
                "NO_BACKEND_AVAILABLE",
                "fallback chain names no registered backend",
            )
            .with_router(self.name.clone()));
        }
        match policy.fallback {
            FallbackStrategy::Sequential => {
                self.dispatch_sequential(&policy, &request, &hops, options, &cancel)
                    .await
            }
            FallbackStrategy::Parallel => {
                self.dispatch_parallel(&policy, &request, &hops, options, &cancel)
                    .await
            }
        }
    }

    async fn plan(&self, policy: &RouterPolicy, request: &ChatRequest) -> Vec<Hop> {
        match policy.routing {
            RoutingStrategy::CapabilityBased => self.plan_by_capability(policy, request).await,
            strategy => self.plan_plain(policy, request, strategy),
        }
    }

    /// Order the consultable backends: the strategy picks the head, the
    /// rest follow in chain order.
    fn plan_plain(
        &self,
        policy: &RouterPolicy,
        request: &ChatRequest,
        strategy: RoutingStrategy,
    ) -> Vec<Hop> {
        let chain = policy.chain();
        let len = chain.len();
        if len == 0 {
            return Vec::new();
        }
        let plain = |first: usize| -> Vec<Hop> {
            (0..len)
                .map(|i| Hop {
                    backend: chain[(first + i) % len].name.clone(),
                    model_override: None,
                })
                .collect()
        };

        match strategy {
            RoutingStrategy::Priority | RoutingStrategy::CapabilityBased => plain(0),
            RoutingStrategy::RoundRobin => {
                let cursor = self.round_robin.fetch_add(1, Ordering::Relaxed);
                plain((cursor % len as u64) as usize)
            }
            RoutingStrategy::Random => plain(rand::thread_rng().gen_range(0..len)),
            RoutingStrategy::Weighted => {
                let total: u64 = chain.iter().map(|b| b.weight as u64).sum();
                if total == 0 {
                    return plain(0);
                }
                let mut pick = rand::thread_rng().gen_range(0..total);
                let mut first = 0;
                for (i, entry) in chain.iter().enumerate() {
                    if pick < entry.weight as u64 {
                        first = i;
                        break;
                    }
                    pick -= entry.weight as u64;
                }
                plain(first)
            }
            RoutingStrategy::Custom => {
                let names: Vec<String> = chain.iter().map(|b| b.name.clone()).collect();
                let chosen = policy
                    .custom_selector
                    .as_ref()
                    .and_then(|select| select(request, &names))
                    .and_then(|name| names.iter().position(|n| *n == name));
                // An absent selector or an unknown name degrades to
                // chain order.
                plain(chosen.unwrap_or(0))
            }
        }
    }

    async fn plan_by_capability(&self, policy: &RouterPolicy, request: &ChatRequest) -> Vec<Hop> {
        let requirements = request
            .metadata
            .custom
            .get(CAPABILITIES_KEY)
            .and_then(|v| serde_json::from_value::<CapabilityRequirements>(v.clone()).ok())
            .or_else(|| policy.capability_requirements.clone())
            .unwrap_or_default();

        let chain = policy.chain();
        let mut candidates = Vec::new();
        for entry in &chain {
            match entry.backend.list_models().await {
                Ok(list) => candidates.extend(list.models.into_iter().map(|model| {
                    ModelCandidate {
                        model,
                        backend: entry.name.clone(),
                    }
                })),
                Err(error) => {
                    tracing::warn!(
                        router = %self.name,
                        backend = %entry.name,
                        %error,
                        "model listing failed; backend excluded from matching"
                    );
                }
            }
        }

        let best = matcher::find_best_model(&requirements, &candidates);
        let Some(best) = best else {
            // Nothing qualified (or nothing listed): degrade to the
            // configured plain strategy instead of a fixed order.
            return self.plan_plain(policy, request, policy.capability_fallback);
        };

        let mut hops = vec![Hop {
            backend: best.candidate.backend.clone(),
            model_override: Some(best.candidate.model.id.clone()),
        }];
        hops.extend(
            chain
                .iter()
                .filter(|entry| entry.name != best.candidate.backend)
                .map(|entry| Hop {
                    backend: entry.name.clone(),
                    model_override: None,
                }),
        );
        hops
    }

    /// Run one hop: translate the model, stamp provenance, execute the
    /// pipeline-wrapped backend call, record counters.
    async fn attempt(
        &self,
        policy: &RouterPolicy,
        original: &ChatRequest,
        hop: &Hop,
        options: StreamOptions,
        cancel: CancellationToken,
    ) -> Result<PipelineOutcome, GatewayError> {
        let entry = policy.entry(&hop.backend).ok_or_else(|| {
            GatewayError::routing(
                "BACKEND_NOT_FOUND",
                format!("backend '{}' is not registered", hop.backend),
            )
        })?;

        // Each hop starts from the original request; a translation applied
        // for one backend never leaks into the next.
        let mut request = original.clone();
        request.parameters.model = match &hop.model_override {
            Some(model) => model.clone(),
            None => policy.translator.translate(
                &original.parameters.model,
                &entry.name,
                entry.default_model.as_deref(),
            )?,
        };
        request.metadata.provenance.router = Some(self.name.clone());
        request.metadata.provenance.backend = Some(entry.name.clone());

        tracing::debug!(
            router = %self.name,
            backend = %entry.name,
            model = %request.parameters.model,
            "dispatching attempt"
        );

        let stats = self
            .stats
            .entry(entry.name.clone())
            .or_insert_with(|| Arc::new(BackendStats::default()))
            .clone();
        let mut ctx = RequestContext::new(
            request,
            entry.name.clone(),
            entry.backend.metadata().clone(),
            cancel,
        );
        ctx.stream_options = options;
        let terminal = BackendTerminal {
            backend: entry.backend.clone(),
        };

        let started = Instant::now();
        let outcome = self.pipeline.execute(&mut ctx, &terminal).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(_) => stats.record_success(latency_ms),
            Err(_) => stats.record_failure(latency_ms),
        }
        outcome
    }

    async fn dispatch_sequential(
        &self,
        policy: &RouterPolicy,
        request: &ChatRequest,
        hops: &[Hop],
        options: StreamOptions,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, GatewayError> {
        let mut attempts = Vec::new();
        for hop in hops {
            if cancel.is_cancelled() {
                return Err(GatewayError::cancelled().with_router(self.name.clone()));
            }
            match self.attempt(policy, request, hop, options, cancel.clone()).await {
                Ok(outcome) => return Ok(outcome),
                Err(error) if error.is_cancelled() => {
                    return Err(error.with_router(self.name.clone()));
                }
                Err(error) => {
                    tracing::warn!(
                        router = %self.name,
                        backend = %hop.backend,
                        %error,
                        "attempt failed, falling back"
                    );
                    attempts.push(BackendAttempt {
                        backend: hop.backend.clone(),
                        error: Box::new(error),
                    });
                }
            }
        }
        Err(GatewayError::all_backends_failed(attempts).with_router(self.name.clone()))
    }

    /// Race every hop at once; the first success wins and the losers are
    /// cancelled through their child tokens.
    async fn dispatch_parallel(
        &self,
        policy: &RouterPolicy,
        request: &ChatRequest,
        hops: &[Hop],
        options: StreamOptions,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, GatewayError> {
        let children: Vec<CancellationToken> =
            hops.iter().map(|_| cancel.child_token()).collect();
        let mut racing: FuturesUnordered<_> = hops
            .iter()
            .zip(children.iter())
            .map(|(hop, child)| {
                let child = child.clone();
                async move {
                    let result = self.attempt(policy, request, hop, options, child).await;
                    (hop.backend.clone(), result)
                }
            })
            .collect();

        let mut attempts = Vec::new();
        while let Some((backend, result)) = racing.next().await {
            match result {
                Ok(outcome) => {
                    for child in &children {
                        child.cancel();
                    }
                    return Ok(outcome);
                }
                Err(error) if error.is_cancelled() && cancel.is_cancelled() => {
                    return Err(error.with_router(self.name.clone()));
                }
                Err(error) => attempts.push(BackendAttempt {
                    backend,
                    error: Box::new(error),
                }),
            }
        }
        Err(GatewayError::all_backends_failed(attempts).with_router(self.name.clone()))
    }
}
