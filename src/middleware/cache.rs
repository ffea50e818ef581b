//! Response caching middleware.
//!
//! Computes a deterministic key from the request (model, parameters,
//! messages, never the per-request metadata), returns a stored response
//! without invoking `next` on a hit, and stores the response after a miss.
//! Entries expire after a configured TTL. Streaming requests pass through
//! untouched. Concurrent identical misses may both execute; the second
//! request observes the stored entry once it lands.

use super::{Middleware, Next, PipelineOutcome, RequestContext};
use crate::error::GatewayError;
use crate::ir::ChatResponse;
use async_trait::async_trait;
use dashmap::DashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pluggable cache storage: the gateway owns no persistence.
#[async_trait]
pub trait CacheStorage: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Option<ChatResponse>;
    async fn set(&self, key: &str, response: ChatResponse, ttl: Duration);
    async fn has(&self, key: &str) -> bool;
    async fn delete(&self, key: &str);
    async fn clear(&self);
}

/// In-memory TTL cache over a concurrent map.
#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, (ChatResponse, Instant)>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStorage for InMemoryCache {
    async fn get(&self, key: &str) -> Option<ChatResponse> {
        // The shard guard must be released before removing an expired entry.
        let expired = match self.entries.get(key) {
            Some(entry) if entry.1 > Instant::now() => return Some(entry.0.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    async fn set(&self, key: &str, response: ChatResponse, ttl: Duration) {
        self.entries
            .insert(key.to_string(), (response, Instant::now() + ttl));
    }

    async fn has(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    async fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    async fn clear(&self) {
        self.entries.clear();
    }
}

/// Cache key over the request fields that determine the answer.
/// `DefaultHasher::new()` is fixed-key, so keys are stable per process.
pub fn cache_key(ctx: &RequestContext) -> String {
    let payload = serde_json::json!({
        "backend": ctx.backend_name,
        "parameters": ctx.request.parameters,
        "messages": ctx.request.messages,
    });
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    payload.to_string().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// The caching interceptor.
pub struct CachingMiddleware {
    storage: Arc<dyn CacheStorage>,
    ttl: Duration,
}

impl CachingMiddleware {
    pub fn new(storage: Arc<dyn CacheStorage>, ttl: Duration) -> Self {
        Self { storage, ttl }
    }

    /// In-memory cache with the given TTL.
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(InMemoryCache::new()), ttl)
    }
}

#[async_trait]
impl Middleware for CachingMiddleware {
    fn name(&self) -> &str {
        "cache"
    }

    async fn handle(
        &self,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<PipelineOutcome, GatewayError> {
        if ctx.request.stream {
            return next.run(ctx).await;
        }

        let key = cache_key(ctx);
        if let Some(mut hit) = self.storage.get(&key).await {
            tracing::debug!(key = %key, "cache hit");
            // The cached value answers the current request.
            hit.metadata.request_id = ctx.request.metadata.request_id.clone();
            ctx.state.put("cache.hit", true);
            return Ok(PipelineOutcome::Response(hit));
        }

        let outcome = next.run(ctx).await?;
        if let PipelineOutcome::Response(response) = &outcome {
            self.storage.set(&key, response.clone(), self.ttl).await;
            tracing::debug!(key = %key, "cache store");
        }
        ctx.state.put("cache.hit", false);
        Ok(outcome)
    }
}
