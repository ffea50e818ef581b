//! Bridge: one frontend, one backend, one middleware pipeline.
//!
//! The minimal executable unit of the gateway. `chat` threads a
//! provider-shaped request through `Frontend::to_ir`, the pipeline-wrapped
//! backend call, and `Frontend::from_ir`; `chat_stream` does the same up
//! to `Backend::execute_stream` and re-serializes the chunk stream through
//! `Frontend::from_ir_stream`.

use crate::adapter::{Backend, EventStream, Frontend};
use crate::error::GatewayError;
use crate::middleware::{
    Middleware, MiddlewarePipeline, PipelineOutcome, RequestContext, Terminal,
};
use crate::stream::StreamOptions;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Terminal call at the center of the onion: the actual backend dispatch.
pub(crate) struct BackendTerminal {
    pub backend: Arc<dyn Backend>,
}

#[async_trait]
impl Terminal for BackendTerminal {
    async fn call(&self, ctx: &mut RequestContext) -> Result<PipelineOutcome, GatewayError> {
        if ctx.request.stream {
            let stream = self
                .backend
                .execute_stream(&ctx.request, ctx.stream_options, &ctx.cancellation)
                .await?;
            Ok(PipelineOutcome::Stream(stream))
        } else {
            let response = self
                .backend
                .execute(&ctx.request, &ctx.cancellation)
                .await?;
            Ok(PipelineOutcome::Response(response))
        }
    }
}

pub struct Bridge {
    frontend: Arc<dyn Frontend>,
    backend: Arc<dyn Backend>,
    pipeline: MiddlewarePipeline,
}

impl Bridge {
    pub fn new(frontend: Arc<dyn Frontend>, backend: Arc<dyn Backend>) -> Self {
        Self {
            frontend,
            backend,
            pipeline: MiddlewarePipeline::new(),
        }
    }

    /// Append a middleware; insertion order is execution order.
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.pipeline.push(middleware);
        self
    }

    pub fn frontend(&self) -> &Arc<dyn Frontend> {
        &self.frontend
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Execute a non-streaming provider-shaped request.
    pub async fn chat(
        &self,
        provider_request: serde_json::Value,
    ) -> Result<serde_json::Value, GatewayError> {
        self.chat_with(provider_request, CancellationToken::new())
            .await
    }

    /// Like [`Bridge::chat`] with an externally owned cancellation signal.
    pub async fn chat_with(
        &self,
        provider_request: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value, GatewayError> {
        let mut request = self.frontend.to_ir(provider_request)?;
        request.stream = false;
        request.metadata.provenance.frontend = Some(self.frontend.metadata().name.clone());
        request.metadata.provenance.backend = Some(self.backend.metadata().name.clone());

        let mut ctx = RequestContext::new(
            request,
            self.backend.metadata().name.clone(),
            self.backend.metadata().clone(),
            cancel,
        );
        let terminal = BackendTerminal {
            backend: self.backend.clone(),
        };
        let response = self
            .pipeline
            .execute(&mut ctx, &terminal)
            .await?
            .into_response()?;
        self.frontend.from_ir(&response)
    }

    /// Execute a streaming provider-shaped request. The returned event
    /// stream is lazy: nothing upstream advances until it is polled.
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
        request.stream = true;
        request.metadata.provenance.frontend = Some(self.frontend.metadata().name.clone());
        request.metadata.provenance.backend = Some(self.backend.metadata().name.clone());

        let mut ctx = RequestContext::new(
            request,
            self.backend.metadata().name.clone(),
            self.backend.metadata().clone(),
            cancel,
        );
        ctx.stream_options = options;
        let terminal = BackendTerminal {
            backend: self.backend.clone(),
        };
        let chunks = self
            .pipeline
            .execute(&mut ctx, &terminal)
            .await?
            .into_stream()?;
        Ok(self.frontend.from_ir_stream(chunks, options))
    }

    /// Provider-shaped error envelope for this bridge's inbound format.
    pub fn error_response(&self, error: &GatewayError) -> serde_json::Value {
        self.frontend.error_envelope(error)
    }
}
