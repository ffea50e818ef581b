//! Transform middleware: rewrite the request before `next` and/or the
//! response after it.

use super::{Middleware, Next, PipelineOutcome, RequestContext};
use crate::error::GatewayError;
use crate::ir::{ChatRequest, ChatResponse};
use async_trait::async_trait;
use std::sync::Arc;

pub type RequestTransform = Arc<dyn Fn(&mut ChatRequest) + Send + Sync>;
pub type ResponseTransform = Arc<dyn Fn(&mut ChatResponse) + Send + Sync>;

#[derive(Default)]
pub struct TransformMiddleware {
    request: Option<RequestTransform>,
    response: Option<ResponseTransform>,
}

impl TransformMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_request(mut self, transform: RequestTransform) -> Self {
        self.request = Some(transform);
        self
    }

    pub fn on_response(mut self, transform: ResponseTransform) -> Self {
        self.response = Some(transform);
        self
    }
}

#[async_trait]
impl Middleware for TransformMiddleware {
    fn name(&self) -> &str {
        "transform"
    }

    async fn handle(
        &self,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<PipelineOutcome, GatewayError> {
        if let Some(transform) = &self.request {
            transform(&mut ctx.request);
        }
        let outcome = next.run(ctx).await?;
        match outcome {
            PipelineOutcome::Response(mut response) => {
                if let Some(transform) = &self.response {
                    transform(&mut response);
                }
                Ok(PipelineOutcome::Response(response))
            }
            stream => Ok(stream),
        }
    }
}
