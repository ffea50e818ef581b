//! Retry-with-backoff middleware.
//!
//! Invokes `next` up to `max_attempts` times with exponential backoff
//! between attempts, controlled by a predicate over `(error, attempt)`.
//! The backoff sleep holds no locks, so concurrent requests never
//! serialize on one request's backoff. Once a stream is established the
//! attempt counts as success; stream-level failures are in-band and not
//! retried here.

use super::{Middleware, Next, PipelineOutcome, RequestContext};
use crate::error::GatewayError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether the given error on the given 1-based attempt should be
/// retried.
pub type RetryPredicate = Arc<dyn Fn(&GatewayError, u32) -> bool + Send + Sync>;

pub struct RetryMiddleware {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    predicate: RetryPredicate,
}

impl RetryMiddleware {
    /// Default policy: retry errors flagged retryable.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
            predicate: Arc::new(|error, _attempt| error.retryable),
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_predicate(mut self, predicate: RetryPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        (self.base_delay * factor).min(self.max_delay)
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    fn name(&self) -> &str {
        "retry"
    }

    async fn handle(
        &self,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<PipelineOutcome, GatewayError> {
        let cancel = ctx.cancellation.clone();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match next.run(ctx).await {
                Ok(outcome) => return Ok(outcome),
                Err(error) => {
                    if attempt >= self.max_attempts
                        || error.is_cancelled()
                        || !(self.predicate)(&error, attempt)
                    {
                        return Err(error);
                    }
                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying after backoff"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(GatewayError::cancelled()),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::MiddlewarePipeline;
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_retryable_errors_up_to_limit() {
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.push(Arc::new(RetryMiddleware::new(3, Duration::from_millis(1))));
        let terminal = FailingTerminal {
            calls: AtomicU32::new(0),
            make: || GatewayError::network("CONNECT", "refused"),
        };
        let mut ctx = test_context("model-a");

        let err = pipeline.execute(&mut ctx, &terminal).await.unwrap_err();
        assert_eq!(err.code, "CONNECT");
        assert_eq!(terminal.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.push(Arc::new(RetryMiddleware::new(3, Duration::from_millis(1))));
        let terminal = FailingTerminal {
            calls: AtomicU32::new(0),
            make: || GatewayError::validation("BAD_INPUT", "nope"),
        };
        let mut ctx = test_context("model-a");

        pipeline.execute(&mut ctx, &terminal).await.unwrap_err();
        assert_eq!(terminal.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn custom_predicate_controls_retries() {
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.push(Arc::new(
            RetryMiddleware::new(5, Duration::from_millis(1))
                .with_predicate(Arc::new(|_, attempt| attempt < 2)),
        ));
        let terminal = FailingTerminal {
            calls: AtomicU32::new(0),
            make: || GatewayError::network("CONNECT", "refused"),
        };
        let mut ctx = test_context("model-a");

        pipeline.execute(&mut ctx, &terminal).await.unwrap_err();
        // Attempt 1 retried, attempt 2 rejected by the predicate.
        assert_eq!(terminal.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn first_success_stops_retrying() {
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.push(Arc::new(RetryMiddleware::new(3, Duration::from_millis(1))));
        let terminal = CountingTerminal::new("ok");
        let mut ctx = test_context("model-a");

        pipeline.execute(&mut ctx, &terminal).await.unwrap();
        assert_eq!(terminal.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let retry = RetryMiddleware::new(5, Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(350));
        assert_eq!(retry.delay_for(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for(3), Duration::from_millis(350));
        assert_eq!(retry.delay_for(4), Duration::from_millis(350));
    }
}
