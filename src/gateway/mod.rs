//! Provider gateway: the completion endpoint plus bounded retry.

pub mod chat_completions;
pub mod error;
pub mod types;
pub mod usage;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;

use chat_completions::ChatProvider;
use usage::{ProviderCallRecord, UsageSink as UsageSinkTrait};

pub use chat_completions::ChatCompletionsAdapter;
pub use error::{
    is_rate_limit_message, ErrorContext, FailureClass, ProviderError, RATE_LIMIT_MARKERS,
};
pub use types::*;
pub use usage::{CallStatus, NoopUsageSink, TracingUsageSink, UsageSink};

/// Anything that turns a chat request into text, with whatever resilience it
/// carries. The case runner depends only on this.
#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// Retries after the first attempt. Zero means exactly one attempt.
    pub max_retries: u32,
    /// Wait before the first retry; doubles on each subsequent retry.
    pub initial_backoff: Duration,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(4),
        }
    }
}

/// Wraps a [`ChatProvider`] with bounded retry and exponential backoff.
///
/// Only rate/quota failures are retried. Everything else, and a rate failure
/// once retries are spent, is returned to the caller unchanged. Pacing between
/// cases is not handled here.
pub struct ResilientInvoker<P: ChatProvider, U: UsageSinkTrait> {
    provider: P,
    usage_sink: Arc<U>,
    config: InvokerConfig,
}

#[async_trait::async_trait]
impl<P: ChatProvider, U: UsageSinkTrait> ChatGateway for ResilientInvoker<P, U> {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.invoke(&req).await
    }
}

impl<P: ChatProvider, U: UsageSinkTrait> ResilientInvoker<P, U> {
    pub fn new(provider: P, usage_sink: Arc<U>, config: InvokerConfig) -> Self {
        Self {
            provider,
            usage_sink,
            config,
        }
    }

    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }

    pub async fn invoke(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut attempt: u32 = 0;
        loop {
            let start = Instant::now();
            match self.provider.chat(req).await {
                Ok(resp) => {
                    let record = self
                        .base_record(req, attempt)
                        .tokens(resp.input_tokens, resp.output_tokens)
                        .latency(resp.latency);
                    self.usage_sink.record(record).await;
                    return Ok(resp);
                }
                Err(err) => {
                    let retry = err.is_retryable() && attempt < self.config.max_retries;
                    let delay = backoff_delay(self.config.initial_backoff, attempt);

                    let record = self
                        .base_record(req, attempt)
                        .latency(start.elapsed())
                        .error(err.code());
                    let record = if retry { record.backoff(delay) } else { record };
                    self.usage_sink.record(record).await;

                    if !retry {
                        return Err(err);
                    }

                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.config.max_retries + 1,
                        wait_ms = delay.as_millis() as u64,
                        error = %err,
                        "rate limited; backing off"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn base_record(&self, req: &ChatRequest, attempt: u32) -> ProviderCallRecord {
        ProviderCallRecord::new(
            self.provider.name(),
            req.model.model_id(),
            req.attribution.caller,
            attempt,
        )
        .run(req.attribution.run_id)
        .case(req.attribution.case_id.clone())
    }
}

/// Backoff before retry number `attempt + 1`: `base * 2^attempt`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u32.saturating_pow(attempt.min(16));
    base.saturating_mul(multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::from_secs(4);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(8));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(16));
    }

    #[test]
    fn backoff_exponent_is_capped() {
        let base = Duration::from_millis(1);
        assert_eq!(backoff_delay(base, 40), backoff_delay(base, 16));
    }
}
