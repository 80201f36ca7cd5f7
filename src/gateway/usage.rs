//! Usage tracking via the UsageSink trait.
//!
//! The invoker logs every provider attempt through a UsageSink. This decouples
//! retry bookkeeping from any specific destination:
//! - the CLI uses TracingUsageSink
//! - tests use NoopUsageSink or a recording sink

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Status of a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Success,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Error => "error",
        }
    }
}

/// Record of a single provider attempt.
#[derive(Debug, Clone)]
pub struct ProviderCallRecord {
    /// Provider name.
    pub provider: &'static str,
    /// Model used.
    pub model: String,
    /// Zero-based attempt index within one invocation.
    pub attempt: u32,
    /// Input tokens consumed.
    pub input_tokens: u32,
    /// Output tokens generated.
    pub output_tokens: u32,
    /// Run this request is part of (if any).
    pub run_id: Option<Uuid>,
    /// Test case this request is for (if any).
    pub case_id: Option<String>,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Call status.
    pub status: CallStatus,
    /// Error code if status is Error.
    pub error_code: Option<String>,
    /// Backoff scheduled before the next attempt, if the invoker will retry.
    pub backoff: Option<Duration>,
    /// Which code path made this call.
    pub caller: &'static str,
    /// When the attempt finished.
    pub timestamp: DateTime<Utc>,
}

impl ProviderCallRecord {
    /// Create a new record with required fields, defaulting others.
    pub fn new(
        provider: &'static str,
        model: impl Into<String>,
        caller: &'static str,
        attempt: u32,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            attempt,
            input_tokens: 0,
            output_tokens: 0,
            run_id: None,
            case_id: None,
            latency_ms: 0,
            status: CallStatus::Success,
            error_code: None,
            backoff: None,
            caller,
            timestamp: Utc::now(),
        }
    }

    pub fn tokens(mut self, input: u32, output: u32) -> Self {
        self.input_tokens = input;
        self.output_tokens = output;
        self
    }

    pub fn run(mut self, run_id: Option<Uuid>) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn case(mut self, case_id: Option<String>) -> Self {
        self.case_id = case_id;
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency_ms = latency.as_millis() as u64;
        self
    }

    pub fn error(mut self, code: impl Into<String>) -> Self {
        self.status = CallStatus::Error;
        self.error_code = Some(code.into());
        self
    }

    pub fn backoff(mut self, delay: Duration) -> Self {
        self.backoff = Some(delay);
        self
    }
}

/// Trait for recording provider call usage.
#[async_trait]
pub trait UsageSink: Send + Sync {
    /// Record a provider attempt. Fire-and-forget: failures should be logged
    /// but not propagated.
    async fn record(&self, record: ProviderCallRecord);
}

/// No-op usage sink that discards all records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageSink;

#[async_trait]
impl UsageSink for NoopUsageSink {
    async fn record(&self, _record: ProviderCallRecord) {}
}

/// Usage sink that emits each record as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingUsageSink;

#[async_trait]
impl UsageSink for TracingUsageSink {
    async fn record(&self, record: ProviderCallRecord) {
        tracing::debug!(
            provider = record.provider,
            model = %record.model,
            attempt = record.attempt,
            case_id = record.case_id.as_deref().unwrap_or("-"),
            tokens = record.input_tokens + record.output_tokens,
            latency_ms = record.latency_ms,
            status = record.status.as_str(),
            error_code = record.error_code.as_deref().unwrap_or(""),
            backoff_ms = record.backoff.map(|d| d.as_millis() as u64).unwrap_or(0),
            caller = record.caller,
            "provider call"
        );
    }
}
