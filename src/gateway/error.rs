//! Error types for the provider gateway.
//!
//! The completion endpoint does not expose a structured error taxonomy, so
//! retry decisions are made from the rendered error text rather than from the
//! variant alone. A 429 surfaces as `HTTP 429: ...`, a quota failure as
//! `... RESOURCE_EXHAUSTED ...`, and both classify as retryable.

use std::time::Duration;
use thiserror::Error;

/// Case-insensitive markers that identify a rate or quota failure.
pub const RATE_LIMIT_MARKERS: &[&str] = &["429", "resource_exhausted", "rate", "quota"];

/// Whether an error message carries a rate/quota signature.
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Retry classification of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Rate/quota failure; worth retrying after a backoff.
    Retryable,
    /// Any other failure; never retried.
    Terminal,
}

/// Additional context from provider errors for debugging.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// HTTP status code from the provider.
    pub http_status: Option<u16>,
    /// Provider-specific error code or status string (e.g. "RESOURCE_EXHAUSTED").
    pub provider_code: Option<String>,
    /// Request ID from provider (x-request-id header).
    pub request_id: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Errors that can occur when calling the completion provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        context: Option<ErrorContext>,
    },

    /// Provider reported an error in an otherwise well-formed response.
    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
        context: Option<ErrorContext>,
    },

    /// Request rejected before it was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request timed out.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Network/transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Configuration error (missing API key, bad header value, etc.).
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn http(status: u16, message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Http {
            status,
            message: message.into(),
            context: Some(context),
        }
    }

    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            context: None,
        }
    }

    pub fn provider_with_context(
        provider: &'static str,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            context: Some(context),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Classify this failure by inspecting its message.
    ///
    /// Provider codes are folded into the inspected text so a `RESOURCE_EXHAUSTED`
    /// status carried only in the context still classifies as retryable.
    pub fn failure_class(&self) -> FailureClass {
        let mut text = self.to_string();
        if let Some(code) = self.context().and_then(|c| c.provider_code.as_deref()) {
            text.push(' ');
            text.push_str(code);
        }
        if is_rate_limit_message(&text) {
            FailureClass::Retryable
        } else {
            FailureClass::Terminal
        }
    }

    /// Whether this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.failure_class() == FailureClass::Retryable
    }

    /// Short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Http { .. } if self.is_retryable() => "rate_limited",
            Self::Http { .. } => "http_error",
            Self::Provider { .. } if self.is_retryable() => "quota_exhausted",
            Self::Provider { .. } => "provider_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport_error",
            Self::Config(_) => "config_error",
        }
    }

    /// Error context if available.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Http { context, .. } => context.as_ref(),
            Self::Provider { context, .. } => context.as_ref(),
            _ => None,
        }
    }

    /// Provider request ID if available.
    pub fn request_id(&self) -> Option<&str> {
        self.context().and_then(|c| c.request_id.as_deref())
    }
}
