//! Run-level settings read from the environment.
//!
//! Checked once before any case is processed; a missing credential is the
//! only condition that stops a run before it starts.

use std::time::Duration;

use crate::gateway::chat_completions::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use crate::gateway::{ChatCompletionsAdapter, ChatModel, InvokerConfig, ProviderError};
use crate::orchestrator::RunConfig;
use crate::runner::{CaseRunnerConfig, DEFAULT_MODEL};

pub const API_KEY_VAR: &str = "FORGE_EVAL_API_KEY";
pub const FALLBACK_API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const BASE_URL_VAR: &str = "FORGE_EVAL_BASE_URL";
pub const MODEL_VAR: &str = "FORGE_EVAL_MODEL";
pub const TIMEOUT_VAR: &str = "FORGE_EVAL_TIMEOUT_SECONDS";
pub const MAX_RETRIES_VAR: &str = "FORGE_EVAL_MAX_RETRIES";
pub const INITIAL_BACKOFF_VAR: &str = "FORGE_EVAL_INITIAL_BACKOFF_SECONDS";
pub const CALL_DELAY_VAR: &str = "FORGE_EVAL_CALL_DELAY_SECONDS";
pub const TEMPERATURE_VAR: &str = "FORGE_EVAL_TEMPERATURE";
pub const MAX_TOKENS_VAR: &str = "FORGE_EVAL_MAX_TOKENS";
pub const PASS_THRESHOLD_VAR: &str = "FORGE_EVAL_PASS_THRESHOLD";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing credentials: set FORGE_EVAL_API_KEY or GEMINI_API_KEY")]
    MissingCredentials,
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone)]
pub struct EvalSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: ChatModel,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub call_delay: Duration,
    /// `None` leaves the provider's sampling default in place.
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Minimum aggregate case score, in `[0, 1]`, for a case to pass.
    pub pass_threshold: f64,
}

impl std::fmt::Debug for EvalSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalSettings")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("initial_backoff", &self.initial_backoff)
            .field("call_delay", &self.call_delay)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("pass_threshold", &self.pass_threshold)
            .finish()
    }
}

impl EvalSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get(API_KEY_VAR)
            .or_else(|| get(FALLBACK_API_KEY_VAR))
            .ok_or(ConfigError::MissingCredentials)?;

        let invoker = InvokerConfig::default();
        let run = RunConfig::default();

        Ok(Self {
            api_key,
            base_url: get(BASE_URL_VAR).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: ChatModel::new(get(MODEL_VAR).unwrap_or_else(|| DEFAULT_MODEL.to_string())),
            timeout: seconds(TIMEOUT_VAR, get(TIMEOUT_VAR), DEFAULT_TIMEOUT, true)?,
            max_retries: parsed(MAX_RETRIES_VAR, get(MAX_RETRIES_VAR))?
                .unwrap_or(invoker.max_retries),
            initial_backoff: seconds(
                INITIAL_BACKOFF_VAR,
                get(INITIAL_BACKOFF_VAR),
                invoker.initial_backoff,
                true,
            )?,
            call_delay: seconds(CALL_DELAY_VAR, get(CALL_DELAY_VAR), run.call_delay, false)?,
            temperature: parsed(TEMPERATURE_VAR, get(TEMPERATURE_VAR))?,
            max_tokens: parsed(MAX_TOKENS_VAR, get(MAX_TOKENS_VAR))?,
            pass_threshold: threshold(get(PASS_THRESHOLD_VAR), run.pass_threshold)?,
        })
    }

    /// Runner settings for the configured model and sampling options.
    pub fn runner_config(&self) -> CaseRunnerConfig {
        CaseRunnerConfig {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..Default::default()
        }
    }

    pub fn invoker_config(&self) -> InvokerConfig {
        InvokerConfig {
            max_retries: self.max_retries,
            initial_backoff: self.initial_backoff,
        }
    }

    pub fn adapter(&self) -> Result<ChatCompletionsAdapter, ProviderError> {
        ChatCompletionsAdapter::with_config(&self.api_key, &self.base_url, self.timeout)
    }
}

fn parsed<T>(key: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|raw| {
        raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            reason: e.to_string(),
            value: raw,
        })
    })
    .transpose()
}

fn threshold(raw: Option<String>, default: f64) -> Result<f64, ConfigError> {
    let Some(value) = parsed::<f64>(PASS_THRESHOLD_VAR, raw)? else {
        return Ok(default);
    };
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidValue {
            key: PASS_THRESHOLD_VAR,
            value: value.to_string(),
            reason: "must be between 0 and 1".to_string(),
        });
    }
    Ok(value)
}

fn seconds(
    key: &'static str,
    raw: Option<String>,
    default: Duration,
    positive: bool,
) -> Result<Duration, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let invalid = |reason: &str| ConfigError::InvalidValue {
        key,
        value: raw.clone(),
        reason: reason.to_string(),
    };
    let secs: f64 = raw.parse().map_err(|_| invalid("not a number"))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(invalid("must be a non-negative number of seconds"));
    }
    if positive && secs == 0.0 {
        return Err(invalid("must be greater than zero"));
    }
    Ok(Duration::from_secs_f64(secs))
}
