use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use forge_eval::gateway::chat_completions::ChatProvider;
use forge_eval::gateway::usage::ProviderCallRecord;
use forge_eval::gateway::{
    Attribution, CallStatus, ChatCompletionsAdapter, ChatGateway, ChatModel, ChatRequest,
    ChatResponse, ErrorContext, FailureClass, FinishReason, InvokerConfig, Message, NoopUsageSink,
    ProviderError, ResilientInvoker, UsageSink,
};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn request() -> ChatRequest {
    ChatRequest::new(
        ChatModel::new("gemini-2.5-flash-lite"),
        vec![Message::user("hi")],
        Attribution::new("test").with_case("case-1"),
    )
}

fn adapter(server: &MockServer) -> ChatCompletionsAdapter {
    ChatCompletionsAdapter::with_config("sk-test", server.uri(), Duration::from_secs(5)).unwrap()
}

fn success_body(content: &str) -> serde_json::Value {
    json!({
        "choices": [{
            "message": { "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 20 }
    })
}

// =============================================================================
// HTTP adapter
// =============================================================================

#[tokio::test]
async fn adapter_parses_success_content_and_usage() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("[]")))
        .mount(&server)
        .await;

    let resp = adapter(&server).chat(&request()).await.unwrap();
    assert_eq!(resp.content, "[]");
    assert_eq!(resp.finish_reason, FinishReason::Stop);
    assert_eq!(resp.input_tokens, 10);
    assert_eq!(resp.output_tokens, 20);
}

#[tokio::test]
async fn adapter_treats_empty_content_as_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": null }, "finish_reason": "STOP" }]
        })))
        .mount(&server)
        .await;

    let resp = adapter(&server).chat(&request()).await.unwrap();
    assert_eq!(resp.content, "");
    assert_eq!(resp.input_tokens, 0);
}

#[tokio::test]
async fn adapter_maps_429_to_retryable_http_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!([{
            "error": { "code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED" }
        }])))
        .mount(&server)
        .await;

    let err = adapter(&server).chat(&request()).await.unwrap_err();
    match &err {
        ProviderError::Http { status, .. } => assert_eq!(*status, 429),
        other => panic!("expected http error, got {other:?}"),
    }
    assert_eq!(err.failure_class(), FailureClass::Retryable);
    assert_eq!(err.code(), "rate_limited");
    assert_eq!(
        err.context().and_then(|c| c.provider_code.as_deref()),
        Some("RESOURCE_EXHAUSTED")
    );
}

#[tokio::test]
async fn adapter_maps_500_to_terminal_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "message": "internal failure", "code": "internal" }
        })))
        .mount(&server)
        .await;

    let err = adapter(&server).chat(&request()).await.unwrap_err();
    assert_eq!(err.failure_class(), FailureClass::Terminal);
    assert_eq!(err.code(), "http_error");
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn adapter_reports_missing_choices_as_provider_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let err = adapter(&server).chat(&request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::Provider { .. }));
    assert_eq!(err.failure_class(), FailureClass::Terminal);
}

struct FlipResponder {
    calls: Arc<AtomicUsize>,
    first: ResponseTemplate,
    second: ResponseTemplate,
}

impl Respond for FlipResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            self.first.clone()
        } else {
            self.second.clone()
        }
    }
}

#[tokio::test]
async fn invoker_retries_quota_error_over_http_and_succeeds() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(FlipResponder {
            calls: calls.clone(),
            first: ResponseTemplate::new(429).set_body_json(json!({
                "error": { "message": "Quota exceeded for requests per minute" }
            })),
            second: ResponseTemplate::new(200).set_body_json(success_body("ok")),
        })
        .mount(&server)
        .await;

    let invoker = ResilientInvoker::new(
        adapter(&server),
        Arc::new(NoopUsageSink),
        InvokerConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(5),
        },
    );

    let resp = invoker.chat(request()).await.unwrap();
    assert_eq!(resp.content, "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invoker_does_not_retry_server_errors() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(FlipResponder {
            calls: calls.clone(),
            first: ResponseTemplate::new(503).set_body_string("upstream unavailable"),
            second: ResponseTemplate::new(200).set_body_json(success_body("ok")),
        })
        .mount(&server)
        .await;

    let invoker = ResilientInvoker::new(
        adapter(&server),
        Arc::new(NoopUsageSink),
        InvokerConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(5),
        },
    );

    let err = invoker.chat(request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::Http { status: 503, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Scripted provider
// =============================================================================

#[derive(Clone, Copy)]
enum Step {
    RateLimited,
    Fatal,
    Reply(&'static str),
}

struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    fn new(steps: &[Step]) -> Self {
        Self {
            steps: Mutex::new(steps.iter().copied().collect()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared call counter, readable after the provider moves into an invoker.
    fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    /// Repeats one step forever.
    fn always(step: Step) -> Self {
        Self::new(&[step; 16])
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .expect("script exhausted");
        match step {
            Step::RateLimited => Err(ProviderError::http(
                429,
                "Resource has been exhausted (e.g. check quota).",
                ErrorContext::new().with_status(429),
            )),
            Step::Fatal => Err(ProviderError::provider("scripted", "model not found")),
            Step::Reply(content) => Ok(ChatResponse {
                content: content.to_string(),
                input_tokens: 1,
                output_tokens: 1,
                latency: Duration::from_millis(1),
                finish_reason: FinishReason::Stop,
            }),
        }
    }
}

#[derive(Default)]
struct RecordingUsageSink {
    records: Mutex<Vec<ProviderCallRecord>>,
}

#[async_trait]
impl UsageSink for RecordingUsageSink {
    async fn record(&self, record: ProviderCallRecord) {
        self.records.lock().unwrap().push(record);
    }
}

#[tokio::test(start_paused = true)]
async fn rate_limited_call_retries_exactly_max_retries_with_growing_waits() {
    let usage = Arc::new(RecordingUsageSink::default());
    let invoker = ResilientInvoker::new(
        ScriptedProvider::always(Step::RateLimited),
        usage.clone(),
        InvokerConfig {
            max_retries: 2,
            initial_backoff: Duration::from_secs(1),
        },
    );

    let start = tokio::time::Instant::now();
    let err = invoker.invoke(&request()).await.unwrap_err();
    assert_eq!(err.failure_class(), FailureClass::Retryable);
    assert_eq!(start.elapsed(), Duration::from_secs(3));

    let records = usage.records.lock().unwrap();
    assert_eq!(records.len(), 3, "one initial attempt plus two retries");
    assert_eq!(
        records.iter().map(|r| r.attempt).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );

    let waits: Vec<Duration> = records.iter().filter_map(|r| r.backoff).collect();
    assert_eq!(waits, vec![Duration::from_secs(1), Duration::from_secs(2)]);
    assert!(waits.windows(2).all(|w| w[0] < w[1]));
    assert!(records.iter().all(|r| r.status == CallStatus::Error));
    assert!(records.iter().all(|r| r.case_id.as_deref() == Some("case-1")));
}

#[tokio::test(start_paused = true)]
async fn non_rate_failure_is_never_retried() {
    let usage = Arc::new(RecordingUsageSink::default());
    let invoker = ResilientInvoker::new(
        ScriptedProvider::always(Step::Fatal),
        usage.clone(),
        InvokerConfig {
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
        },
    );

    let start = tokio::time::Instant::now();
    let err = invoker.invoke(&request()).await.unwrap_err();
    assert_eq!(err.failure_class(), FailureClass::Terminal);
    assert_eq!(start.elapsed(), Duration::ZERO);

    let records = usage.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].backoff.is_none());
    assert_eq!(records[0].error_code.as_deref(), Some("provider_error"));
}

#[tokio::test(start_paused = true)]
async fn zero_retries_means_one_attempt() {
    let provider = ScriptedProvider::always(Step::RateLimited);
    let calls = provider.call_counter();
    let usage = Arc::new(RecordingUsageSink::default());
    let invoker = ResilientInvoker::new(
        provider,
        usage.clone(),
        InvokerConfig {
            max_retries: 0,
            initial_backoff: Duration::from_secs(1),
        },
    );

    let start = tokio::time::Instant::now();
    let err = invoker.invoke(&request()).await.unwrap_err();
    assert_eq!(err.failure_class(), FailureClass::Retryable);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);

    let records = usage.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].backoff.is_none());
}

#[tokio::test(start_paused = true)]
async fn success_after_rate_limit_stops_retrying() {
    let usage = Arc::new(RecordingUsageSink::default());
    let invoker = ResilientInvoker::new(
        ScriptedProvider::new(&[Step::RateLimited, Step::Reply(""), Step::Fatal]),
        usage.clone(),
        InvokerConfig {
            max_retries: 3,
            initial_backoff: Duration::from_secs(4),
        },
    );

    let start = tokio::time::Instant::now();
    let resp = invoker.invoke(&request()).await.unwrap();
    assert_eq!(resp.content, "", "empty completion is still a success");
    assert_eq!(start.elapsed(), Duration::from_secs(4));

    let records = usage.records.lock().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].status, CallStatus::Success);
}
