#![forbid(unsafe_code)]

//! # forge-eval
//!
//! Evaluation harness for tool-recommendation prompts.
//!
//! Each labeled test case is rendered into a recommendation request against a
//! fixed tool catalog and sent to an OpenAI-compatible chat endpoint through a
//! retrying invoker. The free-form reply is parsed tolerantly into structured
//! recommendations, which are then scored by independent metrics against the
//! case's expected traits. The orchestrator paces calls, counts outcomes and
//! produces a report that can also be submitted to a results sink.

pub mod catalog;
pub mod config;
pub mod dataset;
pub mod gateway;
pub mod metrics;
pub mod orchestrator;
pub mod parse;
pub mod prompts;
pub mod report;
pub mod runner;
pub mod sink;

pub use catalog::{Catalog, CatalogEntry, CatalogError};
pub use config::{ConfigError, EvalSettings};
pub use dataset::{DatasetError, DatasetStore, FileDatasetStore, TestCase};
pub use gateway::{
    ChatCompletionsAdapter, ChatGateway, InvokerConfig, ProviderError, ResilientInvoker,
    UsageSink,
};
pub use metrics::{Metric, MetricInput, MetricSuite, ScoreResult};
pub use orchestrator::{OrchestratorError, RunConfig, RunOrchestrator, RunStats, StopReason};
pub use parse::{parse_recommendations, Recommendation};
pub use report::{render_report_markdown, RunReport, VerdictSummary};
pub use runner::{CaseOutcome, CaseRun, CaseRunner, CaseRunnerConfig};
pub use sink::{ExperimentSubmission, JsonlResultsSink, NoopResultsSink, ResultsSink, SinkError};
