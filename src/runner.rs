//! Runs one test case against the provider and packages the result for scoring.
//!
//! The runner never scores and never fails: provider errors are recorded as
//! an outcome plus a sentinel-prefixed output so the run can continue.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::dataset::TestCase;
use crate::gateway::{Attribution, ChatGateway, ChatModel, ChatRequest, FailureClass};
use crate::parse::{parse_with_strategy, Recommendation, FAILURE_SENTINEL};
use crate::prompts::{PromptTemplate, DEFAULT_TOOLS_PER_CASE, RECOMMENDATION_PROMPT};

/// Default model for recommendation requests.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";

/// How a case's provider call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseOutcome {
    /// Call succeeded and at least one recommendation was extracted.
    Success,
    /// Call succeeded but no recommendation could be extracted.
    EmptyOrUnparsable,
    /// Call failed with a rate/quota signature after retries were spent.
    RateLimited,
    /// Call failed for any other reason.
    Error,
}

impl CaseOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseOutcome::Success => "success",
            CaseOutcome::EmptyOrUnparsable => "empty_or_unparsable",
            CaseOutcome::RateLimited => "rate_limited",
            CaseOutcome::Error => "error",
        }
    }

    /// Whether the provider call itself failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, CaseOutcome::RateLimited | CaseOutcome::Error)
    }
}

/// Raw materials for scoring one case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseRun {
    pub case_id: String,
    pub case_name: String,
    /// Model text, or `ERROR: <message>` when the call failed.
    pub output: String,
    pub recommendations: Vec<Recommendation>,
    pub outcome: CaseOutcome,
    /// Which parse strategy recovered the array, if any.
    pub parse_strategy: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub struct CaseRunnerConfig {
    pub model: ChatModel,
    pub tools_per_case: usize,
    pub template: PromptTemplate,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for CaseRunnerConfig {
    fn default() -> Self {
        Self {
            model: ChatModel::new(DEFAULT_MODEL),
            tools_per_case: DEFAULT_TOOLS_PER_CASE,
            template: RECOMMENDATION_PROMPT,
            temperature: None,
            max_tokens: None,
        }
    }
}

pub struct CaseRunner {
    gateway: Arc<dyn ChatGateway>,
    catalog: Arc<Catalog>,
    config: CaseRunnerConfig,
    run_id: Option<Uuid>,
}

impl CaseRunner {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        catalog: Arc<Catalog>,
        config: CaseRunnerConfig,
    ) -> Self {
        Self {
            gateway,
            catalog,
            config,
            run_id: None,
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn model(&self) -> &ChatModel {
        &self.config.model
    }

    pub fn build_request(&self, case: &TestCase) -> ChatRequest {
        let prompt = self.config.template.render(
            &case.user_profile,
            case.context.as_ref(),
            &self.catalog,
            self.config.tools_per_case,
        );

        let mut attribution = Attribution::new("runner::case").with_case(case.id.clone());
        if let Some(run_id) = self.run_id {
            attribution = attribution.with_run(run_id);
        }

        let mut req =
            ChatRequest::new(self.config.model.clone(), prompt.to_messages(), attribution);
        if let Some(t) = self.config.temperature {
            req = req.temperature(t);
        }
        if let Some(max) = self.config.max_tokens {
            req = req.max_tokens(max);
        }
        req
    }

    pub async fn run(&self, case: &TestCase) -> CaseRun {
        let req = self.build_request(case);

        match self.gateway.chat(req).await {
            Ok(resp) => {
                let parsed = parse_with_strategy(&resp.content);
                let outcome = if parsed.recommendations.is_empty() {
                    let preview: String = resp.content.chars().take(120).collect();
                    warn!(
                        case_id = %case.id,
                        case = %case.name,
                        preview = %preview.replace('\n', " "),
                        "no recommendations parsed"
                    );
                    CaseOutcome::EmptyOrUnparsable
                } else {
                    info!(
                        case_id = %case.id,
                        case = %case.name,
                        tools = parsed.recommendations.len(),
                        strategy = parsed.strategy.unwrap_or("-"),
                        "ok"
                    );
                    CaseOutcome::Success
                };
                CaseRun {
                    case_id: case.id.clone(),
                    case_name: case.name.clone(),
                    output: resp.content,
                    recommendations: parsed.recommendations,
                    outcome,
                    parse_strategy: parsed.strategy,
                }
            }
            Err(err) => {
                let outcome = match err.failure_class() {
                    FailureClass::Retryable => CaseOutcome::RateLimited,
                    FailureClass::Terminal => CaseOutcome::Error,
                };
                warn!(
                    case_id = %case.id,
                    case = %case.name,
                    outcome = outcome.as_str(),
                    code = err.code(),
                    request_id = err.request_id().unwrap_or("-"),
                    error = %err,
                    "provider call failed"
                );
                CaseRun {
                    case_id: case.id.clone(),
                    case_name: case.name.clone(),
                    output: format!("{FAILURE_SENTINEL} {err}"),
                    recommendations: Vec::new(),
                    outcome,
                    parse_strategy: None,
                }
            }
        }
    }
}
