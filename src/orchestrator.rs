//! Drives every test case through the case runner, paces provider calls,
//! accumulates run statistics and scores the outputs.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::dataset::TestCase;
use crate::metrics::{MetricInput, MetricSuite};
use crate::report::{build_report, hash_cases, ReportInputs, RunReport, ScoredCase};
use crate::runner::{CaseOutcome, CaseRun, CaseRunner};
use crate::sink::{ExperimentSubmission, ResultsSink, SinkError};

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub experiment_name: String,
    /// Wait after each case before its slot takes the next one.
    pub call_delay: Duration,
    /// `call_delay` is multiplied by this after a failed call.
    pub failure_penalty_multiplier: u32,
    /// Maximum cases in flight. Values below 1 are treated as 1.
    pub concurrency: usize,
    /// Minimum aggregate score, in `[0, 1]`, for a case to pass.
    pub pass_threshold: f64,
}

pub const DEFAULT_PASS_THRESHOLD: f64 = 0.6;

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            experiment_name: "forge-eval".to_string(),
            call_delay: Duration::from_millis(2_500),
            failure_penalty_multiplier: 2,
            concurrency: 1,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
        }
    }
}

impl RunConfig {
    /// Delay owed after a case with this outcome.
    pub fn pacing_delay(&self, outcome: CaseOutcome) -> Duration {
        if outcome.is_failure() {
            self.call_delay
                .saturating_mul(self.failure_penalty_multiplier.max(1))
        } else {
            self.call_delay
        }
    }
}

/// Outcome counters. Exactly one counter moves per processed case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub success: usize,
    pub rate_limited: usize,
    pub other_error: usize,
    pub empty_or_unparsable: usize,
}

impl RunStats {
    pub fn record(&mut self, outcome: CaseOutcome) {
        match outcome {
            CaseOutcome::Success => self.success += 1,
            CaseOutcome::RateLimited => self.rate_limited += 1,
            CaseOutcome::Error => self.other_error += 1,
            CaseOutcome::EmptyOrUnparsable => self.empty_or_unparsable += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.rate_limited + self.other_error + self.empty_or_unparsable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The run finished but its results could not be submitted.
    #[error("results sink failed: {source}")]
    Sink {
        report: Box<RunReport>,
        source: SinkError,
    },
}

impl OrchestratorError {
    pub fn into_parts(self) -> (RunReport, SinkError) {
        match self {
            OrchestratorError::Sink { report, source } => (*report, source),
        }
    }
}

pub struct RunOrchestrator {
    runner: CaseRunner,
    suite: MetricSuite,
    config: RunConfig,
    run_id: Uuid,
}

impl RunOrchestrator {
    pub fn new(runner: CaseRunner, suite: MetricSuite, config: RunConfig) -> Self {
        let run_id = Uuid::new_v4();
        Self {
            runner: runner.with_run_id(run_id),
            suite,
            config,
            run_id,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Process every case and return the scored report. Never fails: per-case
    /// failures are recorded as outcomes.
    pub async fn run(&self, cases: &[TestCase], cancel_flag: Option<&AtomicBool>) -> RunReport {
        self.execute(cases, cancel_flag).await.0
    }

    /// As [`run`](Self::run), then submit the results to `sink`. On a sink
    /// failure the finished report travels inside the error.
    pub async fn run_and_submit(
        &self,
        cases: &[TestCase],
        cancel_flag: Option<&AtomicBool>,
        sink: &dyn ResultsSink,
    ) -> Result<RunReport, OrchestratorError> {
        let (report, scored) = self.execute(cases, cancel_flag).await;
        let submission = ExperimentSubmission::from_run(&report, &scored);
        if let Err(source) = sink.submit(&submission).await {
            return Err(OrchestratorError::Sink {
                report: Box::new(report),
                source,
            });
        }
        info!(
            experiment = %report.experiment_name,
            cases = submission.cases.len(),
            "results submitted"
        );
        Ok(report)
    }

    async fn execute(
        &self,
        cases: &[TestCase],
        cancel_flag: Option<&AtomicBool>,
    ) -> (RunReport, Vec<ScoredCase>) {
        let start = Instant::now();
        let started_at = Utc::now();
        let concurrency = self.config.concurrency.max(1);

        info!(
            run_id = %self.run_id,
            experiment = %self.config.experiment_name,
            model = %self.runner.model(),
            cases = cases.len(),
            concurrency,
            "run started"
        );

        let total = cases.len();
        // Results arrive in completion order; the index restores dataset order.
        let mut runs: Vec<(usize, &TestCase, Option<CaseRun>)> =
            stream::iter(cases.iter().enumerate())
                .map(move |(index, case)| async move {
                    if let Some(flag) = cancel_flag {
                        if flag.load(AtomicOrdering::Relaxed) {
                            return (index, case, None);
                        }
                    }
                    let run = self.runner.run(case).await;
                    info!(
                        case = index + 1,
                        total,
                        case_id = %case.id,
                        outcome = run.outcome.as_str(),
                        "case finished"
                    );
                    let delay = self.config.pacing_delay(run.outcome);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    (index, case, Some(run))
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;
        runs.sort_by_key(|(index, _, _)| *index);

        let mut stats = RunStats::default();
        let mut skipped = 0usize;
        let mut scored: Vec<ScoredCase> = Vec::with_capacity(runs.len());
        for (_, case, run) in runs {
            let Some(run) = run else {
                skipped += 1;
                continue;
            };
            stats.record(run.outcome);
            let scores = self.suite.score_all(&MetricInput {
                recommendations: &run.recommendations,
                expected: &case.expected_traits,
                profile: &case.user_profile,
            });
            scored.push(ScoredCase { run, scores });
        }

        let stop_reason = if skipped > 0 {
            StopReason::Cancelled
        } else {
            StopReason::Completed
        };

        info!(
            run_id = %self.run_id,
            success = stats.success,
            rate_limited = stats.rate_limited,
            other_error = stats.other_error,
            empty_or_unparsable = stats.empty_or_unparsable,
            skipped,
            "run finished"
        );

        let report = build_report(ReportInputs {
            experiment_name: self.config.experiment_name.clone(),
            run_id: self.run_id,
            started_at,
            dataset_hash: hash_cases(cases),
            model: self.runner.model().model_id().to_string(),
            stats,
            stop_reason,
            cases_skipped: skipped,
            latency_ms: start.elapsed().as_millis(),
            pass_threshold: self.config.pass_threshold,
            metric_names: &self.suite.names(),
            cases: &scored,
        });
        (report, scored)
    }
}
