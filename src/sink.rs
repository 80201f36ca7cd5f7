//! Write-only destination for experiment results.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::metrics::ScoreResult;
use crate::orchestrator::{RunStats, StopReason};
use crate::report::{
    case_passed, case_score, MetricSummary, RunReport, ScoredCase, VerdictSummary,
};
use crate::runner::CaseOutcome;

#[derive(Debug, Clone, Serialize)]
pub struct CaseSubmission {
    pub case_id: String,
    pub case_name: String,
    pub outcome: CaseOutcome,
    /// Full model output, or the failure description.
    pub output: String,
    pub score: f64,
    pub passed: bool,
    pub scores: Vec<ScoreResult>,
}

/// One run's results as handed to a [`ResultsSink`].
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentSubmission {
    pub experiment_name: String,
    pub run_id: Uuid,
    pub model: String,
    pub dataset_hash: String,
    pub submitted_at: DateTime<Utc>,
    pub stats: RunStats,
    pub stop_reason: StopReason,
    pub verdicts: VerdictSummary,
    pub metrics: Vec<MetricSummary>,
    pub cases: Vec<CaseSubmission>,
}

impl ExperimentSubmission {
    pub fn from_run(report: &RunReport, scored: &[ScoredCase]) -> Self {
        Self {
            experiment_name: report.experiment_name.clone(),
            run_id: report.run_id,
            model: report.model.clone(),
            dataset_hash: report.dataset_hash.clone(),
            submitted_at: Utc::now(),
            stats: report.stats,
            stop_reason: report.stop_reason,
            verdicts: report.verdicts,
            metrics: report.metrics.clone(),
            cases: scored
                .iter()
                .map(|c| {
                    let score = case_score(c);
                    CaseSubmission {
                        case_id: c.run.case_id.clone(),
                        case_name: c.run.case_name.clone(),
                        outcome: c.run.outcome,
                        output: c.run.output.clone(),
                        score,
                        passed: case_passed(score, report.verdicts.threshold),
                        scores: c.scores.clone(),
                    }
                })
                .collect(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[async_trait]
pub trait ResultsSink: Send + Sync {
    async fn submit(&self, submission: &ExperimentSubmission) -> Result<(), SinkError>;
}

/// Discards submissions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResultsSink;

#[async_trait]
impl ResultsSink for NoopResultsSink {
    async fn submit(&self, _submission: &ExperimentSubmission) -> Result<(), SinkError> {
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SinkLine<'a> {
    Case {
        experiment_name: &'a str,
        run_id: Uuid,
        #[serde(flatten)]
        case: &'a CaseSubmission,
    },
    Summary {
        experiment_name: &'a str,
        run_id: Uuid,
        model: &'a str,
        dataset_hash: &'a str,
        submitted_at: DateTime<Utc>,
        stats: RunStats,
        stop_reason: StopReason,
        verdicts: VerdictSummary,
        metrics: &'a [MetricSummary],
    },
}

/// Appends one line per case and a closing summary line to a JSONL file.
#[derive(Debug, Clone)]
pub struct JsonlResultsSink {
    path: PathBuf,
}

impl JsonlResultsSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResultsSink for JsonlResultsSink {
    async fn submit(&self, submission: &ExperimentSubmission) -> Result<(), SinkError> {
        let experiment_name = submission.experiment_name.as_str();
        let mut buf = String::new();
        for case in &submission.cases {
            push_line(
                &mut buf,
                &SinkLine::Case {
                    experiment_name,
                    run_id: submission.run_id,
                    case,
                },
            )?;
        }
        push_line(
            &mut buf,
            &SinkLine::Summary {
                experiment_name,
                run_id: submission.run_id,
                model: &submission.model,
                dataset_hash: &submission.dataset_hash,
                submitted_at: submission.submitted_at,
                stats: submission.stats,
                stop_reason: submission.stop_reason,
                verdicts: submission.verdicts,
                metrics: &submission.metrics,
            },
        )?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        tracing::debug!(
            path = %self.path.display(),
            lines = submission.cases.len() + 1,
            "results written"
        );
        Ok(())
    }
}

fn push_line(buf: &mut String, line: &SinkLine<'_>) -> Result<(), SinkError> {
    let json = serde_json::to_string(line).map_err(|e| SinkError::Serde(e.to_string()))?;
    buf.push_str(&json);
    buf.push('\n');
    Ok(())
}
