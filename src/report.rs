//! Report generation for evaluation runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dataset::TestCase;
use crate::metrics::ScoreResult;
use crate::orchestrator::{RunStats, StopReason};
use crate::runner::{CaseOutcome, CaseRun};

/// Characters of model output kept in a case report.
const OUTPUT_PREVIEW_CHARS: usize = 120;

/// A processed case with its metric results.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCase {
    pub run: CaseRun,
    pub scores: Vec<ScoreResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub experiment_name: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub dataset_hash: String,
    pub model: String,
    pub stats: RunStats,
    pub stop_reason: StopReason,
    pub cases_skipped: usize,
    pub latency_ms: u128,
    pub verdicts: VerdictSummary,
    pub metrics: Vec<MetricSummary>,
    pub cases: Vec<CaseReport>,
}

/// Pass/fail tally over processed cases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerdictSummary {
    pub threshold: f64,
    pub passed: usize,
    pub failed: usize,
    /// `passed / (passed + failed)`, 0 when nothing was processed.
    pub pass_rate: f64,
    pub average_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub name: String,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Cases that produced a value for this metric.
    pub scored: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub id: String,
    pub name: String,
    pub outcome: CaseOutcome,
    pub recommendation_count: usize,
    /// Mean of the metric values; 0 when nothing was recommended.
    pub score: f64,
    pub passed: bool,
    pub scores: Vec<ScoreResult>,
    pub output_preview: String,
}

/// Everything [`build_report`] needs from a finished run.
pub struct ReportInputs<'a> {
    pub experiment_name: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub dataset_hash: String,
    pub model: String,
    pub stats: RunStats,
    pub stop_reason: StopReason,
    pub cases_skipped: usize,
    pub latency_ms: u128,
    pub pass_threshold: f64,
    pub metric_names: &'a [&'static str],
    pub cases: &'a [ScoredCase],
}

pub fn build_report(inputs: ReportInputs<'_>) -> RunReport {
    RunReport {
        verdicts: summarize_verdicts(inputs.cases, inputs.pass_threshold),
        metrics: summarize_metrics(inputs.metric_names, inputs.cases),
        cases: inputs
            .cases
            .iter()
            .map(|c| CaseReport::from_scored(c, inputs.pass_threshold))
            .collect(),
        experiment_name: inputs.experiment_name,
        run_id: inputs.run_id,
        started_at: inputs.started_at,
        dataset_hash: inputs.dataset_hash,
        model: inputs.model,
        stats: inputs.stats,
        stop_reason: inputs.stop_reason,
        cases_skipped: inputs.cases_skipped,
        latency_ms: inputs.latency_ms,
    }
}

/// Aggregate score for one case: the mean metric value, or 0 when the model
/// produced no usable recommendations.
pub fn case_score(case: &ScoredCase) -> f64 {
    if case.run.recommendations.is_empty() || case.scores.is_empty() {
        return 0.0;
    }
    case.scores.iter().map(|s| s.value).sum::<f64>() / case.scores.len() as f64
}

/// A case passes when its aggregate score reaches the threshold.
pub fn case_passed(score: f64, threshold: f64) -> bool {
    score >= threshold
}

pub fn summarize_verdicts(cases: &[ScoredCase], threshold: f64) -> VerdictSummary {
    let scores: Vec<f64> = cases.iter().map(case_score).collect();
    let passed = scores.iter().filter(|s| case_passed(**s, threshold)).count();
    let (pass_rate, average_score) = if scores.is_empty() {
        (0.0, 0.0)
    } else {
        let n = scores.len() as f64;
        (passed as f64 / n, scores.iter().sum::<f64>() / n)
    };
    VerdictSummary {
        threshold,
        passed,
        failed: scores.len() - passed,
        pass_rate,
        average_score,
    }
}

/// Per-metric aggregates in suite order. A metric with no values reports zeros.
pub fn summarize_metrics(names: &[&str], cases: &[ScoredCase]) -> Vec<MetricSummary> {
    names
        .iter()
        .map(|name| {
            let values: Vec<f64> = cases
                .iter()
                .flat_map(|c| c.scores.iter())
                .filter(|s| s.name == *name)
                .map(|s| s.value)
                .collect();
            if values.is_empty() {
                return MetricSummary {
                    name: name.to_string(),
                    mean: 0.0,
                    min: 0.0,
                    max: 0.0,
                    scored: 0,
                };
            }
            let sum: f64 = values.iter().sum();
            MetricSummary {
                name: name.to_string(),
                mean: sum / values.len() as f64,
                min: values.iter().copied().fold(f64::INFINITY, f64::min),
                max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                scored: values.len(),
            }
        })
        .collect()
}

impl CaseReport {
    fn from_scored(case: &ScoredCase, threshold: f64) -> Self {
        let score = case_score(case);
        Self {
            id: case.run.case_id.clone(),
            name: case.run.case_name.clone(),
            outcome: case.run.outcome,
            recommendation_count: case.run.recommendations.len(),
            score,
            passed: case_passed(score, threshold),
            scores: case.scores.clone(),
            output_preview: case
                .run
                .output
                .chars()
                .take(OUTPUT_PREVIEW_CHARS)
                .collect::<String>()
                .replace('\n', " "),
        }
    }
}

pub fn render_report_markdown(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Evaluation Report: {}\n\n", report.experiment_name));
    out.push_str(&format!("- Run ID: `{}`\n", report.run_id));
    out.push_str(&format!(
        "- Started: {}\n",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!("- Dataset hash: `{}`\n", report.dataset_hash));
    out.push_str(&format!("- Model: {}\n", report.model));
    out.push_str(&format!("- Stop reason: {:?}\n", report.stop_reason));
    if report.cases_skipped > 0 {
        out.push_str(&format!("- Cases skipped: {}\n", report.cases_skipped));
    }
    out.push_str(&format!("- Latency: {} ms\n", report.latency_ms));

    out.push_str("\n## Run Stats\n\n");
    out.push_str(&format!("- Success: {}\n", report.stats.success));
    out.push_str(&format!("- Rate limited: {}\n", report.stats.rate_limited));
    out.push_str(&format!("- Other error: {}\n", report.stats.other_error));
    out.push_str(&format!(
        "- Empty or unparsable: {}\n",
        report.stats.empty_or_unparsable
    ));
    out.push_str(&format!("- Total: {}\n", report.stats.total()));

    let v = &report.verdicts;
    out.push_str("\n## Verdicts\n\n");
    out.push_str(&format!("- Passed: {}\n", v.passed));
    out.push_str(&format!("- Failed: {}\n", v.failed));
    out.push_str(&format!("- Pass rate: {:.0}%\n", v.pass_rate * 100.0));
    out.push_str(&format!("- Average score: {:.3}\n", v.average_score));
    out.push_str(&format!("- Threshold: {:.2}\n", v.threshold));

    out.push_str("\n## Metrics\n\n");
    out.push_str("| Metric | Mean | Min | Max | Scored |\n");
    out.push_str("|---|---|---|---|---|\n");
    for m in &report.metrics {
        out.push_str(&format!(
            "| {} | {:.3} | {:.3} | {:.3} | {} |\n",
            m.name, m.mean, m.min, m.max, m.scored
        ));
    }

    out.push_str("\n## Cases\n\n");
    for case in &report.cases {
        out.push_str(&format!(
            "### [{}] {} ({}, {} tools, score {:.3}, {})\n\n",
            case.id,
            case.name,
            case.outcome.as_str(),
            case.recommendation_count,
            case.score,
            if case.passed { "pass" } else { "fail" }
        ));
        for s in &case.scores {
            out.push_str(&format!("- {}: {:.2} ({})\n", s.name, s.value, s.reason));
        }
        out.push('\n');
    }

    out
}

/// blake3 of the serialized cases, so reports from the same dataset compare.
pub fn hash_cases(cases: &[TestCase]) -> String {
    let bytes = serde_json::to_vec(cases).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}
