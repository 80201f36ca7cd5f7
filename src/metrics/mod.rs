//! Quality metrics over extracted recommendations.
//!
//! Each metric is a pure function of the recommendations, the case's expected
//! traits and the user profile. Metrics governed by a trait return full credit
//! when that trait is absent. Every result carries a reason, including zeros.

pub mod constraints;
pub mod structure;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::dataset::{ExpectedTraits, UserProfile};
use crate::parse::Recommendation;

pub use constraints::{Novelty, PricingRespect, SkillMatch};
pub use structure::{CatalogGrounding, ToolVariety, ValidJson};

/// Reason used by every metric when there is nothing to score.
pub const NO_RECOMMENDATIONS: &str = "No recommendations parsed";

/// Per-metric, per-case outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub name: String,
    /// Conventionally in [0, 1].
    pub value: f64,
    pub reason: String,
}

impl ScoreResult {
    pub fn new(name: &str, value: f64, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value,
            reason: reason.into(),
        }
    }

    /// Full credit for a metric whose governing trait is absent.
    pub fn not_applicable(name: &str, reason: impl Into<String>) -> Self {
        Self::new(name, 1.0, reason)
    }

    pub fn no_recommendations(name: &str) -> Self {
        Self::new(name, 0.0, NO_RECOMMENDATIONS)
    }
}

/// Everything a metric may look at.
#[derive(Debug, Clone, Copy)]
pub struct MetricInput<'a> {
    pub recommendations: &'a [Recommendation],
    pub expected: &'a ExpectedTraits,
    pub profile: &'a UserProfile,
}

pub trait Metric: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, input: &MetricInput<'_>) -> ScoreResult;
}

/// Ordered collection of metrics applied to every case.
#[derive(Clone)]
pub struct MetricSuite {
    metrics: Vec<Arc<dyn Metric>>,
}

impl MetricSuite {
    pub fn new(metrics: Vec<Arc<dyn Metric>>) -> Self {
        Self { metrics }
    }

    /// The six evaluation metrics, grounded against `catalog`.
    pub fn standard(catalog: &Catalog) -> Self {
        Self::new(vec![
            Arc::new(ValidJson),
            Arc::new(PricingRespect),
            Arc::new(SkillMatch),
            Arc::new(Novelty),
            Arc::new(ToolVariety),
            Arc::new(CatalogGrounding::from_catalog(catalog)),
        ])
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.metrics.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn score_all(&self, input: &MetricInput<'_>) -> Vec<ScoreResult> {
        self.metrics.iter().map(|m| m.score(input)).collect()
    }
}

impl std::fmt::Debug for MetricSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricSuite")
            .field("metrics", &self.names())
            .finish()
    }
}
