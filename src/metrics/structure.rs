//! Metrics that apply to every case regardless of expected traits.

use std::collections::{BTreeSet, HashSet};

use super::{Metric, MetricInput, ScoreResult};
use crate::catalog::Catalog;

/// Minimum list length for full structural credit.
const FULL_CREDIT_COUNT: usize = 3;

/// Distinct categories needed for full variety credit.
const VARIETY_TARGET: f64 = 3.0;

/// Ungrounded names listed in a CatalogGrounding reason.
const MAX_LISTED_UNGROUNDED: usize = 3;

/// Did the response yield a usable list: 0 records → 0, 1–2 → 0.5, 3+ → 1.
pub struct ValidJson;

impl Metric for ValidJson {
    fn name(&self) -> &'static str {
        "valid_json"
    }

    fn score(&self, input: &MetricInput<'_>) -> ScoreResult {
        let n = input.recommendations.len();
        match n {
            0 => ScoreResult::new(self.name(), 0.0, "Invalid or empty JSON: no recommendations"),
            n if n >= FULL_CREDIT_COUNT => {
                ScoreResult::new(self.name(), 1.0, format!("Valid JSON with {n} tools"))
            }
            n => ScoreResult::new(self.name(), 0.5, format!("Only {n} tools returned")),
        }
    }
}

/// Distinct categories / 3, capped at 1.
pub struct ToolVariety;

impl Metric for ToolVariety {
    fn name(&self) -> &'static str {
        "tool_variety"
    }

    fn score(&self, input: &MetricInput<'_>) -> ScoreResult {
        let recs = input.recommendations;
        if recs.is_empty() {
            return ScoreResult::no_recommendations(self.name());
        }

        let categories: HashSet<&str> = recs.iter().map(|r| r.category_or_empty()).collect();
        let value = (categories.len() as f64 / VARIETY_TARGET).min(1.0);
        ScoreResult::new(
            self.name(),
            value,
            format!(
                "{} unique categories across {} tools",
                categories.len(),
                recs.len()
            ),
        )
    }
}

/// Fraction of recommendations whose name matches a catalog tool.
///
/// Matching is case-insensitive substring in either direction, so
/// "Canva Pro" and "Canva" both ground against `canva`.
pub struct CatalogGrounding {
    known: BTreeSet<String>,
}

impl CatalogGrounding {
    pub fn new(known: BTreeSet<String>) -> Self {
        Self { known }
    }

    pub fn from_catalog(catalog: &Catalog) -> Self {
        Self::new(catalog.known_names())
    }

    fn is_grounded(&self, name: &str) -> bool {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return false;
        }
        self.known
            .iter()
            .any(|known| name.contains(known.as_str()) || known.contains(name.as_str()))
    }
}

impl Default for CatalogGrounding {
    fn default() -> Self {
        Self::from_catalog(&Catalog::builtin())
    }
}

impl Metric for CatalogGrounding {
    fn name(&self) -> &'static str {
        "catalog_grounding"
    }

    fn score(&self, input: &MetricInput<'_>) -> ScoreResult {
        let recs = input.recommendations;
        if recs.is_empty() {
            return ScoreResult::no_recommendations(self.name());
        }

        let mut grounded = 0usize;
        let mut ungrounded: Vec<&str> = Vec::new();
        for r in recs {
            if self.is_grounded(r.name_or_empty()) {
                grounded += 1;
            } else {
                ungrounded.push(r.name.as_deref().unwrap_or("unknown"));
            }
        }

        let mut reason = format!("{grounded}/{} from catalog", recs.len());
        if !ungrounded.is_empty() {
            let listed: Vec<&str> = ungrounded
                .iter()
                .take(MAX_LISTED_UNGROUNDED)
                .copied()
                .collect();
            reason.push_str(&format!("; not in catalog: {}", listed.join(", ")));
        }

        ScoreResult::new(self.name(), grounded as f64 / recs.len() as f64, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ExpectedTraits, UserProfile};
    use crate::parse::Recommendation;

    fn named(name: &str, category: &str) -> Recommendation {
        Recommendation {
            name: Some(name.to_string()),
            category: Some(category.to_string()),
            ..Default::default()
        }
    }

    fn score(metric: &dyn Metric, recs: &[Recommendation]) -> ScoreResult {
        let expected = ExpectedTraits::default();
        let profile = UserProfile::default();
        metric.score(&MetricInput {
            recommendations: recs,
            expected: &expected,
            profile: &profile,
        })
    }

    #[test]
    fn valid_json_tiers() {
        let two = vec![named("a", "x"), named("b", "x")];
        let five: Vec<_> = (0..5).map(|i| named(&i.to_string(), "x")).collect();

        assert_eq!(score(&ValidJson, &[]).value, 0.0);
        assert_eq!(score(&ValidJson, &two[..1]).value, 0.5);
        assert_eq!(score(&ValidJson, &two).value, 0.5);
        assert_eq!(score(&ValidJson, &five[..3]).value, 1.0);
        assert_eq!(score(&ValidJson, &five).value, 1.0);
        assert!(score(&ValidJson, &[]).reason.contains("no recommendations"));
    }

    #[test]
    fn tool_variety_caps_at_three_categories() {
        let one = vec![named("a", "AI Design"), named("b", "AI Design")];
        let result = score(&ToolVariety, &one);
        assert!((result.value - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.reason, "1 unique categories across 2 tools");

        let four = vec![
            named("a", "AI Design"),
            named("b", "AI Audio"),
            named("c", "Vibe Coding"),
            named("d", "AI Writing"),
        ];
        assert_eq!(score(&ToolVariety, &four).value, 1.0);
        assert_eq!(score(&ToolVariety, &[]).value, 0.0);
    }

    #[test]
    fn tool_variety_counts_missing_category_as_its_own_bucket() {
        let recs = vec![named("a", "AI Design"), Recommendation::default()];
        let result = score(&ToolVariety, &recs);
        assert!((result.value - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn catalog_grounding_names_hallucinated_tools() {
        let recs = vec![named("Canva", "AI Design"), named("FakeToolXYZ", "AI Design")];
        let result = score(&CatalogGrounding::default(), &recs);
        assert_eq!(result.value, 0.5);
        assert!(result.reason.contains("FakeToolXYZ"), "{}", result.reason);
        assert!(result.reason.starts_with("1/2 from catalog"));
    }

    #[test]
    fn catalog_grounding_matches_in_either_direction() {
        let metric = CatalogGrounding::default();
        assert!(metric.is_grounded("Canva Pro"));
        assert!(metric.is_grounded("  DALLE 3 "));
        assert!(metric.is_grounded("Notion"));
        assert!(!metric.is_grounded("Photoshop"));
        assert!(!metric.is_grounded(""));
    }

    #[test]
    fn catalog_grounding_lists_at_most_three_ungrounded() {
        let recs: Vec<_> = ["Foo", "Bar", "Baz", "Qux"]
            .iter()
            .map(|n| named(n, "x"))
            .collect();
        let result = score(&CatalogGrounding::default(), &recs);
        assert_eq!(result.value, 0.0);
        assert!(result.reason.contains("Foo, Bar, Baz"));
        assert!(!result.reason.contains("Qux"));
    }

    #[test]
    fn catalog_grounding_reports_unnamed_records_as_unknown() {
        let recs = vec![Recommendation::default()];
        let result = score(&CatalogGrounding::default(), &recs);
        assert_eq!(result.value, 0.0);
        assert!(result.reason.contains("unknown"));
    }
}
