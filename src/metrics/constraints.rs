//! Metrics governed by an expected trait. Each is not applicable (1.0) when
//! its trait is absent.

use super::{Metric, MetricInput, ScoreResult};

/// Difficulty tiers in ascending order.
const LOWEST_TIER: &str = "beginner";
const HIGHEST_TIER: &str = "advanced";

/// 1.0 iff every recommendation's pricing mentions "free" when `mustBeFree` is set.
pub struct PricingRespect;

impl Metric for PricingRespect {
    fn name(&self) -> &'static str {
        "pricing_respect"
    }

    fn score(&self, input: &MetricInput<'_>) -> ScoreResult {
        if input.expected.must_be_free != Some(true) {
            return ScoreResult::not_applicable(self.name(), "No pricing constraint");
        }
        let recs = input.recommendations;
        if recs.is_empty() {
            return ScoreResult::no_recommendations(self.name());
        }

        let paid: Vec<&str> = recs
            .iter()
            .filter(|r| !r.pricing_or_empty().to_lowercase().contains("free"))
            .map(|r| r.name.as_deref().unwrap_or("unknown"))
            .collect();

        if paid.is_empty() {
            ScoreResult::new(self.name(), 1.0, "All recommended tools are free or freemium")
        } else {
            ScoreResult::new(
                self.name(),
                0.0,
                format!("Paid tools recommended: {}", paid.join(", ")),
            )
        }
    }
}

/// Fraction of recommendations at an acceptable difficulty for `skillLevel`.
///
/// A beginner accepts anything but advanced, an advanced user anything but
/// beginner. Intermediate accepts only intermediate.
pub struct SkillMatch;

impl SkillMatch {
    fn accepts(level: &str, difficulty: &str) -> bool {
        difficulty == level
            || (level == LOWEST_TIER && difficulty != HIGHEST_TIER)
            || (level == HIGHEST_TIER && difficulty != LOWEST_TIER)
    }
}

impl Metric for SkillMatch {
    fn name(&self) -> &'static str {
        "skill_match"
    }

    fn score(&self, input: &MetricInput<'_>) -> ScoreResult {
        let level = match input.expected.skill_level.as_deref().map(str::trim) {
            Some(level) if !level.is_empty() => level.to_lowercase(),
            _ => return ScoreResult::not_applicable(self.name(), "No skill level specified"),
        };
        let recs = input.recommendations;
        if recs.is_empty() {
            return ScoreResult::no_recommendations(self.name());
        }

        let matched = recs
            .iter()
            .filter(|r| Self::accepts(&level, &r.difficulty_or_empty().trim().to_lowercase()))
            .count();

        ScoreResult::new(
            self.name(),
            matched as f64 / recs.len() as f64,
            format!("{matched}/{} tools match {level} level", recs.len()),
        )
    }
}

/// 0.0 if any recommendation names a tool the user already uses.
pub struct Novelty;

impl Metric for Novelty {
    fn name(&self) -> &'static str {
        "novelty"
    }

    fn score(&self, input: &MetricInput<'_>) -> ScoreResult {
        if input.expected.should_not_suggest_known != Some(true) {
            return ScoreResult::not_applicable(self.name(), "Novelty not required");
        }
        let known = input.profile.known_tools();
        if known.is_empty() {
            return ScoreResult::not_applicable(self.name(), "User has no existing tools");
        }
        let recs = input.recommendations;
        if recs.is_empty() {
            return ScoreResult::no_recommendations(self.name());
        }

        let repeated: Vec<&str> = recs
            .iter()
            .filter(|r| {
                let name = r.name_or_empty().to_lowercase();
                known.iter().any(|k| name.contains(k.as_str()))
            })
            .map(|r| r.name_or_empty())
            .collect();

        if repeated.is_empty() {
            ScoreResult::new(self.name(), 1.0, "No known tools suggested")
        } else {
            ScoreResult::new(
                self.name(),
                0.0,
                format!("Suggested known tools: {}", repeated.join(", ")),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ExpectedTraits, UserProfile};
    use crate::parse::Recommendation;

    fn rec(name: &str, difficulty: &str, pricing: &str) -> Recommendation {
        Recommendation {
            name: Some(name.to_string()),
            difficulty: Some(difficulty.to_string()),
            pricing: Some(pricing.to_string()),
            ..Default::default()
        }
    }

    fn score(
        metric: &dyn Metric,
        recs: &[Recommendation],
        expected: &ExpectedTraits,
        profile: &UserProfile,
    ) -> ScoreResult {
        metric.score(&MetricInput {
            recommendations: recs,
            expected,
            profile,
        })
    }

    fn known(tools: &str) -> UserProfile {
        UserProfile {
            existing_tools: Some(tools.to_string()),
            ..Default::default()
        }
    }

    fn novelty_required() -> ExpectedTraits {
        ExpectedTraits {
            should_not_suggest_known: Some(true),
            ..Default::default()
        }
    }

    #[test]
    fn novelty_flags_substring_of_known_tool() {
        let recs = vec![rec("Canva Pro", "Beginner", "Paid")];
        let result = score(&Novelty, &recs, &novelty_required(), &known("Canva, Figma"));
        assert_eq!(result.value, 0.0);
        assert!(result.reason.contains("Canva Pro"));
    }

    #[test]
    fn novelty_passes_unrelated_tools() {
        let recs = vec![rec("Runway", "Intermediate", "Paid"), rec("Suno", "Beginner", "Freemium")];
        let result = score(&Novelty, &recs, &novelty_required(), &known("Canva, Figma"));
        assert_eq!(result.value, 1.0);
    }

    #[test]
    fn novelty_not_applicable_without_trait_or_known_tools() {
        let recs = vec![rec("Canva", "Beginner", "Free")];
        let off = score(&Novelty, &recs, &ExpectedTraits::default(), &known("Canva"));
        assert_eq!(off.value, 1.0);

        let false_trait = ExpectedTraits {
            should_not_suggest_known: Some(false),
            ..Default::default()
        };
        assert_eq!(score(&Novelty, &recs, &false_trait, &known("Canva")).value, 1.0);

        let blank = score(&Novelty, &[], &novelty_required(), &known(" , "));
        assert_eq!(blank.value, 1.0);
        assert_eq!(blank.reason, "User has no existing tools");
    }

    #[test]
    fn pricing_requires_free_in_every_record() {
        let must_be_free = ExpectedTraits {
            must_be_free: Some(true),
            ..Default::default()
        };
        let profile = UserProfile::default();

        let ok = vec![rec("Suno", "Beginner", "Freemium"), rec("Canva", "Beginner", "FREE")];
        assert_eq!(score(&PricingRespect, &ok, &must_be_free, &profile).value, 1.0);

        let mixed = vec![rec("Suno", "Beginner", "Freemium"), rec("Runway", "Beginner", "Paid")];
        let result = score(&PricingRespect, &mixed, &must_be_free, &profile);
        assert_eq!(result.value, 0.0);
        assert!(result.reason.contains("Runway"));

        let unpriced = vec![Recommendation {
            name: Some("Mystery".into()),
            ..Default::default()
        }];
        assert_eq!(score(&PricingRespect, &unpriced, &must_be_free, &profile).value, 0.0);

        let empty = score(&PricingRespect, &[], &must_be_free, &profile);
        assert_eq!(empty.value, 0.0);
        assert_eq!(empty.reason, super::super::NO_RECOMMENDATIONS);
    }

    #[test]
    fn pricing_not_applicable_when_free_not_required() {
        let recs = vec![rec("Runway", "Beginner", "Paid")];
        let profile = UserProfile::default();
        let off = ExpectedTraits {
            must_be_free: Some(false),
            ..Default::default()
        };
        assert_eq!(score(&PricingRespect, &recs, &off, &profile).value, 1.0);
        assert_eq!(
            score(&PricingRespect, &recs, &ExpectedTraits::default(), &profile).value,
            1.0
        );
    }

    fn level(l: &str) -> ExpectedTraits {
        ExpectedTraits {
            skill_level: Some(l.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn skill_match_tolerance_is_asymmetric() {
        let profile = UserProfile::default();
        let recs = vec![
            rec("a", "Beginner", "Free"),
            rec("b", "Intermediate", "Free"),
            rec("c", "Advanced", "Free"),
        ];

        let beginner = score(&SkillMatch, &recs, &level("Beginner"), &profile);
        assert!((beginner.value - 2.0 / 3.0).abs() < 1e-9);

        let advanced = score(&SkillMatch, &recs, &level("Advanced"), &profile);
        assert!((advanced.value - 2.0 / 3.0).abs() < 1e-9);

        let intermediate = score(&SkillMatch, &recs, &level("Intermediate"), &profile);
        assert!((intermediate.value - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(intermediate.reason, "1/3 tools match intermediate level");
    }

    #[test]
    fn skill_match_ignores_case_and_handles_missing_difficulty() {
        let profile = UserProfile::default();
        let recs = vec![rec("a", "beginner", "Free"), Recommendation::default()];
        let result = score(&SkillMatch, &recs, &level("BEGINNER"), &profile);
        // A missing difficulty is neither tier, so a beginner accepts it.
        assert_eq!(result.value, 1.0);

        let result = score(&SkillMatch, &recs, &level("Intermediate"), &profile);
        assert_eq!(result.value, 0.0);
    }

    #[test]
    fn skill_match_not_applicable_without_level() {
        let recs = vec![rec("a", "Advanced", "Free")];
        let result = score(&SkillMatch, &recs, &ExpectedTraits::default(), &UserProfile::default());
        assert_eq!(result.value, 1.0);
        assert!(!result.reason.is_empty());
    }
}
