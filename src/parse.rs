//! Tolerant extraction of recommendation records from model output.
//!
//! Models are asked for a raw JSON array but routinely wrap it in markdown
//! fences, lead with prose, or trail an explanation. Extraction runs an
//! ordered chain of strategies and keeps the first one that yields an array.
//! Nothing here fails: text with no recoverable array yields an empty list.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix written in place of model output when the provider call failed.
pub const FAILURE_SENTINEL: &str = "ERROR:";

/// One tool suggestion. Every field is optional; records are scored
/// leniently rather than rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Recommendation {
    /// Build a record from an arbitrary array element.
    ///
    /// Non-object elements and non-string fields become absent fields; the
    /// element still counts as a record.
    pub fn from_value(value: &Value) -> Self {
        let field = |key: &str| -> Option<String> {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(|s| s.to_string())
        };
        Self {
            name: field("name"),
            category: field("category"),
            difficulty: field("difficulty"),
            pricing: field("pricing"),
            reason: field("reason"),
        }
    }

    pub fn name_or_empty(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn category_or_empty(&self) -> &str {
        self.category.as_deref().unwrap_or("")
    }

    pub fn difficulty_or_empty(&self) -> &str {
        self.difficulty.as_deref().unwrap_or("")
    }

    pub fn pricing_or_empty(&self) -> &str {
        self.pricing.as_deref().unwrap_or("")
    }
}

// =============================================================================
// Strategy chain
// =============================================================================

/// Inputs visible to every strategy: the fence-stripped text and the original.
struct ParseInput<'a> {
    raw: &'a str,
    cleaned: String,
}

type Strategy = fn(&ParseInput<'_>) -> Option<Vec<Value>>;

/// Order matters: later strategies cover failure modes of earlier ones.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("direct", direct_parse),
    ("bracket_scan", bracket_scan_cleaned),
    ("raw_bracket_scan", bracket_scan_raw),
];

/// Which strategy recovered the array, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    pub recommendations: Vec<Recommendation>,
    pub strategy: Option<&'static str>,
}

/// Extract recommendations from model output.
pub fn parse_recommendations(text: &str) -> Vec<Recommendation> {
    parse_with_strategy(text).recommendations
}

/// Extract recommendations and report which strategy succeeded.
pub fn parse_with_strategy(text: &str) -> ParseOutcome {
    if text.is_empty() || text.starts_with(FAILURE_SENTINEL) {
        return ParseOutcome {
            recommendations: Vec::new(),
            strategy: None,
        };
    }

    run_chain(&ParseInput {
        raw: text,
        cleaned: strip_fences(text),
    })
}

fn run_chain(input: &ParseInput<'_>) -> ParseOutcome {
    for (name, strategy) in STRATEGIES {
        if let Some(items) = strategy(input) {
            return ParseOutcome {
                recommendations: items.iter().map(Recommendation::from_value).collect(),
                strategy: Some(*name),
            };
        }
    }

    ParseOutcome {
        recommendations: Vec::new(),
        strategy: None,
    }
}

static FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```[A-Za-z0-9_+-]*\s*").expect("Invalid fence regex"));

/// Remove triple-backtick fences, with or without a language tag.
pub fn strip_fences(text: &str) -> String {
    let without_open = FENCE_OPEN.replace_all(text, "");
    without_open.replace("```", "").trim().to_string()
}

fn parse_array(candidate: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    }
}

fn direct_parse(input: &ParseInput<'_>) -> Option<Vec<Value>> {
    parse_array(&input.cleaned)
}

fn bracket_scan_cleaned(input: &ParseInput<'_>) -> Option<Vec<Value>> {
    bracket_span(&input.cleaned).and_then(parse_array)
}

fn bracket_scan_raw(input: &ParseInput<'_>) -> Option<Vec<Value>> {
    bracket_span(input.raw).and_then(parse_array)
}

/// Greedy span from the first `[` through the last `]`.
fn bracket_span(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARRAY: &str = r#"[{"name":"Canva","category":"AI Design","difficulty":"Beginner","pricing":"Freemium","reason":"Matches beginner, free-tier need"},{"name":"Suno","category":"AI Audio","difficulty":"Beginner","pricing":"Freemium","reason":"Music"}]"#;

    fn names(recs: &[Recommendation]) -> Vec<&str> {
        recs.iter().map(|r| r.name_or_empty()).collect()
    }

    #[test]
    fn empty_and_sentinel_inputs_short_circuit() {
        assert!(parse_recommendations("").is_empty());
        assert!(parse_recommendations("ERROR: 429 quota exceeded [1,2]").is_empty());
        assert_eq!(parse_with_strategy("ERROR: boom").strategy, None);
    }

    #[test]
    fn pure_array_parses_directly() {
        let out = parse_with_strategy(ARRAY);
        assert_eq!(out.strategy, Some("direct"));
        assert_eq!(names(&out.recommendations), vec!["Canva", "Suno"]);
        assert_eq!(
            out.recommendations[0].pricing.as_deref(),
            Some("Freemium")
        );
    }

    #[test]
    fn fenced_array_with_language_tag() {
        let text = format!("```json\n{ARRAY}\n```");
        let out = parse_with_strategy(&text);
        assert_eq!(out.strategy, Some("direct"));
        assert_eq!(out.recommendations.len(), 2);
    }

    #[test]
    fn fenced_array_without_language_tag() {
        let text = format!("```\n{ARRAY}\n```");
        assert_eq!(parse_recommendations(&text).len(), 2);
    }

    #[test]
    fn prose_around_array_uses_bracket_scan() {
        let text = format!("Here are my picks:\n{ARRAY}\nHope this helps!");
        let out = parse_with_strategy(&text);
        assert_eq!(out.strategy, Some("bracket_scan"));
        assert_eq!(names(&out.recommendations), vec!["Canva", "Suno"]);
    }

    #[test]
    fn fence_markup_inside_strings_is_removed_without_breaking_json() {
        let text = r#"Sure: [{"name":"Cursor","reason":"try ```rust blocks"}]"#;
        let out = parse_with_strategy(text);
        assert_eq!(out.strategy, Some("bracket_scan"));
        assert_eq!(out.recommendations[0].reason.as_deref(), Some("try blocks"));
    }

    #[test]
    fn chain_falls_back_to_raw_text_when_cleaned_text_is_unusable() {
        let raw = format!("picks: {ARRAY}");
        let out = run_chain(&ParseInput {
            raw: &raw,
            cleaned: "picks: [{\"name\":".to_string(),
        });
        assert_eq!(out.strategy, Some("raw_bracket_scan"));
        assert_eq!(names(&out.recommendations), vec!["Canva", "Suno"]);
    }

    #[test]
    fn top_level_object_is_rejected() {
        assert!(parse_recommendations(r#"{"name":"Canva"}"#).is_empty());
        assert!(parse_recommendations("42").is_empty());
    }

    #[test]
    fn truncated_and_garbage_inputs_yield_empty() {
        assert!(parse_recommendations(r#"[{"name":"Canva","#).is_empty());
        assert!(parse_recommendations("no json here at all").is_empty());
        assert!(parse_recommendations("] backwards [").is_empty());
        assert!(parse_recommendations("```").is_empty());
        assert!(parse_recommendations("   ").is_empty());
    }

    #[test]
    fn records_are_kept_without_validation() {
        let out = parse_recommendations(r#"[{"name":"Runway","pricing":7}, "bare string", {}]"#);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].name.as_deref(), Some("Runway"));
        assert_eq!(out[0].pricing, None);
        assert_eq!(out[1], Recommendation::default());
        assert_eq!(out[2], Recommendation::default());
    }

    #[test]
    fn empty_array_is_a_successful_parse_with_no_records() {
        let out = parse_with_strategy("[]");
        assert_eq!(out.strategy, Some("direct"));
        assert!(out.recommendations.is_empty());
    }
}
