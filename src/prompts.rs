//! Instruction template for recommendation requests.
//!
//! Domain logic for rendering the prompt. Provider-agnostic.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::catalog::Catalog;
use crate::dataset::{CaseContext, UserProfile};
use crate::gateway::Message;

/// Default number of tools requested per case.
pub const DEFAULT_TOOLS_PER_CASE: usize = 5;

/// Rendered prompt ready for the provider.
#[derive(Debug, Clone)]
pub struct PromptInstance {
    pub template_slug: &'static str,
    pub user: String,
}

impl PromptInstance {
    /// The template is sent as a single user turn.
    pub fn to_messages(&self) -> Vec<Message> {
        vec![Message::user(&self.user)]
    }
}

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").expect("Invalid placeholder regex"));

/// A prompt template with `{placeholder}` slots.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub slug: &'static str,
    pub user: &'static str,
}

pub const RECOMMENDATION_PROMPT: PromptTemplate = PromptTemplate {
    slug: "recommend_v2",
    user: r#"You are Forge, an AI learning coach for design & vibe coding tools. Based on this user's profile, recommend exactly {count} AI tools from the catalog below.

IMPORTANT: You MUST only recommend tools from this catalog. Do NOT make up tools.

TOOL CATALOG:
{catalog}

User Profile:
- Focus: {focus}
- Skill Level: {skill_level}
- Preferences: {preferences}
- Existing Tools: {existing_tools}
- Goal: {goal}
{context}
Pick the {count} most relevant tools for this user. Match their skill level, respect their pricing preferences, and avoid tools they already use.

Respond ONLY with a raw JSON array. No markdown, no code fences, no explanation. Just the array:
[{"name":"...", "category":"...", "difficulty":"...", "pricing":"...", "reason":"..."}]"#,
};

impl PromptTemplate {
    pub fn render(
        &self,
        profile: &UserProfile,
        context: Option<&CaseContext>,
        catalog: &Catalog,
        count: usize,
    ) -> PromptInstance {
        let field = |v: &Option<String>, missing: &str| -> String {
            match v.as_deref().map(str::trim) {
                Some(s) if !s.is_empty() => s.to_string(),
                _ => missing.to_string(),
            }
        };

        let context_line = context
            .map(|c| {
                format!(
                    "Context: Tools tried: {}, Day of week: {}\n",
                    c.tools_tried.unwrap_or(0),
                    c.week_day.unwrap_or(1)
                )
            })
            .unwrap_or_default();

        let count = count.to_string();
        let catalog = catalog.render();
        let focus = field(&profile.focus, "Not specified");
        let skill_level = field(&profile.skill_level, "Not specified");
        let preferences = field(&profile.preferences, "None");
        let existing_tools = field(&profile.existing_tools, "None");
        let goal = field(&profile.goal, "Not specified");

        // One pass, so braces inside user text are never expanded.
        let user = PLACEHOLDER_RE
            .replace_all(self.user, |caps: &Captures<'_>| {
                let value = match &caps[1] {
                    "count" => count.as_str(),
                    "catalog" => catalog.as_str(),
                    "context" => context_line.as_str(),
                    "focus" => focus.as_str(),
                    "skill_level" => skill_level.as_str(),
                    "preferences" => preferences.as_str(),
                    "existing_tools" => existing_tools.as_str(),
                    "goal" => goal.as_str(),
                    _ => &caps[0],
                };
                value.to_string()
            })
            .into_owned();

        PromptInstance {
            template_slug: self.slug,
            user,
        }
    }
}
