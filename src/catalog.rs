//! The tool catalog recommendations must be drawn from.
//!
//! The catalog is an input to the harness, not something it derives. A
//! built-in copy ships with the crate; operators can point a run at a JSON
//! export when the upstream catalog changes.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("catalog is empty")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub category: String,
    pub pricing: String,
    pub difficulty: String,
    #[serde(default)]
    pub summary: String,
    /// Alternate spellings accepted as grounded (e.g. "dalle").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

macro_rules! entry {
    (
        $name:expr,
        $category:expr,
        $pricing:expr,
        $difficulty:expr,
        $summary:expr,
        [$($alias:expr),*] $(,)?
    ) => {
        CatalogEntry {
            name: $name.to_string(),
            category: $category.to_string(),
            pricing: $pricing.to_string(),
            difficulty: $difficulty.to_string(),
            summary: $summary.to_string(),
            aliases: vec![$($alias.to_string()),*],
        }
    };
    ($name:expr, $category:expr, $pricing:expr, $difficulty:expr, $summary:expr $(,)?) => {
        entry!($name, $category, $pricing, $difficulty, $summary, [])
    };
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Result<Self, CatalogError> {
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { entries })
    }

    /// Load a JSON array of entries.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<CatalogEntry> = serde_json::from_str(&raw)?;
        Self::new(entries)
    }

    /// The catalog shipped with the evaluation suite.
    pub fn builtin() -> Self {
        Self {
            entries: vec![
                entry!(
                    "AKOOL",
                    "AI Video Editor",
                    "Freemium",
                    "Beginner",
                    "AI Video Creation – Avatars, Translation, Face Swap",
                ),
                entry!("PixAI", "AI Design", "Paid", "Beginner", "Anime & Character Generation AI"),
                entry!(
                    "RecCloud",
                    "AI Audio",
                    "Freemium",
                    "Beginner",
                    "AI Audio & Video Processing",
                ),
                entry!(
                    "KREA AI",
                    "AI Design",
                    "Freemium",
                    "Intermediate",
                    "AI Creative Suite for Images, Video & 3D",
                ),
                entry!(
                    "Gamma",
                    "AI Design",
                    "Freemium",
                    "Beginner",
                    "AI design for presentations, websites, and more",
                ),
                entry!(
                    "Anything",
                    "Vibe Coding",
                    "Freemium",
                    "Intermediate",
                    "Turn words into apps, sites, tools",
                ),
                entry!(
                    "Relume",
                    "AI Site Builder",
                    "Freemium",
                    "Beginner",
                    "Websites designed and built faster with AI",
                ),
                entry!(
                    "Descript",
                    "AI Video Editor",
                    "Paid",
                    "Intermediate",
                    "AI video editing with transcription and voice cloning",
                ),
                entry!(
                    "PicWish",
                    "AI Photo Editor",
                    "Freemium",
                    "Beginner",
                    "All-in-one free AI photo editor",
                ),
                entry!(
                    "Luma AI",
                    "AI Design",
                    "Freemium",
                    "Intermediate",
                    "Images and videos with precision, speed, control",
                ),
                entry!(
                    "Midjourney",
                    "AI Design",
                    "Paid",
                    "Intermediate",
                    "AI image generation via Discord",
                ),
                entry!(
                    "Runway",
                    "AI Video Editor",
                    "Freemium",
                    "Intermediate",
                    "AI video generation and editing suite",
                ),
                entry!(
                    "Figma",
                    "AI Design",
                    "Freemium",
                    "Intermediate",
                    "Collaborative design tool with AI features",
                ),
                entry!(
                    "Cursor",
                    "Vibe Coding",
                    "Freemium",
                    "Intermediate",
                    "AI-powered code editor",
                ),
                entry!(
                    "v0",
                    "Vibe Coding",
                    "Freemium",
                    "Beginner",
                    "AI UI component generator by Vercel",
                ),
                entry!(
                    "Bolt",
                    "Vibe Coding",
                    "Freemium",
                    "Beginner",
                    "AI full-stack app builder in the browser",
                ),
                entry!(
                    "Lovable",
                    "Vibe Coding",
                    "Freemium",
                    "Beginner",
                    "AI app builder for non-coders",
                ),
                entry!(
                    "Webflow",
                    "AI Site Builder",
                    "Freemium",
                    "Intermediate",
                    "Visual web design with AI features",
                ),
                entry!(
                    "Framer",
                    "AI Site Builder",
                    "Freemium",
                    "Intermediate",
                    "AI-powered website builder",
                ),
                entry!(
                    "Canva",
                    "AI Design",
                    "Freemium",
                    "Beginner",
                    "Easy graphic design with AI tools",
                ),
                entry!(
                    "DALL-E",
                    "AI Design",
                    "Paid",
                    "Beginner",
                    "AI image generation by OpenAI",
                    ["dalle"],
                ),
                entry!(
                    "ElevenLabs",
                    "AI Audio",
                    "Freemium",
                    "Beginner",
                    "AI voice cloning and text-to-speech",
                ),
                entry!("Suno", "AI Audio", "Freemium", "Beginner", "AI music generation"),
                entry!("Udio", "AI Audio", "Freemium", "Beginner", "AI music creation platform"),
                entry!(
                    "Claude",
                    "AI Writing",
                    "Freemium",
                    "Beginner",
                    "AI assistant for writing and coding",
                ),
                entry!(
                    "Notion AI",
                    "AI Productivity",
                    "Paid",
                    "Beginner",
                    "AI-powered workspace and notes",
                ),
                entry!(
                    "GitHub Copilot",
                    "Vibe Coding",
                    "Paid",
                    "Intermediate",
                    "AI code completion in VS Code",
                ),
                entry!(
                    "Spline",
                    "AI Design",
                    "Freemium",
                    "Intermediate",
                    "3D design tool with AI features",
                ),
                entry!(
                    "Rive",
                    "AI Design",
                    "Freemium",
                    "Advanced",
                    "Interactive animations for apps and games",
                ),
                entry!(
                    "Vercel",
                    "Vibe Coding",
                    "Freemium",
                    "Intermediate",
                    "AI-powered deployment and hosting",
                ),
            ],
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One line per tool, as embedded in the instruction template.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| {
                format!(
                    "- {} ({}, {}, {}): {}",
                    e.name, e.category, e.pricing, e.difficulty, e.summary
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Lowercased names and aliases used for grounding checks.
    pub fn known_names(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .flat_map(|e| std::iter::once(&e.name).chain(e.aliases.iter()))
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}
