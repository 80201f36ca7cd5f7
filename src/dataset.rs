//! Labeled test cases and the store they are fetched from.
//!
//! Cases are read once at run start and never mutated. Field names are
//! accepted in camelCase and snake_case since exported datasets use both.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Data model
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
    #[serde(default, alias = "skill_level", skip_serializing_if = "Option::is_none")]
    pub skill_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<String>,
    /// Comma-separated tool names the user already uses.
    #[serde(default, alias = "existing_tools", skip_serializing_if = "Option::is_none")]
    pub existing_tools: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
}

impl UserProfile {
    /// Lowercased, trimmed names from `existing_tools`, empty entries dropped.
    pub fn known_tools(&self) -> Vec<String> {
        self.existing_tools
            .as_deref()
            .unwrap_or("")
            .to_lowercase()
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// Auxiliary signals for contextual grounding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseContext {
    #[serde(default, alias = "tools_tried", skip_serializing_if = "Option::is_none")]
    pub tools_tried: Option<u32>,
    #[serde(default, alias = "week_day", skip_serializing_if = "Option::is_none")]
    pub week_day: Option<u32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Constraints a response must satisfy. Each is independently optional; a
/// metric whose trait is absent does not apply to the case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedTraits {
    #[serde(default, alias = "must_be_free", skip_serializing_if = "Option::is_none")]
    pub must_be_free: Option<bool>,
    #[serde(default, alias = "skill_level", skip_serializing_if = "Option::is_none")]
    pub skill_level: Option<String>,
    #[serde(
        default,
        alias = "should_not_suggest_known",
        skip_serializing_if = "Option::is_none"
    )]
    pub should_not_suggest_known: Option<bool>,
    /// Traits no metric consumes (e.g. `category_match`), kept for reporting.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "user_profile")]
    pub user_profile: UserProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<CaseContext>,
    #[serde(default, alias = "expected_traits")]
    pub expected_traits: ExpectedTraits,
}

// =============================================================================
// Wire shape
// =============================================================================

/// Item shape as exported by the experiment-tracking service.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetItem {
    #[serde(default)]
    pub input: ItemInput,
    #[serde(default, alias = "expectedOutput")]
    pub expected_output: ItemExpected,
    #[serde(default)]
    pub metadata: ItemMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemInput {
    #[serde(default, alias = "user_profile")]
    pub user_profile: UserProfile,
    #[serde(default)]
    pub context: Option<CaseContext>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemExpected {
    #[serde(default, alias = "expected_traits")]
    pub expected_traits: ExpectedTraits,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemMetadata {
    #[serde(default)]
    pub test_id: Option<Value>,
    #[serde(default)]
    pub test_name: Option<String>,
}

impl DatasetItem {
    /// `fallback_id` is used when the item carries no `test_id`.
    pub fn into_test_case(self, fallback_id: usize) -> TestCase {
        let id = match self.metadata.test_id {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => fallback_id.to_string(),
        };
        TestCase {
            id,
            name: self
                .metadata
                .test_name
                .unwrap_or_else(|| "unknown".to_string()),
            user_profile: self.input.user_profile,
            context: self.input.context,
            expected_traits: self.expected_output.expected_traits,
        }
    }
}

/// Decode one record, accepting both the tracking-service item shape and a
/// flat `TestCase`.
pub fn decode_case(value: Value, index: usize) -> Result<TestCase, serde_json::Error> {
    if value.get("input").is_some() || value.get("metadata").is_some() {
        let item: DatasetItem = serde_json::from_value(value)?;
        return Ok(item.into_test_case(index + 1));
    }
    serde_json::from_value(value)
}

// =============================================================================
// Store
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("dataset not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid record {index} in {dataset}: {source}")]
    Record {
        dataset: String,
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid dataset JSON in {dataset}: {source}")]
    Json {
        dataset: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Read-only source of labeled test cases.
#[async_trait]
pub trait DatasetStore: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<Vec<TestCase>, DatasetError>;
}

/// Reads `<root>/<name>.json` (array) or `<root>/<name>.jsonl`.
#[derive(Debug, Clone)]
pub struct FileDatasetStore {
    root: PathBuf,
}

impl FileDatasetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        ["json", "jsonl"]
            .iter()
            .map(|ext| self.root.join(format!("{name}.{ext}")))
            .find(|p| p.is_file())
    }
}

#[async_trait]
impl DatasetStore for FileDatasetStore {
    async fn fetch(&self, name: &str) -> Result<Vec<TestCase>, DatasetError> {
        let path = self
            .resolve(name)
            .ok_or_else(|| DatasetError::NotFound(name.to_string()))?;
        let raw = tokio::fs::read_to_string(&path).await?;
        let cases = decode_dataset(name, &path, &raw)?;
        tracing::info!(dataset = name, items = cases.len(), "dataset loaded");
        Ok(cases)
    }
}

fn decode_dataset(name: &str, path: &Path, raw: &str) -> Result<Vec<TestCase>, DatasetError> {
    let values: Vec<Value> = if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
        raw.lines()
            .filter(|l| !l.trim().is_empty())
            .enumerate()
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|source| DatasetError::Record {
                    dataset: name.to_string(),
                    index,
                    source,
                })
            })
            .collect::<Result<_, _>>()?
    } else {
        serde_json::from_str(raw).map_err(|source| DatasetError::Json {
            dataset: name.to_string(),
            source,
        })?
    };

    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            decode_case(value, index).map_err(|source| DatasetError::Record {
                dataset: name.to_string(),
                index,
                source,
            })
        })
        .collect()
}
