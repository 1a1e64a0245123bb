use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A question with its expected answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub uuid: Uuid,
    pub question: String,
    pub expected: String,
}

/// On-disk shape. Accepts flat entries as well as entries nested under `case`,
/// with `input` as an alias of `question`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TestCaseEntry {
    Nested { case: RawTestCase },
    Flat(RawTestCase),
}

#[derive(Deserialize)]
struct RawTestCase {
    #[serde(default)]
    uuid: Option<Uuid>,
    #[serde(alias = "input")]
    question: String,
    expected: String,
}

impl From<TestCaseEntry> for TestCase {
    fn from(entry: TestCaseEntry) -> Self {
        let raw = match entry {
            TestCaseEntry::Nested { case } => case,
            TestCaseEntry::Flat(raw) => raw,
        };
        let uuid = raw.uuid.unwrap_or_else(|| Self::derive_uuid(&raw.question));
        Self { uuid, question: raw.question, expected: raw.expected }
    }
}

impl TestCase {
    pub fn new(question: impl Into<String>, expected: impl Into<String>) -> Self {
        let question = question.into();
        Self { uuid: Self::derive_uuid(&question), question, expected: expected.into() }
    }

    /// Stable id for cases without one, so cache keys survive across runs.
    fn derive_uuid(question: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, question.trim().as_bytes())
    }

    /// Loads test cases from a YAML or JSON (`.json`) file.
    pub async fn load(path: &Path) -> anyhow::Result<Vec<TestCase>> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read test cases from {}", path.display()))?;
        let is_json = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
        .with_context(|| format!("Failed to parse test cases in {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Vec<TestCase>> {
        let entries: Vec<TestCaseEntry> = serde_yml::from_str(content)?;
        Ok(entries.into_iter().map(TestCase::from).collect())
    }

    pub fn from_json(content: &str) -> anyhow::Result<Vec<TestCase>> {
        let entries: Vec<TestCaseEntry> = serde_json::from_str(content)?;
        Ok(entries.into_iter().map(TestCase::from).collect())
    }
}
