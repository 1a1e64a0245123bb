use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Mode, ModelId};

/// Identifies one evaluation run. Used as a directory name under the cache
/// root, so it may not contain path separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        let valid = !id.trim().is_empty()
            && !id.contains(['/', '\\'])
            && id != "."
            && !id.contains("..");
        if valid {
            Ok(Self(id))
        } else {
            Err(Error::InvalidRunId(id))
        }
    }

    /// A fresh, sortable run id such as `20260314-101502-3f2a9c1e`.
    pub fn generate() -> Self {
        let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{timestamp}-{}", &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RunId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RunId> for String {
    fn from(value: RunId) -> Self {
        value.0
    }
}

/// Addresses one cached result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub run_id: RunId,
    pub test_uuid: Uuid,
    pub mode: Mode,
    pub model: Option<ModelId>,
}

impl CacheKey {
    pub fn new(run_id: RunId, test_uuid: Uuid, mode: Mode, model: Option<ModelId>) -> Self {
        Self { run_id, test_uuid, mode, model }
    }

    /// Key of the entry inside the run's store. Does not include the run id,
    /// which selects the store itself.
    pub fn entry_key(&self) -> String {
        let model = self.model.as_ref().map(ModelId::as_str).unwrap_or("-");
        format!("{}/{}/{}", self.test_uuid, self.mode, model)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_run_id_rejects_path_like_values() {
        assert!(RunId::new("").is_err());
        assert!(RunId::new("a/b").is_err());
        assert!(RunId::new("..").is_err());
        assert!(RunId::new("run\\1").is_err());
        assert!(RunId::new("2026-baseline").is_ok());
    }

    #[test]
    fn test_generated_run_id_is_valid() {
        let fixture = RunId::generate();
        let actual = RunId::new(fixture.as_str()).unwrap();
        assert_eq!(actual, fixture);
    }

    #[test]
    fn test_entry_key_differs_per_mode_and_model() {
        let run_id = RunId::new("r1").unwrap();
        let uuid = Uuid::nil();

        let tool = CacheKey::new(run_id.clone(), uuid, Mode::Tool, Some("gpt-4o".into()));
        let web = CacheKey::new(run_id.clone(), uuid, Mode::Web, Some("gpt-4o".into()));
        let other = CacheKey::new(run_id.clone(), uuid, Mode::Tool, Some("o3".into()));
        let none = CacheKey::new(run_id, uuid, Mode::Tool, None);

        assert_eq!(
            tool.entry_key(),
            "00000000-0000-0000-0000-000000000000/tool/gpt-4o"
        );
        assert_ne!(tool.entry_key(), web.entry_key());
        assert_ne!(tool.entry_key(), other.entry_key());
        assert_eq!(none.entry_key(), "00000000-0000-0000-0000-000000000000/tool/-");
    }
}
