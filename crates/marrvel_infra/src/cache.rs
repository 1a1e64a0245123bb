use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use marrvel_domain::{CacheKey, ResultCache, RunId, TestResult};
use tracing::debug;

/// Result cache on disk: one cacache store per run under `root`, one entry
/// per (test, mode, model).
pub struct CacacheResultCache {
    root: PathBuf,
}

impl CacacheResultCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(run_id.as_str())
    }
}

/// cacache has no error kinds for a missing entry, only messages.
fn is_not_found(error: &cacache::Error) -> bool {
    let error = error.to_string();
    error.contains("not found") || error.contains("NotFound")
}

#[async_trait::async_trait]
impl ResultCache for CacacheResultCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<TestResult>> {
        match cacache::read(self.run_dir(&key.run_id), key.entry_key()).await {
            Ok(data) => {
                let result = serde_json::from_slice(&data)
                    .context("Failed to deserialize cached result")?;
                Ok(Some(result))
            }
            Err(error) if is_not_found(&error) => Ok(None),
            Err(error) => Err(error).context("Failed to read from cache"),
        }
    }

    async fn put(&self, key: &CacheKey, result: &TestResult) -> Result<bool> {
        if !result.status.is_cacheable() {
            debug!(entry = %key.entry_key(), status = %result.status, "Not caching result");
            return Ok(false);
        }

        let data = serde_json::to_vec(result).context("Failed to serialize result for caching")?;
        cacache::write(self.run_dir(&key.run_id), key.entry_key(), data)
            .await
            .context("Failed to write to cache")?;
        Ok(true)
    }

    async fn clear(&self, run_id: Option<&RunId>) -> Result<()> {
        let dir = match run_id {
            Some(run_id) => self.run_dir(run_id),
            None => self.root.clone(),
        };
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => {
                Err(error).with_context(|| format!("Failed to clear cache at {}", dir.display()))
            }
        }
    }
}
