//! Persistent raw-text → summary cache, scoped to one summarizer
//! configuration.
//!
//! Entries are content-addressed by the exact raw text that was summarized,
//! so retries after a cancelled or failed batch reuse every completed
//! summary. The cache is loaded once per pipeline invocation and flushed at
//! the end; it is passed explicitly as a dependency so tests can inject an
//! isolated instance.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

use crate::types::Result;

/// The three keys that invalidate the cache wholesale when any differs from
/// what is stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheScope {
    pub endpoint_id: String,
    pub model_id: String,
    pub output_budget: usize,
}

impl CacheScope {
    pub fn new(endpoint_id: impl Into<String>, model_id: impl Into<String>, output_budget: usize) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            model_id: model_id.into(),
            output_budget,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    scope: CacheScope,
    entries: HashMap<String, String>,
}

/// Key→summary cache shared across a summarization batch.
#[derive(Clone, Debug)]
pub struct SummaryCache {
    scope: CacheScope,
    path: Option<PathBuf>,
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl SummaryCache {
    /// Purely in-memory cache, useful for tests and one-shot runs.
    pub fn in_memory(scope: CacheScope) -> Self {
        Self {
            scope,
            path: None,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// File-backed cache. Call [`load`](Self::load) before the walk and
    /// [`flush`](Self::flush) after it.
    pub fn at_path(scope: CacheScope, path: impl Into<PathBuf>) -> Self {
        Self {
            scope,
            path: Some(path.into()),
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn scope(&self) -> &CacheScope {
        &self.scope
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Loads persisted entries. A file written under a different scope is
    /// discarded wholesale and the cache starts empty.
    pub async fn load(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        let data = fs::read_to_string(path).await?;
        let file: CacheFile = match serde_json::from_str(&data) {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "unreadable summary cache, starting empty");
                return Ok(());
            }
        };
        if file.scope != self.scope {
            tracing::debug!(
                path = %path.display(),
                "summary cache scope changed, invalidating {} entries",
                file.entries.len()
            );
            return Ok(());
        }
        let mut guard = self.entries.lock().await;
        guard.clear();
        guard.extend(file.entries);
        Ok(())
    }

    /// Writes the current entries to disk under the cache's scope.
    pub async fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let entries = self.entries.lock().await.clone();
        let file = CacheFile {
            scope: self.scope.clone(),
            entries,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(path, serde_json::to_string(&file)?).await?;
        Ok(())
    }

    pub async fn get(&self, raw: &str) -> Option<String> {
        self.entries.lock().await.get(raw).cloned()
    }

    /// Records a fully completed summary. Partial results must never reach
    /// this method.
    pub async fn insert(&self, raw: &str, summary: &str) {
        self.entries
            .lock()
            .await
            .insert(raw.to_string(), summary.to_string());
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn scope() -> CacheScope {
        CacheScope::new("http://localhost:11434", "llama3", 512)
    }

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summaries.json");

        let cache = SummaryCache::at_path(scope(), &path);
        cache.insert("long raw text", "short summary").await;
        cache.flush().await.unwrap();

        let reloaded = SummaryCache::at_path(scope(), &path);
        reloaded.load().await.unwrap();
        assert_eq!(
            reloaded.get("long raw text").await.as_deref(),
            Some("short summary")
        );
    }

    #[tokio::test]
    async fn scope_change_invalidates_wholesale() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summaries.json");

        let cache = SummaryCache::at_path(scope(), &path);
        cache.insert("raw", "summary").await;
        cache.flush().await.unwrap();

        let other_model = CacheScope::new("http://localhost:11434", "mistral", 512);
        let reloaded = SummaryCache::at_path(other_model, &path);
        reloaded.load().await.unwrap();
        assert!(reloaded.is_empty().await);
    }

    #[tokio::test]
    async fn missing_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let cache = SummaryCache::at_path(scope(), dir.path().join("nope.json"));
        cache.load().await.unwrap();
        assert!(cache.is_empty().await);
    }
}
