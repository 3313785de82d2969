use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::traits::{merge_lessons, CachedActionSequence, LessonLearned, MemoryStore};

/// JSON files under a root directory: `cache/<id>.json` and `lessons/<id>.json`.
///
/// Writes for one scenario id are serialized through a per-key lock, and each
/// file is replaced atomically (write to a temp file, then rename).
pub struct FileStore {
    root: PathBuf,
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_path(&self, scenario_id: &str) -> PathBuf {
        self.root
            .join("cache")
            .join(format!("{}.json", file_key(scenario_id)))
    }

    fn lessons_path(&self, scenario_id: &str) -> PathBuf {
        self.root
            .join("lessons")
            .join(format!("{}.json", file_key(scenario_id)))
    }

    fn lock_for(&self, scenario_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.key_locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(scenario_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Scenario ids are free text; keep file names portable.
fn file_key(scenario_id: &str) -> String {
    scenario_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            let value = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    let content = serde_json::to_string_pretty(value)?;
    tokio::fs::write(&tmp, content)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl MemoryStore for FileStore {
    async fn load_cache(&self, scenario_id: &str) -> Result<Option<CachedActionSequence>> {
        read_json(&self.cache_path(scenario_id)).await
    }

    async fn save_cache(&self, sequence: &CachedActionSequence) -> Result<()> {
        let lock = self.lock_for(&sequence.scenario_id);
        let _guard = lock.lock().await;
        write_json(&self.cache_path(&sequence.scenario_id), sequence).await?;
        log::debug!(
            "Saved {} cached step(s) for {}",
            sequence.steps.len(),
            sequence.scenario_id
        );
        Ok(())
    }

    async fn load_lessons(&self, scenario_id: &str) -> Result<Vec<LessonLearned>> {
        Ok(read_json(&self.lessons_path(scenario_id))
            .await?
            .unwrap_or_default())
    }

    async fn append_lessons(
        &self,
        scenario_id: &str,
        lessons: &[LessonLearned],
        keep: usize,
    ) -> Result<()> {
        if lessons.is_empty() {
            return Ok(());
        }
        let lock = self.lock_for(scenario_id);
        let _guard = lock.lock().await;
        let path = self.lessons_path(scenario_id);
        let existing: Vec<LessonLearned> = read_json(&path).await?.unwrap_or_default();
        let merged = merge_lessons(existing, lessons, keep);
        write_json(&path, &merged).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_file_key_sanitizes() {
        assert_eq!(file_key("checkout/guest flow"), "checkout_guest_flow");
        assert_eq!(file_key("login-01"), "login-01");
    }

    #[tokio::test]
    async fn test_lessons_persist_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let lesson = LessonLearned {
            scenario_id: "search".to_string(),
            lesson: "the search box is inside the header menu".to_string(),
            step: 3,
            recorded_at: Utc::now(),
        };

        FileStore::new(dir.path())
            .append_lessons("search", &[lesson], 10)
            .await
            .unwrap();

        let reopened = FileStore::new(dir.path());
        let lessons = reopened.load_lessons("search").await.unwrap();
        assert_eq!(lessons.len(), 1);
        assert!(reopened.load_cache("search").await.unwrap().is_none());
    }
}
