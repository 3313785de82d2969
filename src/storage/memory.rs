use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::traits::{merge_lessons, CachedActionSequence, LessonLearned, MemoryStore};
use crate::types::ScenarioId;

/// Process-local store. Used by tests and by runs with persistence disabled.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    caches: Arc<RwLock<HashMap<ScenarioId, CachedActionSequence>>>,
    lessons: Arc<RwLock<HashMap<ScenarioId, Vec<LessonLearned>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("memory store lock poisoned")
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn load_cache(&self, scenario_id: &str) -> Result<Option<CachedActionSequence>> {
        let caches = self.caches.read().map_err(poisoned)?;
        Ok(caches.get(scenario_id).cloned())
    }

    async fn save_cache(&self, sequence: &CachedActionSequence) -> Result<()> {
        let mut caches = self.caches.write().map_err(poisoned)?;
        caches.insert(sequence.scenario_id.clone(), sequence.clone());
        Ok(())
    }

    async fn load_lessons(&self, scenario_id: &str) -> Result<Vec<LessonLearned>> {
        let lessons = self.lessons.read().map_err(poisoned)?;
        Ok(lessons.get(scenario_id).cloned().unwrap_or_default())
    }

    async fn append_lessons(
        &self,
        scenario_id: &str,
        new: &[LessonLearned],
        keep: usize,
    ) -> Result<()> {
        let mut lessons = self.lessons.write().map_err(poisoned)?;
        let existing = lessons.remove(scenario_id).unwrap_or_default();
        lessons.insert(scenario_id.to_string(), merge_lessons(existing, new, keep));
        Ok(())
    }
}
