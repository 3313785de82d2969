use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AgentAction, ScenarioId};

/// One action that worked, keyed by the screen it was taken on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedStep {
    pub signature: String,
    pub url: String,
    pub action: AgentAction,
}

/// Action sequence of the last successful run of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedActionSequence {
    pub scenario_id: ScenarioId,
    pub steps: Vec<CachedStep>,
    pub success_count: u32,
    pub recorded_at: DateTime<Utc>,
}

impl CachedActionSequence {
    pub fn find(&self, signature: &str) -> Option<&CachedStep> {
        self.steps.iter().find(|s| s.signature == signature)
    }
}

/// A short note extracted from a past failure of the same scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonLearned {
    pub scenario_id: ScenarioId,
    pub lesson: String,
    pub step: usize,
    pub recorded_at: DateTime<Utc>,
}

/// Cross-run memory, one namespace per scenario id.
///
/// Loaded when a scenario starts and saved when it finishes. Implementations
/// must not interleave writes for the same scenario id.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn load_cache(&self, scenario_id: &str) -> Result<Option<CachedActionSequence>>;
    async fn save_cache(&self, sequence: &CachedActionSequence) -> Result<()>;

    async fn load_lessons(&self, scenario_id: &str) -> Result<Vec<LessonLearned>>;
    /// Appends and keeps only the newest `keep` lessons for the scenario.
    async fn append_lessons(
        &self,
        scenario_id: &str,
        lessons: &[LessonLearned],
        keep: usize,
    ) -> Result<()>;
}

/// Appends `new` to `existing` and trims from the oldest end to `keep`.
pub fn merge_lessons(
    mut existing: Vec<LessonLearned>,
    new: &[LessonLearned],
    keep: usize,
) -> Vec<LessonLearned> {
    for lesson in new {
        if !existing.iter().any(|l| l.lesson == lesson.lesson) {
            existing.push(lesson.clone());
        }
    }
    if existing.len() > keep {
        let excess = existing.len() - keep;
        existing.drain(0..excess);
    }
    existing
}
