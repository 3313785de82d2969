use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::brain::ConversationTurn;
use crate::types::{ActionLogEntry, EvidencePaths, GoalLedger, PerceptionEntry, ScenarioResult};

/// Everything recorded about one scenario run besides the result itself.
pub struct ScenarioEvidence<'a> {
    pub scenario_id: &'a str,
    pub action_log: &'a [ActionLogEntry],
    pub transcript: &'a [ConversationTurn],
    pub perception: &'a [PerceptionEntry],
    pub ledger: &'a GoalLedger,
}

/// Where run artifacts end up. Failures here never change a scenario's status.
#[async_trait]
pub trait EvidenceSink: Send + Sync {
    async fn write_scenario(&self, evidence: &ScenarioEvidence<'_>) -> Result<EvidencePaths>;

    async fn write_result(&self, result: &ScenarioResult) -> Result<PathBuf>;

    /// Directory screenshots and reports are written to.
    fn output_dir(&self) -> &Path;
}

/// Writes `<id>-action-log.json`, `<id>-llm-conversation.json`,
/// `<id>-perception.json`, `<id>-goal-ledger.json` and `<id>-result.json`.
pub struct FileEvidenceSink {
    dir: PathBuf,
}

impl FileEvidenceSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, scenario_id: &str, suffix: &str) -> PathBuf {
        let stem: String = scenario_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}-{}.json", stem, suffix))
    }

    async fn write<T: Serialize + ?Sized + Sync>(&self, path: PathBuf, value: &T) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let content = serde_json::to_string_pretty(value)?;
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[async_trait]
impl EvidenceSink for FileEvidenceSink {
    async fn write_scenario(&self, evidence: &ScenarioEvidence<'_>) -> Result<EvidencePaths> {
        let id = evidence.scenario_id;
        let action_log = self
            .write(self.path_for(id, "action-log"), evidence.action_log)
            .await?;
        let conversation = self
            .write(self.path_for(id, "llm-conversation"), evidence.transcript)
            .await?;
        let perception = self
            .write(self.path_for(id, "perception"), evidence.perception)
            .await?;
        let goal_ledger = self
            .write(self.path_for(id, "goal-ledger"), evidence.ledger)
            .await?;

        Ok(EvidencePaths {
            action_log: Some(action_log),
            conversation: Some(conversation),
            perception: Some(perception),
            goal_ledger: Some(goal_ledger),
            result: None,
            network_log: None,
            screenshots: evidence
                .action_log
                .iter()
                .filter_map(|e| e.screenshot.clone())
                .collect(),
        })
    }

    async fn write_result(&self, result: &ScenarioResult) -> Result<PathBuf> {
        self.write(self.path_for(&result.scenario_id, "result"), result)
            .await
    }

    fn output_dir(&self) -> &Path {
        &self.dir
    }
}
