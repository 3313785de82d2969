use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::exit_codes;
use crate::types::{FailureCategory, RunId, ScenarioId, ScenarioResult, ScenarioStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSummary {
    pub scenario_id: ScenarioId,
    pub status: ScenarioStatus,
    pub attempt: u32,
    pub was_flaky: bool,
    pub duration_ms: u64,
    pub actions: usize,
    pub criteria_score: f32,
    #[serde(default)]
    pub failure_category: Option<FailureCategory>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Aggregate of one batch run. Every scenario appears exactly once; when a
/// scenario shows up several times, its last result wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub run_id: RunId,
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub timed_out: usize,
    pub skipped: usize,
    /// Passed over executed (non-skipped) scenarios.
    pub pass_rate: f32,
    pub total_duration_ms: u64,
    pub total_actions: usize,
    pub failure_categories: BTreeMap<FailureCategory, usize>,
    pub flaky: Vec<ScenarioId>,
    pub scenarios: Vec<ScenarioSummary>,
}

impl AuditReport {
    pub fn from_results(results: &[ScenarioResult]) -> Self {
        let mut order: Vec<&str> = Vec::new();
        let mut latest: BTreeMap<&str, &ScenarioResult> = BTreeMap::new();
        for result in results {
            if latest.insert(&result.scenario_id, result).is_none() {
                order.push(&result.scenario_id);
            }
        }
        let unique: Vec<&ScenarioResult> = order.iter().filter_map(|id| latest.get(id).copied()).collect();

        let count = |status: ScenarioStatus| unique.iter().filter(|r| r.status == status).count();
        let passed = count(ScenarioStatus::Pass);
        let skipped = count(ScenarioStatus::Skipped);
        let executed = unique.len() - skipped;

        let mut failure_categories = BTreeMap::new();
        for category in unique.iter().filter_map(|r| r.failure_category) {
            *failure_categories.entry(category).or_insert(0) += 1;
        }

        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            total: unique.len(),
            passed,
            failed: count(ScenarioStatus::Fail),
            errored: count(ScenarioStatus::Error),
            timed_out: count(ScenarioStatus::Timeout),
            skipped,
            pass_rate: if executed == 0 {
                0.0
            } else {
                passed as f32 / executed as f32
            },
            total_duration_ms: unique.iter().map(|r| r.duration_ms).sum(),
            total_actions: unique.iter().map(|r| r.action_count()).sum(),
            failure_categories,
            flaky: unique
                .iter()
                .filter(|r| r.was_flaky)
                .map(|r| r.scenario_id.clone())
                .collect(),
            scenarios: unique
                .iter()
                .map(|r| ScenarioSummary {
                    scenario_id: r.scenario_id.clone(),
                    status: r.status,
                    attempt: r.attempt,
                    was_flaky: r.was_flaky,
                    duration_ms: r.duration_ms,
                    actions: r.action_count(),
                    criteria_score: r.criteria_score,
                    failure_category: r.failure_category,
                    error: r.error.clone(),
                })
                .collect(),
        }
    }

    /// Prefers what the completion callback collected; falls back to the
    /// list the batch runner returned when the callback gathered nothing.
    pub fn from_batch(collected: &[ScenarioResult], returned: &[ScenarioResult]) -> Self {
        if collected.is_empty() {
            Self::from_results(returned)
        } else {
            Self::from_results(collected)
        }
    }

    /// Any scenario that ended in fail, error or timeout after retries.
    pub fn has_failures(&self) -> bool {
        self.failed + self.errored + self.timed_out > 0
    }

    /// `FAILURES` when any scenario ended in fail, error or timeout, `OK`
    /// otherwise. Skipped scenarios count as success, so a dry run exits 0.
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() {
            exit_codes::FAILURES
        } else {
            exit_codes::OK
        }
    }

    pub fn summary_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Audit run {}\n", self.run_id));
        out.push_str(&format!("Generated: {}\n\n", self.generated_at.to_rfc3339()));
        out.push_str(&format!(
            "Scenarios: {}  passed: {}  failed: {}  error: {}  timeout: {}  skipped: {}\n",
            self.total, self.passed, self.failed, self.errored, self.timed_out, self.skipped
        ));
        out.push_str(&format!("Pass rate: {:.1}%\n", self.pass_rate * 100.0));
        out.push_str(&format!(
            "Duration: {:.1}s  actions: {}\n",
            self.total_duration_ms as f64 / 1000.0,
            self.total_actions
        ));

        if !self.failure_categories.is_empty() {
            out.push_str("\nFailure categories:\n");
            for (category, count) in &self.failure_categories {
                out.push_str(&format!("  {:<26}{}\n", category.as_str(), count));
            }
        }
        if !self.flaky.is_empty() {
            out.push_str(&format!("\nFlaky: {}\n", self.flaky.join(", ")));
        }

        out.push_str("\nResults:\n");
        for summary in &self.scenarios {
            let mut line = format!(
                "  [{}] {} ({} actions, {}ms",
                summary.status.as_str().to_uppercase(),
                summary.scenario_id,
                summary.actions,
                summary.duration_ms
            );
            if summary.attempt > 1 {
                line.push_str(&format!(", attempt {}", summary.attempt));
            }
            line.push(')');
            if let Some(category) = summary.failure_category {
                line.push_str(&format!(" {}", category));
            }
            if let Some(error) = &summary.error {
                if summary.status != ScenarioStatus::Pass {
                    line.push_str(&format!(": {}", crate::types::action::truncate(error, 160)));
                }
            }
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    /// Writes `audit-report.json` and `audit-summary.txt` into `dir`.
    pub async fn write(&self, dir: &Path) -> Result<(PathBuf, PathBuf)> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let report_path = dir.join("audit-report.json");
        let summary_path = dir.join("audit-summary.txt");
        tokio::fs::write(&report_path, serde_json::to_string_pretty(self)?).await?;
        tokio::fs::write(&summary_path, self.summary_text()).await?;
        Ok((report_path, summary_path))
    }
}
