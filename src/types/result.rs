use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::action::AgentAction;
use super::ScenarioId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Pass,
    Fail,
    Error,
    Timeout,
    Skipped,
}

impl ScenarioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioStatus::Pass => "pass",
            ScenarioStatus::Fail => "fail",
            ScenarioStatus::Error => "error",
            ScenarioStatus::Timeout => "timeout",
            ScenarioStatus::Skipped => "skipped",
        }
    }

    /// Statuses that count against the run's exit code.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ScenarioStatus::Fail | ScenarioStatus::Error | ScenarioStatus::Timeout
        )
    }
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed failure taxonomy. Exactly one per non-passing result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    ElementNotFound,
    ElementNotInteractable,
    NavigationError,
    FormError,
    Timeout,
    StuckLoop,
    AssertionFailed,
    BrowserCrash,
    LlmError,
    NetworkError,
    AuthError,
    Unknown,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::ElementNotFound => "element_not_found",
            FailureCategory::ElementNotInteractable => "element_not_interactable",
            FailureCategory::NavigationError => "navigation_error",
            FailureCategory::FormError => "form_error",
            FailureCategory::Timeout => "timeout",
            FailureCategory::StuckLoop => "stuck_loop",
            FailureCategory::AssertionFailed => "assertion_failed",
            FailureCategory::BrowserCrash => "browser_crash",
            FailureCategory::LlmError => "llm_error",
            FailureCategory::NetworkError => "network_error",
            FailureCategory::AuthError => "auth_error",
            FailureCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the action of a step came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    /// Proposed by the decision service.
    #[default]
    Service,
    /// Chosen locally: stuck escalation or a rejected `done`.
    Local,
    /// Fallback because the decision service failed or ran out of time.
    ServiceUnavailable,
    /// Placeholder for a step cut off before any action was decided.
    Undecided,
}

/// One executed (or attempted) step. Steps are numbered from 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLogEntry {
    pub step: usize,
    pub action: AgentAction,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub url: String,
    #[serde(default)]
    pub screenshot: Option<PathBuf>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source: ActionSource,
    /// A goal outcome completed on this step.
    #[serde(default)]
    pub progressed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionResult {
    pub description: String,
    pub passed: bool,
    pub weight: f32,
    #[serde(default)]
    pub actual: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendCheckResult {
    pub name: String,
    pub passed: bool,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidencePaths {
    #[serde(default)]
    pub action_log: Option<PathBuf>,
    #[serde(default)]
    pub conversation: Option<PathBuf>,
    #[serde(default)]
    pub perception: Option<PathBuf>,
    #[serde(default)]
    pub goal_ledger: Option<PathBuf>,
    #[serde(default)]
    pub result: Option<PathBuf>,
    #[serde(default)]
    pub network_log: Option<PathBuf>,
    #[serde(default)]
    pub screenshots: Vec<PathBuf>,
}

/// Outcome of one run attempt of one scenario. Immutable once the runner returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub scenario_id: ScenarioId,
    pub status: ScenarioStatus,
    pub duration_ms: u64,
    pub action_log: Vec<ActionLogEntry>,
    pub criteria_results: Vec<CriterionResult>,
    pub backend_results: Vec<BackendCheckResult>,
    #[serde(default)]
    pub criteria_score: f32,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub failure_category: Option<FailureCategory>,
    #[serde(default)]
    pub evidence: EvidencePaths,
    pub attempt: u32,
    #[serde(default)]
    pub was_flaky: bool,
}

impl ScenarioResult {
    pub fn skipped(scenario_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            status: ScenarioStatus::Skipped,
            duration_ms: 0,
            action_log: Vec::new(),
            criteria_results: Vec::new(),
            backend_results: Vec::new(),
            criteria_score: 0.0,
            error: Some(reason.into()),
            failure_category: None,
            evidence: EvidencePaths::default(),
            attempt: 1,
            was_flaky: false,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Pass
    }

    pub fn action_count(&self) -> usize {
        self.action_log.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_failure_classification() {
        assert!(ScenarioStatus::Fail.is_failure());
        assert!(ScenarioStatus::Timeout.is_failure());
        assert!(!ScenarioStatus::Pass.is_failure());
        assert!(!ScenarioStatus::Skipped.is_failure());
    }

    #[test]
    fn test_failure_category_wire_names() {
        let json = serde_json::to_string(&FailureCategory::ElementNotFound).unwrap();
        assert_eq!(json, "\"element_not_found\"");
        assert_eq!(FailureCategory::LlmError.to_string(), "llm_error");
    }
}
