use serde::{Deserialize, Serialize};

/// Which sub-outcomes of the goal have been observed as satisfied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalLedger {
    pub goal: String,
    pub required_outcomes: Vec<String>,
    /// Grows monotonically, in completion order.
    pub completed_outcomes: Vec<String>,
    pub stuck_score: u32,
    pub steps_since_progress: u32,
}

impl GoalLedger {
    pub fn is_complete(&self, outcome: &str) -> bool {
        self.completed_outcomes.iter().any(|o| o == outcome)
    }

    pub fn pending_outcomes(&self) -> impl Iterator<Item = &String> {
        self.required_outcomes
            .iter()
            .filter(move |o| !self.is_complete(o))
    }

    pub fn completion_ratio(&self) -> f32 {
        if self.required_outcomes.is_empty() {
            return 0.0;
        }
        self.completed_outcomes.len() as f32 / self.required_outcomes.len() as f32
    }

    pub fn status_line(&self) -> String {
        format!(
            "{}/{} outcomes complete, stuck score {}, {} step(s) since progress",
            self.completed_outcomes.len(),
            self.required_outcomes.len(),
            self.stuck_score,
            self.steps_since_progress
        )
    }
}

/// Per-step UX snapshot. One entry per decided step, append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerceptionEntry {
    pub step: usize,
    pub url: String,
    pub confidence: f32,
    pub confusion_signals: Vec<String>,
    pub progress_made: bool,
}
