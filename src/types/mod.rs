pub mod action;
pub mod ledger;
pub mod observation;
pub mod result;
pub mod scenario;

pub use action::{ActionKind, AgentAction, Assertion, AssertionKind, ScrollDirection, Target};
pub use ledger::{GoalLedger, PerceptionEntry};
pub use observation::{ApiCallRecord, BoundingBox, InteractiveElement, PageObservation, Viewport};
pub use result::{
    ActionLogEntry, ActionSource, BackendCheckResult, CriterionResult, EvidencePaths,
    FailureCategory, ScenarioResult, ScenarioStatus,
};
pub use scenario::{
    BackendCheck, Persona, Priority, SetupAction, SuccessCriterion, TeardownAction, TestScenario,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ScenarioId = String;
pub type RunId = Uuid;

/// Outcome of executing one primitive action against the target application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Strings the driver uses when the page, browser or session is gone.
const FATAL_MARKERS: &[&str] = &[
    "target closed",
    "target page, context or browser has been closed",
    "page has been closed",
    "browser has been closed",
    "browser closed",
    "context has been closed",
    "session closed",
    "session not found",
    "browser has disconnected",
];

/// Returns true when an error means the session cannot be used any more.
pub fn is_fatal_error(error: &str) -> bool {
    let lower = error.to_lowercase();
    FATAL_MARKERS.iter().any(|marker| lower.contains(marker))
}
