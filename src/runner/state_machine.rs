use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioPhase {
    Init,
    Setup,
    Navigate,
    StepLoop,
    BackendChecks,
    CriteriaEval,
    Teardown,
    Finalize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseEvent {
    Started,
    SetupFinished,
    Navigated,
    NavigationFailed,
    LoopEnded,
    ChecksFinished,
    CriteriaFinished,
    TeardownFinished,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid scenario transition from {from:?} on {event:?}")]
pub struct TransitionError {
    pub from: ScenarioPhase,
    pub event: PhaseEvent,
}

/// Phase bookkeeping for one scenario run.
///
/// `Init -> Setup -> Navigate -> StepLoop -> BackendChecks -> CriteriaEval
/// -> Teardown -> Finalize`, with a direct `Navigate -> Finalize` edge when
/// the start page cannot be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioStateMachine {
    phase: ScenarioPhase,
    visited: Vec<ScenarioPhase>,
}

impl Default for ScenarioStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioStateMachine {
    pub fn new() -> Self {
        Self {
            phase: ScenarioPhase::Init,
            visited: vec![ScenarioPhase::Init],
        }
    }

    pub fn phase(&self) -> ScenarioPhase {
        self.phase
    }

    pub fn visited(&self) -> &[ScenarioPhase] {
        &self.visited
    }

    pub fn transition(&mut self, event: PhaseEvent) -> Result<ScenarioPhase, TransitionError> {
        let next = match (self.phase, event) {
            (ScenarioPhase::Init, PhaseEvent::Started) => ScenarioPhase::Setup,
            (ScenarioPhase::Setup, PhaseEvent::SetupFinished) => ScenarioPhase::Navigate,
            (ScenarioPhase::Navigate, PhaseEvent::Navigated) => ScenarioPhase::StepLoop,
            (ScenarioPhase::Navigate, PhaseEvent::NavigationFailed) => ScenarioPhase::Finalize,
            (ScenarioPhase::StepLoop, PhaseEvent::LoopEnded) => ScenarioPhase::BackendChecks,
            (ScenarioPhase::BackendChecks, PhaseEvent::ChecksFinished) => {
                ScenarioPhase::CriteriaEval
            }
            (ScenarioPhase::CriteriaEval, PhaseEvent::CriteriaFinished) => ScenarioPhase::Teardown,
            (ScenarioPhase::Teardown, PhaseEvent::TeardownFinished) => ScenarioPhase::Finalize,
            (from, event) => return Err(TransitionError { from, event }),
        };
        log::debug!("Scenario phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
        self.visited.push(next);
        Ok(next)
    }
}
