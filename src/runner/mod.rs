pub mod batch;
pub mod checks;
pub mod report;
pub mod scenario;
pub mod state_machine;

pub use batch::{BatchConfig, BatchRunner};
pub use report::{AuditReport, ScenarioSummary};
pub use scenario::{RunnerConfig, ScenarioRunner};
pub use state_machine::{PhaseEvent, ScenarioPhase, ScenarioStateMachine, TransitionError};
