use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::checks::{evaluate_criteria, run_backend_checks};
use super::state_machine::{PhaseEvent, ScenarioStateMachine};
use crate::brain::{DecisionBrain, RecordedStep};
use crate::driver::Executor;
use crate::evidence::{EvidenceSink, ScenarioEvidence};
use crate::types::{
    is_fatal_error, ActionLogEntry, ActionSource, AgentAction, BackendCheckResult,
    CriterionResult, EvidencePaths, ExecutionOutcome, ScenarioResult, ScenarioStatus, SetupAction,
    TestScenario,
};

/// Consecutive failed steps that end a scenario.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Base for relative start and navigation urls.
    pub base_url: Option<String>,
    pub navigation_timeout_secs: u64,
    pub step_timeout_secs: u64,
    /// Wall-clock cap for the step loop; 0 disables it.
    pub scenario_timeout_secs: u64,
    pub step_delay_ms: u64,
    pub screenshot_every_step: bool,
    pub dry_run: bool,
}

impl RunnerConfig {
    /// Time a decision may take inside one step. The rest of the step is left
    /// for observing and executing, so a slow decision service still ends in
    /// a fallback action rather than a timed-out step.
    pub fn decision_budget(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs.max(1)) * 3 / 4
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            navigation_timeout_secs: 30,
            step_timeout_secs: 60,
            scenario_timeout_secs: 900,
            step_delay_ms: 500,
            screenshot_every_step: true,
            dry_run: false,
        }
    }
}

/// Resolves `target` against `base` unless it is already absolute.
pub fn resolve_url(base: Option<&str>, target: &str) -> Result<String> {
    if let Ok(absolute) = url::Url::parse(target) {
        return Ok(absolute.to_string());
    }
    let base = base.ok_or_else(|| anyhow!("relative url '{}' needs a base url", target))?;
    let base = url::Url::parse(base).map_err(|e| anyhow!("invalid base url '{}': {}", base, e))?;
    Ok(base.join(target)?.to_string())
}

enum StepOutcome {
    Executed(ActionLogEntry),
    Done(ActionLogEntry),
}

enum LoopEnd {
    Done,
    Aborted { status: ScenarioStatus, error: String },
    BudgetExhausted,
}

fn log_entry(
    step: usize,
    action: AgentAction,
    outcome: &ExecutionOutcome,
    duration: Duration,
    url: &str,
    recorded: RecordedStep,
) -> ActionLogEntry {
    ActionLogEntry {
        step,
        action,
        success: outcome.success,
        error: outcome.error.clone(),
        duration_ms: duration.as_millis() as u64,
        url: url.to_string(),
        screenshot: None,
        timestamp: Utc::now(),
        source: recorded.source,
        progressed: recorded.progressed,
    }
}

/// Drives one scenario through setup, navigation, the step loop, checks,
/// teardown and evidence. Owns the brain; never shared across concurrent runs.
pub struct ScenarioRunner {
    executor: Arc<dyn Executor>,
    brain: DecisionBrain,
    evidence: Arc<dyn EvidenceSink>,
    config: RunnerConfig,
}

impl ScenarioRunner {
    pub fn new(
        executor: Arc<dyn Executor>,
        mut brain: DecisionBrain,
        evidence: Arc<dyn EvidenceSink>,
        config: RunnerConfig,
    ) -> Self {
        brain.limit_decision_time(config.decision_budget());
        Self {
            executor,
            brain,
            evidence,
            config,
        }
    }

    pub fn brain(&self) -> &DecisionBrain {
        &self.brain
    }

    /// Runs one attempt. Always returns a result, whatever went wrong.
    pub async fn run(&mut self, scenario: &TestScenario, attempt: u32) -> ScenarioResult {
        if self.config.dry_run {
            log::info!("[dry run] {}: {}", scenario.id, scenario.goal);
            let mut result = ScenarioResult::skipped(&scenario.id, "dry run");
            result.attempt = attempt;
            return result;
        }

        let started = Instant::now();
        let mut machine = ScenarioStateMachine::new();
        self.brain.init_scenario(scenario).await;
        self.advance(&mut machine, PhaseEvent::Started);

        for action in &scenario.setup {
            if let Err(e) = self.run_setup_action(action).await {
                log::warn!("Setup '{}' failed for {}: {}", action.describe(), scenario.id, e);
            }
        }
        self.advance(&mut machine, PhaseEvent::SetupFinished);

        let mut action_log = Vec::new();
        let mut criteria_results: Vec<CriterionResult> = Vec::new();
        let mut backend_results: Vec<BackendCheckResult> = Vec::new();
        let mut criteria_score = 0.0;

        let abort = match self.navigate_to_start(scenario).await {
            Err(e) => {
                self.advance(&mut machine, PhaseEvent::NavigationFailed);
                Some((ScenarioStatus::Error, e.to_string()))
            }
            Ok(()) => {
                self.advance(&mut machine, PhaseEvent::Navigated);
                let end = self.step_loop(scenario, &mut action_log).await;
                self.advance(&mut machine, PhaseEvent::LoopEnded);

                backend_results =
                    run_backend_checks(self.executor.as_ref(), &scenario.backend_checks).await;
                self.advance(&mut machine, PhaseEvent::ChecksFinished);

                let (results, score) =
                    evaluate_criteria(self.executor.as_ref(), &scenario.success_criteria).await;
                criteria_results = results;
                criteria_score = score;
                self.advance(&mut machine, PhaseEvent::CriteriaFinished);

                let abort = match end {
                    LoopEnd::Done => None,
                    LoopEnd::Aborted { status, error } => Some((status, error)),
                    LoopEnd::BudgetExhausted => Some(budget_exhausted(&action_log)),
                };
                let failed = abort.is_some()
                    || criteria_results.iter().any(|c| !c.passed)
                    || backend_results.iter().any(|b| !b.passed);
                self.run_teardown(scenario, failed).await;
                self.advance(&mut machine, PhaseEvent::TeardownFinished);
                abort
            }
        };

        let (status, error) = match abort {
            Some((status, error)) => (status, Some(error)),
            None => check_status(&criteria_results, &backend_results),
        };
        let failure_category = status
            .is_failure()
            .then(|| self.brain.categorize_failure(error.as_deref(), &action_log));

        let mut evidence = self.write_evidence(&scenario.id, &action_log).await;
        match self.executor.save_network_log(&scenario.id).await {
            Ok(path) => evidence.network_log = path,
            Err(e) => log::debug!("No network log for {}: {}", scenario.id, e),
        }

        let mut result = ScenarioResult {
            scenario_id: scenario.id.clone(),
            status,
            duration_ms: started.elapsed().as_millis() as u64,
            action_log,
            criteria_results,
            backend_results,
            criteria_score,
            error,
            failure_category,
            evidence,
            attempt,
            was_flaky: false,
        };
        match self.evidence.write_result(&result).await {
            Ok(path) => result.evidence.result = Some(path),
            Err(e) => log::warn!("Failed to write result for {}: {}", scenario.id, e),
        }

        if let Err(e) = self.brain.finalize_scenario(status == ScenarioStatus::Pass).await {
            log::warn!("Failed to persist memory for {}: {}", scenario.id, e);
        }

        log::info!(
            "Scenario {} finished: {} after {} step(s) in {}ms{}",
            result.scenario_id,
            result.status,
            result.action_count(),
            result.duration_ms,
            result
                .failure_category
                .map(|c| format!(" ({})", c))
                .unwrap_or_default()
        );
        result
    }

    fn advance(&self, machine: &mut ScenarioStateMachine, event: PhaseEvent) {
        if let Err(e) = machine.transition(event) {
            log::error!("{}", e);
        }
    }

    async fn navigate_to_start(&self, scenario: &TestScenario) -> Result<()> {
        let url = resolve_url(self.config.base_url.as_deref(), &scenario.start_url)?;
        let timeout = Duration::from_secs(self.config.navigation_timeout_secs);
        match tokio::time::timeout(timeout, self.executor.navigate(&url, timeout)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow!("Navigation to {} failed: {}", url, e)),
            Err(_) => Err(anyhow!(
                "Navigation to {} timed out after {}s",
                url,
                timeout.as_secs()
            )),
        }
    }

    async fn step_loop(
        &mut self,
        scenario: &TestScenario,
        action_log: &mut Vec<ActionLogEntry>,
    ) -> LoopEnd {
        let step_timeout = Duration::from_secs(self.config.step_timeout_secs);
        let deadline = (self.config.scenario_timeout_secs > 0)
            .then(|| Instant::now() + Duration::from_secs(self.config.scenario_timeout_secs));
        let mut consecutive_failures = 0u32;

        for step in 1..=scenario.max_actions {
            if deadline.map(|d| Instant::now() >= d).unwrap_or(false) {
                return LoopEnd::Aborted {
                    status: ScenarioStatus::Timeout,
                    error: format!(
                        "Scenario timeout of {}s exceeded after {} step(s)",
                        self.config.scenario_timeout_secs,
                        step - 1
                    ),
                };
            }

            let started = Instant::now();
            // A timed-out step is dropped here; whatever the driver was doing is
            // abandoned, and its artifacts stay labelled with this step number.
            let outcome =
                tokio::time::timeout(step_timeout, self.run_step(step, &scenario.id)).await;
            let entry = match outcome {
                Ok(Ok(StepOutcome::Done(entry))) => {
                    action_log.push(entry);
                    return LoopEnd::Done;
                }
                Ok(Ok(StepOutcome::Executed(entry))) => entry,
                Ok(Err(e)) => self.failed_step(step, e.to_string(), started.elapsed()),
                Err(_) => self.failed_step(
                    step,
                    format!("Step {} timed out after {}s", step, step_timeout.as_secs()),
                    started.elapsed(),
                ),
            };

            if entry.success {
                consecutive_failures = 0;
            } else {
                consecutive_failures += 1;
            }
            let error = entry.error.clone();
            action_log.push(entry);

            if let Some(error) = error.as_deref() {
                if is_fatal_error(error) {
                    return LoopEnd::Aborted {
                        status: ScenarioStatus::Error,
                        error: format!("Browser session lost at step {}: {}", step, error),
                    };
                }
            }
            if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                return LoopEnd::Aborted {
                    status: ScenarioStatus::Error,
                    error: format!(
                        "Aborted after {} consecutive failed actions; last error: {}",
                        consecutive_failures,
                        error.as_deref().unwrap_or("unknown")
                    ),
                };
            }

            if step < scenario.max_actions {
                if !self.executor.is_open().await {
                    return LoopEnd::Aborted {
                        status: ScenarioStatus::Error,
                        error: format!("Target page has been closed after step {}", step),
                    };
                }
                tokio::time::sleep(Duration::from_millis(self.config.step_delay_ms)).await;
            }
        }
        LoopEnd::BudgetExhausted
    }

    /// observe -> decide -> execute -> screenshot -> record.
    async fn run_step(&mut self, step: usize, scenario_id: &str) -> Result<StepOutcome> {
        let observation = self.executor.observe().await?;
        let action = self.brain.decide_action(&observation).await;
        let started = Instant::now();

        if action.is_done() {
            let outcome = ExecutionOutcome::ok();
            let recorded = self.brain.record_result(&action, &outcome, Duration::ZERO);
            let entry = log_entry(
                step,
                action,
                &outcome,
                Duration::ZERO,
                &observation.url,
                recorded,
            );
            return Ok(StepOutcome::Done(entry));
        }

        let outcome = match self.executor.execute(&action).await {
            Ok(outcome) => outcome,
            Err(e) => ExecutionOutcome::failed(e.to_string()),
        };

        let screenshot = if self.config.screenshot_every_step {
            let label = format!("{}-step-{:03}", scenario_id, step);
            match self.executor.take_screenshot(&label).await {
                Ok(path) => Some(path),
                Err(e) => {
                    log::debug!("Screenshot {} failed: {}", label, e);
                    None
                }
            }
        } else {
            None
        };

        let duration = started.elapsed();
        let recorded = self.brain.record_result(&action, &outcome, duration);
        let mut entry = log_entry(step, action, &outcome, duration, &observation.url, recorded);
        entry.screenshot = screenshot;
        Ok(StepOutcome::Executed(entry))
    }

    /// Log entry for a step that errored or timed out before it finished.
    fn failed_step(&mut self, step: usize, error: String, elapsed: Duration) -> ActionLogEntry {
        log::warn!("Step {} failed: {}", step, error);
        let outcome = ExecutionOutcome::failed(error.clone());
        let url = self
            .brain
            .perception_log()
            .last()
            .filter(|p| p.step == step)
            .map(|p| p.url.clone())
            .unwrap_or_default();
        let (action, recorded) = match self.brain.pending_action().cloned() {
            Some(action) => {
                let recorded = self.brain.record_result(&action, &outcome, elapsed);
                (action, recorded)
            }
            None => {
                self.brain.abandon_step(step, &error);
                let placeholder =
                    AgentAction::wait(0, "no action was decided before the step failed")
                        .with_confidence(0.0);
                let recorded = RecordedStep {
                    source: ActionSource::Undecided,
                    progressed: false,
                };
                (placeholder, recorded)
            }
        };
        log_entry(step, action, &outcome, elapsed, &url, recorded)
    }

    async fn run_setup_action(&self, action: &SetupAction) -> Result<()> {
        match action {
            SetupAction::ApiCall {
                method,
                endpoint,
                body,
                headers,
            } => {
                let response = self
                    .executor
                    .api_call(method, endpoint, body.as_ref(), headers)
                    .await?;
                if response.status >= 400 {
                    return Err(anyhow!("{} {} returned {}", method, endpoint, response.status));
                }
                Ok(())
            }
            SetupAction::Navigate { url } => {
                let url = resolve_url(self.config.base_url.as_deref(), url)?;
                self.executor
                    .navigate(&url, Duration::from_secs(self.config.navigation_timeout_secs))
                    .await
            }
            SetupAction::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(())
            }
            SetupAction::Script { source } => self.executor.run_script(source).await.map(|_| ()),
        }
    }

    async fn run_teardown(&self, scenario: &TestScenario, failed: bool) {
        for teardown in &scenario.teardown {
            if failed && !teardown.run_on_failure {
                log::debug!("Skipping teardown '{}' after failure", teardown.action.describe());
                continue;
            }
            if let Err(e) = self.run_setup_action(&teardown.action).await {
                log::warn!(
                    "Teardown '{}' failed for {}: {}",
                    teardown.action.describe(),
                    scenario.id,
                    e
                );
            }
        }
    }

    async fn write_evidence(&self, scenario_id: &str, action_log: &[ActionLogEntry]) -> EvidencePaths {
        let evidence = ScenarioEvidence {
            scenario_id,
            action_log,
            transcript: self.brain.transcript(),
            perception: self.brain.perception_log(),
            ledger: self.brain.ledger(),
        };
        match self.evidence.write_scenario(&evidence).await {
            Ok(paths) => paths,
            Err(e) => {
                log::warn!("Failed to write evidence for {}: {}", scenario_id, e);
                EvidencePaths::default()
            }
        }
    }
}

/// Status after the budget ran out: `error` when the last step failed, so
/// the underlying failure is kept, otherwise `timeout`.
fn budget_exhausted(action_log: &[ActionLogEntry]) -> (ScenarioStatus, String) {
    let base = format!(
        "Step budget exhausted after {} action(s) without completing the goal",
        action_log.len()
    );
    match action_log.last() {
        Some(last) if !last.success => {
            let error = last.error.as_deref().unwrap_or("unknown");
            (ScenarioStatus::Error, format!("{}; last error: {}", base, error))
        }
        _ => (ScenarioStatus::Timeout, base),
    }
}

fn check_status(
    criteria: &[CriterionResult],
    backend: &[BackendCheckResult],
) -> (ScenarioStatus, Option<String>) {
    let mut problems: Vec<String> = criteria
        .iter()
        .filter(|c| !c.passed)
        .map(|c| {
            let detail = c
                .error
                .clone()
                .or_else(|| c.actual.clone().map(|a| format!("actual: {}", a)))
                .unwrap_or_else(|| "did not hold".to_string());
            format!("criterion '{}' failed ({})", c.description, detail)
        })
        .collect();
    problems.extend(backend.iter().filter(|b| !b.passed).map(|b| {
        format!(
            "backend check '{}' failed ({})",
            b.name,
            b.detail.as_deref().unwrap_or("no detail")
        )
    }));

    if problems.is_empty() {
        (ScenarioStatus::Pass, None)
    } else {
        (ScenarioStatus::Fail, Some(problems.join("; ")))
    }
}
