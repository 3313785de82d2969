//! Shared fixtures: a scripted executor and helpers to wire a runner around it.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use autoqa::brain::{BrainConfig, DecisionBrain};
use autoqa::driver::{ApiResponse, Executor, VerifyOutcome};
use autoqa::evidence::FileEvidenceSink;
use autoqa::providers::ScriptedDecisionService;
use autoqa::runner::{RunnerConfig, ScenarioRunner};
use autoqa::storage::{InMemoryStore, MemoryStore};
use autoqa::types::{AgentAction, Assertion, ExecutionOutcome, PageObservation};

/// Executor that replays observations and fails actions on targets that
/// are not on the page.
pub struct MockExecutor {
    observations: Mutex<VecDeque<PageObservation>>,
    current: Mutex<PageObservation>,
    verdicts: Mutex<VecDeque<bool>>,
    missing: Vec<String>,
    execute_error: Option<String>,
    navigate_error: Option<String>,
    execute_delay: Option<Duration>,
    executed: Mutex<Vec<AgentAction>>,
    screenshots: Mutex<Vec<String>>,
    navigations: Mutex<Vec<String>>,
    api_calls: Mutex<Vec<String>>,
}

impl MockExecutor {
    pub fn new(observation: PageObservation) -> Self {
        Self {
            observations: Mutex::new(VecDeque::new()),
            current: Mutex::new(observation),
            verdicts: Mutex::new(VecDeque::new()),
            missing: Vec::new(),
            execute_error: None,
            navigate_error: None,
            execute_delay: None,
            executed: Mutex::new(Vec::new()),
            screenshots: Mutex::new(Vec::new()),
            navigations: Mutex::new(Vec::new()),
            api_calls: Mutex::new(Vec::new()),
        }
    }

    /// Observations returned one per `observe`, after which the last repeats.
    pub fn with_observations(self, observations: Vec<PageObservation>) -> Self {
        *self.observations.lock().unwrap() = observations.into();
        self
    }

    /// Results for successive `verify` calls; `true` once exhausted.
    pub fn with_verdicts(self, verdicts: Vec<bool>) -> Self {
        *self.verdicts.lock().unwrap() = verdicts.into();
        self
    }

    /// Targets mentioning this name fail with "Element not found".
    pub fn with_missing(mut self, name: impl Into<String>) -> Self {
        self.missing.push(name.into());
        self
    }

    pub fn with_execute_error(mut self, error: impl Into<String>) -> Self {
        self.execute_error = Some(error.into());
        self
    }

    pub fn with_navigate_error(mut self, error: impl Into<String>) -> Self {
        self.navigate_error = Some(error.into());
        self
    }

    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = Some(delay);
        self
    }

    pub fn executed(&self) -> Vec<AgentAction> {
        self.executed.lock().unwrap().clone()
    }

    pub fn screenshots(&self) -> Vec<String> {
        self.screenshots.lock().unwrap().clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn api_calls(&self) -> Vec<String> {
        self.api_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn observe(&self) -> Result<PageObservation> {
        let next = self.observations.lock().unwrap().pop_front();
        let mut current = self.current.lock().unwrap();
        if let Some(next) = next {
            *current = next;
        }
        Ok(current.clone())
    }

    async fn execute(&self, action: &AgentAction) -> Result<ExecutionOutcome> {
        if let Some(delay) = self.execute_delay {
            tokio::time::sleep(delay).await;
        }
        self.executed.lock().unwrap().push(action.clone());
        if let Some(error) = &self.execute_error {
            return Ok(ExecutionOutcome::failed(error.clone()));
        }
        if let Some(target) = &action.target {
            let described = target.describe();
            if self.missing.iter().any(|m| described.contains(m.as_str())) {
                return Ok(ExecutionOutcome::failed(format!(
                    "Element not found: {}",
                    described
                )));
            }
        }
        Ok(ExecutionOutcome::ok())
    }

    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<()> {
        self.navigations.lock().unwrap().push(url.to_string());
        match &self.navigate_error {
            Some(error) => Err(anyhow!("{}", error)),
            None => Ok(()),
        }
    }

    async fn take_screenshot(&self, label: &str) -> Result<PathBuf> {
        self.screenshots.lock().unwrap().push(label.to_string());
        Ok(PathBuf::from(format!("{}.png", label)))
    }

    async fn api_call(
        &self,
        method: &str,
        endpoint: &str,
        _body: Option<&Value>,
        _headers: &HashMap<String, String>,
    ) -> Result<ApiResponse> {
        self.api_calls
            .lock()
            .unwrap()
            .push(format!("{} {}", method, endpoint));
        Ok(ApiResponse {
            status: 200,
            data: json!({ "ok": true }),
        })
    }

    async fn verify(&self, _assertion: &Assertion) -> Result<VerifyOutcome> {
        let passed = self.verdicts.lock().unwrap().pop_front().unwrap_or(true);
        Ok(VerifyOutcome {
            passed,
            actual: (!passed).then(|| "not on screen".to_string()),
        })
    }

    async fn save_network_log(&self, _scenario_id: &str) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// Brain settings that keep tests fast and single-sampled.
pub fn fast_brain_config() -> BrainConfig {
    BrainConfig {
        consensus_samples: 1,
        decision_attempts: 2,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
        decision_timeout_secs: 5,
        ..Default::default()
    }
}

pub fn fast_runner_config() -> RunnerConfig {
    RunnerConfig {
        base_url: Some("https://app.test".to_string()),
        step_delay_ms: 0,
        step_timeout_secs: 5,
        ..Default::default()
    }
}

pub fn click(role: &str, name: &str, reasoning: &str) -> String {
    json!({
        "type": "click",
        "target": { "role": role, "name": name },
        "reasoning": reasoning,
        "confidence": 0.8
    })
    .to_string()
}

pub fn done(reasoning: &str) -> String {
    json!({ "type": "done", "reasoning": reasoning, "confidence": 0.9 }).to_string()
}

pub struct Harness {
    pub executor: Arc<MockExecutor>,
    pub service: Arc<ScriptedDecisionService>,
    pub store: Arc<InMemoryStore>,
    pub runner: ScenarioRunner,
}

pub fn harness<I, S>(executor: MockExecutor, responses: I, evidence_dir: &Path) -> Harness
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    harness_with(executor, responses, evidence_dir, fast_runner_config())
}

pub fn harness_with<I, S>(
    executor: MockExecutor,
    responses: I,
    evidence_dir: &Path,
    config: RunnerConfig,
) -> Harness
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let executor = Arc::new(executor);
    let service = Arc::new(ScriptedDecisionService::new(responses));
    let store = Arc::new(InMemoryStore::new());
    let store_handle: Arc<dyn MemoryStore> = store.clone();
    let brain = DecisionBrain::new(service.clone(), store_handle, fast_brain_config());
    let runner = ScenarioRunner::new(
        executor.clone(),
        brain,
        Arc::new(FileEvidenceSink::new(evidence_dir)),
        config,
    );
    Harness {
        executor,
        service,
        store,
        runner,
    }
}
