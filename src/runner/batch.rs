use serde::{Deserialize, Serialize};

use super::scenario::ScenarioRunner;
use crate::types::{ScenarioResult, ScenarioStatus, TestScenario};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Extra attempts for a scenario that did not pass.
    pub max_retries: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_retries: 1 }
    }
}

/// Runs scenarios one after another through a single runner, retrying
/// non-passing ones to separate flaky scenarios from broken ones.
pub struct BatchRunner {
    runner: ScenarioRunner,
    config: BatchConfig,
}

impl BatchRunner {
    pub fn new(runner: ScenarioRunner, config: BatchConfig) -> Self {
        Self { runner, config }
    }

    /// One final result per scenario, in input order. `on_complete` sees each
    /// final result as soon as its scenario is done.
    pub async fn run_all<F>(&mut self, scenarios: &[TestScenario], mut on_complete: F) -> Vec<ScenarioResult>
    where
        F: FnMut(&ScenarioResult),
    {
        let attempts = self.config.max_retries + 1;
        let mut results = Vec::with_capacity(scenarios.len());

        for (index, scenario) in scenarios.iter().enumerate() {
            log::info!(
                "[{}/{}] Running {} ({})",
                index + 1,
                scenarios.len(),
                scenario.id,
                scenario.priority.as_str()
            );

            let mut attempt = 1;
            let mut result = self.runner.run(scenario, attempt).await;
            while !result.passed() && result.status != ScenarioStatus::Skipped && attempt < attempts
            {
                log::info!(
                    "{} ended {} on attempt {}/{}, retrying",
                    scenario.id,
                    result.status,
                    attempt,
                    attempts
                );
                attempt += 1;
                result = self.runner.run(scenario, attempt).await;
            }
            result.attempt = attempt;
            result.was_flaky = result.passed() && attempt > 1;
            if result.was_flaky {
                log::warn!("{} passed only on attempt {}", scenario.id, attempt);
            }

            on_complete(&result);
            results.push(result);
        }
        results
    }
}
