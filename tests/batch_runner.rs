mod common;

use autoqa::exit_codes;
use autoqa::runner::{AuditReport, BatchConfig, BatchRunner, RunnerConfig};
use autoqa::types::{
    Assertion, InteractiveElement, PageObservation, ScenarioResult, ScenarioStatus,
    SuccessCriterion, TestScenario,
};
use common::{done, harness, harness_with, MockExecutor};

fn home_page() -> PageObservation {
    PageObservation::new("https://app.test/home", "Home")
        .with_heading("Welcome home")
        .with_elements(vec![InteractiveElement::new("link", "Settings")])
}

fn scenario(id: &str) -> TestScenario {
    TestScenario::new(id, "Home page visible", "/home").with_max_actions(3)
}

#[tokio::test]
async fn test_flaky_scenario_passes_on_retry() {
    let dir = tempfile::tempdir().unwrap();
    // Only scenario b verifies anything; its first verification fails.
    let executor = MockExecutor::new(home_page()).with_verdicts(vec![false, true]);
    let h = harness(executor, [done("Home page is shown")], dir.path());

    let mut b = scenario("b");
    b.success_criteria.push(SuccessCriterion {
        description: "Greeting shown".to_string(),
        assertion: Assertion::text_visible("Welcome"),
        weight: 1.0,
    });
    let scenarios = vec![scenario("a"), b, scenario("c")];

    let mut batch = BatchRunner::new(h.runner, BatchConfig { max_retries: 1 });
    let mut collected: Vec<ScenarioResult> = Vec::new();
    let returned = batch
        .run_all(&scenarios, |result| collected.push(result.clone()))
        .await;

    assert_eq!(collected.len(), 3);
    assert_eq!(returned.len(), 3);

    let report = AuditReport::from_batch(&collected, &returned);
    assert_eq!(report.passed, 3);
    assert_eq!(report.flaky, ["b"]);
    assert_eq!(report.exit_code(), exit_codes::OK);

    let flaky: Vec<&ScenarioResult> = returned.iter().filter(|r| r.was_flaky).collect();
    assert_eq!(flaky.len(), 1);
    assert_eq!(flaky[0].scenario_id, "b");
    assert_eq!(flaky[0].attempt, 2);
    assert!(returned
        .iter()
        .filter(|r| r.scenario_id != "b")
        .all(|r| r.attempt == 1 && !r.was_flaky));
}

#[tokio::test]
async fn test_persistent_failure_exhausts_retries() {
    let dir = tempfile::tempdir().unwrap();
    let executor = MockExecutor::new(home_page()).with_verdicts(vec![false, false, false]);
    let h = harness(executor, [done("Home page is shown")], dir.path());

    let mut broken = scenario("broken");
    broken.success_criteria.push(SuccessCriterion {
        description: "Banner shown".to_string(),
        assertion: Assertion::text_visible("Sale"),
        weight: 1.0,
    });

    let mut batch = BatchRunner::new(h.runner, BatchConfig { max_retries: 2 });
    let results = batch.run_all(&[broken], |_| {}).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, ScenarioStatus::Fail);
    assert_eq!(results[0].attempt, 3);
    assert!(!results[0].was_flaky);

    // Nothing collected through the callback: the returned list is used.
    let report = AuditReport::from_batch(&[], &results);
    assert_eq!(report.failed, 1);
    assert_eq!(report.exit_code(), exit_codes::FAILURES);
    assert_eq!(
        report.failure_categories.values().sum::<usize>(),
        1,
        "{:?}",
        report.failure_categories
    );
}

#[tokio::test]
async fn test_dry_run_is_skipped_without_retries() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunnerConfig {
        dry_run: true,
        ..common::fast_runner_config()
    };
    let h = harness_with(
        MockExecutor::new(home_page()),
        [done("unused")],
        dir.path(),
        config,
    );
    let executor = h.executor.clone();
    let service = h.service.clone();

    let mut batch = BatchRunner::new(h.runner, BatchConfig { max_retries: 3 });
    let results = batch.run_all(&[scenario("a"), scenario("b")], |_| {}).await;

    assert!(results
        .iter()
        .all(|r| r.status == ScenarioStatus::Skipped && r.attempt == 1));
    assert!(executor.navigations().is_empty());
    assert_eq!(service.call_count(), 0);

    let report = AuditReport::from_results(&results);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.exit_code(), exit_codes::OK);
}
