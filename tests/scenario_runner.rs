mod common;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use autoqa::brain::{BrainConfig, DecisionBrain};
use autoqa::evidence::FileEvidenceSink;
use autoqa::providers::{DecisionService, Message};
use autoqa::runner::{RunnerConfig, ScenarioRunner};
use autoqa::storage::{InMemoryStore, MemoryStore};
use autoqa::types::{
    ActionKind, ActionSource, Assertion, FailureCategory, InteractiveElement, PageObservation,
    ScenarioStatus, SetupAction, SuccessCriterion, TeardownAction, TestScenario,
};
use common::{click, done, harness, harness_with, MockExecutor};

/// Decision service that never answers.
struct SilentService;

#[async_trait]
impl DecisionService for SilentService {
    async fn propose(&self, _messages: Vec<Message>) -> anyhow::Result<String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(String::new())
    }
}

fn shop_page() -> PageObservation {
    PageObservation::new("https://app.test/shop", "Product")
        .with_heading("Blue mug")
        .with_elements(vec![
            InteractiveElement::new("button", "Add to cart"),
            InteractiveElement::new("link", "Home"),
        ])
}

fn assert_contiguous(steps: &[usize]) {
    let expected: Vec<usize> = (1..=steps.len()).collect();
    assert_eq!(steps, expected.as_slice());
}

#[tokio::test]
async fn test_missing_target_with_single_action_budget() {
    let dir = tempfile::tempdir().unwrap();
    let executor = MockExecutor::new(shop_page()).with_missing("Ghost");
    let mut h = harness(
        executor,
        [click("button", "Ghost", "Press the ghost button")],
        dir.path(),
    );
    let scenario = TestScenario::new("ghost", "Buy the first product", "/shop").with_max_actions(1);

    let result = h.runner.run(&scenario, 1).await;

    assert_eq!(result.status, ScenarioStatus::Error);
    assert_eq!(result.failure_category, Some(FailureCategory::ElementNotFound));
    assert_eq!(result.action_log.len(), 1);
    assert!(!result.action_log[0].success);
    let error = result.error.unwrap();
    assert!(error.contains("Step budget exhausted"), "{}", error);
    assert!(error.contains("Element not found"), "{}", error);
    assert_eq!(h.executor.navigations(), ["https://app.test/shop"]);
}

#[tokio::test]
async fn test_goal_reached_passes_and_caches() {
    let dir = tempfile::tempdir().unwrap();
    let home = PageObservation::new("https://app.test/home", "Home")
        .with_elements(vec![InteractiveElement::new("link", "Dashboard")]);
    let dashboard = PageObservation::new("https://app.test/dashboard", "Dashboard")
        .with_heading("Dashboard")
        .with_elements(vec![
            InteractiveElement::new("region", "Revenue widget"),
            InteractiveElement::new("link", "Home"),
        ]);
    let executor = MockExecutor::new(home.clone()).with_observations(vec![home, dashboard]);
    let mut h = harness(
        executor,
        [
            click("link", "Dashboard", "Open the dashboard"),
            done("Dashboard and widgets are on screen"),
        ],
        dir.path(),
    );
    let mut scenario = TestScenario::new(
        "dashboard",
        "Open the dashboard and verify widgets visible",
        "/home",
    );
    scenario.success_criteria.push(SuccessCriterion {
        description: "Revenue widget shown".to_string(),
        assertion: Assertion::text_visible("Revenue"),
        weight: 1.0,
    });

    let result = h.runner.run(&scenario, 1).await;

    assert_eq!(result.status, ScenarioStatus::Pass, "{:?}", result.error);
    assert_eq!(result.failure_category, None);
    assert_eq!(result.criteria_score, 1.0);
    let steps: Vec<usize> = result.action_log.iter().map(|e| e.step).collect();
    assert_contiguous(&steps);
    assert!(result.action_log.last().unwrap().action.is_done());
    assert!(!h.runner.brain().ledger().completed_outcomes.is_empty());
    assert_eq!(h.executor.screenshots(), ["dashboard-step-001"]);

    for suffix in [
        "action-log",
        "llm-conversation",
        "perception",
        "goal-ledger",
        "result",
    ] {
        let path = dir.path().join(format!("dashboard-{}.json", suffix));
        assert!(path.exists(), "missing {}", path.display());
    }

    let cached = h.store.load_cache("dashboard").await.unwrap().unwrap();
    assert_eq!(cached.steps.len(), 1);
    assert_eq!(cached.success_count, 1);
}

#[tokio::test]
async fn test_navigation_failure_still_reports() {
    let dir = tempfile::tempdir().unwrap();
    let executor =
        MockExecutor::new(shop_page()).with_navigate_error("net::ERR_CONNECTION_REFUSED");
    let mut h = harness(executor, [done("unused")], dir.path());
    let scenario = TestScenario::new("offline", "Buy the first product", "/shop");

    let result = h.runner.run(&scenario, 1).await;

    assert_eq!(result.status, ScenarioStatus::Error);
    assert_eq!(result.failure_category, Some(FailureCategory::NavigationError));
    assert!(result.action_log.is_empty());
    assert_eq!(h.service.call_count(), 0);
    assert!(dir.path().join("offline-result.json").exists());
}

#[tokio::test]
async fn test_closed_browser_aborts_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let executor = MockExecutor::new(shop_page()).with_execute_error("Target closed");
    let mut h = harness(
        executor,
        [click("button", "Add to cart", "Add the mug")],
        dir.path(),
    );
    let scenario = TestScenario::new("crash", "Buy the first product", "/shop");

    let result = h.runner.run(&scenario, 1).await;

    assert_eq!(result.status, ScenarioStatus::Error);
    assert_eq!(result.failure_category, Some(FailureCategory::BrowserCrash));
    assert_eq!(result.action_log.len(), 1);
    assert!(result.error.unwrap().contains("Browser session lost at step 1"));
}

#[tokio::test]
async fn test_consecutive_failures_abort() {
    let dir = tempfile::tempdir().unwrap();
    let executor = MockExecutor::new(shop_page()).with_missing("Ghost");
    let mut h = harness(
        executor,
        [click("button", "Ghost", "Press the ghost button")],
        dir.path(),
    );
    let scenario = TestScenario::new("ghosts", "Buy the first product", "/shop");

    let result = h.runner.run(&scenario, 1).await;

    assert_eq!(result.status, ScenarioStatus::Error);
    assert_eq!(result.action_log.len(), 5);
    assert!(result.action_log.iter().all(|e| !e.success));
    assert!(result.error.unwrap().contains("5 consecutive failed actions"));
    assert_eq!(result.failure_category, Some(FailureCategory::ElementNotFound));
}

#[tokio::test]
async fn test_step_timeout_keeps_numbering() {
    let dir = tempfile::tempdir().unwrap();
    let executor = MockExecutor::new(shop_page()).with_execute_delay(Duration::from_secs(3));
    let config = RunnerConfig {
        step_timeout_secs: 1,
        ..common::fast_runner_config()
    };
    let mut h = harness_with(
        executor,
        [click("button", "Add to cart", "Add the mug")],
        dir.path(),
        config,
    );
    let scenario = TestScenario::new("slow", "Buy the first product", "/shop").with_max_actions(2);

    let result = h.runner.run(&scenario, 1).await;

    assert_eq!(result.status, ScenarioStatus::Error);
    assert_eq!(result.failure_category, Some(FailureCategory::Timeout));
    let steps: Vec<usize> = result.action_log.iter().map(|e| e.step).collect();
    assert_eq!(steps, [1, 2]);
    for entry in &result.action_log {
        assert!(matches!(entry.action.kind, ActionKind::Click));
        assert!(entry.error.as_deref().unwrap().contains("timed out"));
    }
    assert_eq!(h.runner.brain().perception_log().len(), 2);
}

#[tokio::test]
async fn test_failed_criterion_runs_only_failure_teardown() {
    let dir = tempfile::tempdir().unwrap();
    let executor = MockExecutor::new(shop_page()).with_verdicts(vec![false]);
    let mut h = harness(
        executor,
        [
            click("button", "Add to cart", "Add the product to the cart"),
            done("The product is in the cart"),
        ],
        dir.path(),
    );
    let mut scenario = TestScenario::new("cart", "Add the product to the cart", "/shop");
    scenario.setup.push(SetupAction::ApiCall {
        method: "POST".to_string(),
        endpoint: "/api/seed".to_string(),
        body: None,
        headers: HashMap::new(),
    });
    scenario.teardown.push(TeardownAction {
        action: SetupAction::ApiCall {
            method: "POST".to_string(),
            endpoint: "/api/reset".to_string(),
            body: None,
            headers: HashMap::new(),
        },
        run_on_failure: true,
    });
    scenario.teardown.push(TeardownAction {
        action: SetupAction::ApiCall {
            method: "DELETE".to_string(),
            endpoint: "/api/orders".to_string(),
            body: None,
            headers: HashMap::new(),
        },
        run_on_failure: false,
    });
    scenario.success_criteria.push(SuccessCriterion {
        description: "Cart shows one item".to_string(),
        assertion: Assertion::text_visible("1 item"),
        weight: 1.0,
    });

    let result = h.runner.run(&scenario, 1).await;

    assert_eq!(result.status, ScenarioStatus::Fail);
    assert_eq!(result.failure_category, Some(FailureCategory::AssertionFailed));
    assert_eq!(result.criteria_score, 0.0);
    assert!(result
        .error
        .unwrap()
        .contains("criterion 'Cart shows one item' failed"));
    assert_eq!(h.executor.api_calls(), ["POST /api/seed", "POST /api/reset"]);
    assert!(h.store.load_cache("cart").await.unwrap().is_none());
}

#[tokio::test]
async fn test_action_log_never_exceeds_budget() {
    let dir = tempfile::tempdir().unwrap();
    let pages: Vec<PageObservation> = (0..6)
        .map(|i| {
            PageObservation::new(format!("https://app.test/page/{}", i), "Catalog")
                .with_elements(vec![InteractiveElement::new("link", "Next")])
        })
        .collect();
    let executor = MockExecutor::new(pages[0].clone()).with_observations(pages);
    let mut h = harness(
        executor,
        [click("link", "Next", "Keep browsing the catalog")],
        dir.path(),
    );
    let scenario =
        TestScenario::new("browse", "Find the checkout receipt", "/page/0").with_max_actions(4);

    let result = h.runner.run(&scenario, 1).await;

    assert!(result.action_log.len() <= 4);
    let steps: Vec<usize> = result.action_log.iter().map(|e| e.step).collect();
    assert_contiguous(&steps);
    assert_eq!(result.status, ScenarioStatus::Timeout);
    assert_eq!(result.failure_category, Some(FailureCategory::Timeout));
}

#[tokio::test(start_paused = true)]
async fn test_silent_service_falls_back_with_default_timeouts() {
    let dir = tempfile::tempdir().unwrap();
    let executor = Arc::new(MockExecutor::new(shop_page()));
    let brain = DecisionBrain::new(
        Arc::new(SilentService),
        Arc::new(InMemoryStore::new()),
        BrainConfig::default(),
    );
    let config = RunnerConfig {
        base_url: Some("https://app.test".to_string()),
        ..Default::default()
    };
    let mut runner = ScenarioRunner::new(
        executor.clone(),
        brain,
        Arc::new(FileEvidenceSink::new(dir.path())),
        config,
    );
    assert!(runner.brain().decision_deadline() < Duration::from_secs(60));

    let scenario = TestScenario::new("silent", "Buy the first product", "/shop").with_max_actions(3);
    let result = runner.run(&scenario, 1).await;

    assert_eq!(result.action_log.len(), 3);
    for entry in &result.action_log {
        assert_eq!(entry.source, ActionSource::ServiceUnavailable);
        assert!(entry.success, "{:?}", entry.error);
        assert!(matches!(entry.action.kind, ActionKind::Wait { .. }));
        assert!(entry.action.reasoning.starts_with("Fallback"));
    }
    assert_eq!(executor.executed().len(), 3);
    assert_eq!(result.status, ScenarioStatus::Timeout);
    assert_eq!(result.failure_category, Some(FailureCategory::LlmError));
}
