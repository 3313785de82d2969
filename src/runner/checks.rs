use crate::driver::Executor;
use crate::types::action::truncate;
use crate::types::{BackendCheck, BackendCheckResult, CriterionResult, SuccessCriterion};

/// Evaluates every criterion independently; a failing or erroring one never
/// stops the rest. Returns the results and the weighted pass score.
pub async fn evaluate_criteria(
    executor: &dyn Executor,
    criteria: &[SuccessCriterion],
) -> (Vec<CriterionResult>, f32) {
    let mut results = Vec::with_capacity(criteria.len());
    for criterion in criteria {
        let result = match executor.verify(&criterion.assertion).await {
            Ok(outcome) => CriterionResult {
                description: criterion.description.clone(),
                passed: outcome.passed,
                weight: criterion.weight,
                actual: outcome.actual,
                error: None,
            },
            Err(e) => CriterionResult {
                description: criterion.description.clone(),
                passed: false,
                weight: criterion.weight,
                actual: None,
                error: Some(e.to_string()),
            },
        };
        if !result.passed {
            log::info!("Criterion '{}' did not hold", result.description);
        }
        results.push(result);
    }
    let score = criteria_score(&results);
    (results, score)
}

/// Share of total weight carried by passing criteria; 1.0 when there are none.
pub fn criteria_score(results: &[CriterionResult]) -> f32 {
    let total: f32 = results.iter().map(|r| r.weight.max(0.0)).sum();
    if total <= 0.0 {
        return if results.iter().all(|r| r.passed) { 1.0 } else { 0.0 };
    }
    let passed: f32 = results
        .iter()
        .filter(|r| r.passed)
        .map(|r| r.weight.max(0.0))
        .sum();
    passed / total
}

pub async fn run_backend_checks(
    executor: &dyn Executor,
    checks: &[BackendCheck],
) -> Vec<BackendCheckResult> {
    let mut results = Vec::with_capacity(checks.len());
    for check in checks {
        let response = executor
            .api_call(
                &check.method,
                &check.endpoint,
                check.body.as_ref(),
                &Default::default(),
            )
            .await;
        let result = match response {
            Ok(response) => {
                let status_ok = match check.expect_status {
                    Some(expected) => response.status == expected,
                    None => (200..300).contains(&response.status),
                };
                let body = response.data.to_string();
                let body_ok = check
                    .expect_body_contains
                    .as_deref()
                    .map(|needle| body.contains(needle))
                    .unwrap_or(true);
                let detail = match (status_ok, body_ok) {
                    (true, true) => None,
                    (false, _) => Some(format!(
                        "expected status {}, got {}",
                        check
                            .expect_status
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "2xx".to_string()),
                        response.status
                    )),
                    (true, false) => Some(format!(
                        "response body does not contain '{}': {}",
                        check.expect_body_contains.as_deref().unwrap_or_default(),
                        truncate(&body, 200)
                    )),
                };
                BackendCheckResult {
                    name: check.name.clone(),
                    passed: status_ok && body_ok,
                    status: Some(response.status),
                    detail,
                }
            }
            Err(e) => BackendCheckResult {
                name: check.name.clone(),
                passed: false,
                status: None,
                detail: Some(e.to_string()),
            },
        };
        if !result.passed {
            log::info!(
                "Backend check '{}' failed: {}",
                result.name,
                result.detail.as_deref().unwrap_or("")
            );
        }
        results.push(result);
    }
    results
}
