use regex::Regex;

use crate::types::{ActionLogEntry, ActionSource, FailureCategory};

/// Trailing identical actions needed to call a run a loop.
const LOOP_RUN: usize = 3;

/// Ordered rule table mapping an error string and action log to a category.
///
/// Rules are evaluated top to bottom and the first match wins, so the same
/// input always yields the same category.
pub struct FailureClassifier {
    rules: Vec<(FailureCategory, Regex)>,
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn rule(category: FailureCategory, pattern: &str) -> (FailureCategory, Regex) {
    let regex = Regex::new(&format!("(?i){}", pattern))
        .unwrap_or_else(|e| panic!("invalid built-in pattern for {}: {}", category, e));
    (category, regex)
}

impl FailureClassifier {
    pub fn new() -> Self {
        let rules = vec![
            rule(
                FailureCategory::BrowserCrash,
                r"target (page, context or browser )?(has been )?closed|browser (has been )?(closed|crashed|disconnected)|page (has been )?(closed|crashed)|session (closed|not found)|\bcrash",
            ),
            rule(
                FailureCategory::ElementNotFound,
                r"not found|no (such )?element|unable to (locate|find)|could not (locate|find)|waiting for (locator|selector)|resolved to 0 elements|does not exist",
            ),
            rule(
                FailureCategory::ElementNotInteractable,
                r"disabled|not (interactable|clickable|editable|enabled|visible)|intercepts pointer events|obscured|outside of the viewport|detached from",
            ),
            rule(
                FailureCategory::NavigationError,
                r"navigat(e|ion)|net::err|err_name_not_resolved|err_connection|goto",
            ),
            rule(
                FailureCategory::StuckLoop,
                r"\bstuck\b|\bloop(ing)?\b|same screen|repeated action",
            ),
            rule(
                FailureCategory::NetworkError,
                r"network|fetch failed|econn(refused|reset)|connection (refused|reset)|socket|\bdns\b|status 5\d\d|\b50[0-4]\b",
            ),
            rule(
                FailureCategory::AuthError,
                r"\b401\b|\b403\b|unauthori[sz]ed|forbidden|auth(entication|orization)? (failed|required|error)|login failed|session expired",
            ),
            rule(
                FailureCategory::FormError,
                r"validation|required field|is required|invalid (input|value|format|email)|\bform\b",
            ),
            rule(
                FailureCategory::AssertionFailed,
                r"assert|criteri(on|a)|backend check|verification failed|expected .+ (but|got)",
            ),
            rule(
                FailureCategory::Timeout,
                r"timed? ?out|timeout|deadline|budget exhausted",
            ),
            rule(
                FailureCategory::LlmError,
                r"\bllm\b|decision service|anthropic|openai|rate limit|completion",
            ),
        ];
        Self { rules }
    }

    pub fn categorize(&self, error: Option<&str>, log: &[ActionLogEntry]) -> FailureCategory {
        let text = error.unwrap_or("");
        let looping = trailing_loop(log);
        // Generic budget or timeout wording hides an outage of the decision service.
        let outage = log
            .last()
            .is_some_and(|e| e.source == ActionSource::ServiceUnavailable);

        for (category, regex) in &self.rules {
            if *category == FailureCategory::StuckLoop && looping {
                return FailureCategory::StuckLoop;
            }
            if *category == FailureCategory::Timeout && outage {
                return FailureCategory::LlmError;
            }
            if !text.is_empty() && regex.is_match(text) {
                return *category;
            }
        }

        // Fall back to the last failed step when the summary error says nothing.
        if let Some(last_error) = log.iter().rev().find_map(|e| e.error.as_deref()) {
            if last_error != text {
                return self.categorize(Some(last_error), &[]);
            }
        }
        FailureCategory::Unknown
    }
}

/// True when the log ends with `LOOP_RUN` identical decided actions on the
/// same url, none of which moved the goal forward. Fallbacks for an
/// unavailable decision service and undecided placeholders never count.
fn trailing_loop(log: &[ActionLogEntry]) -> bool {
    if log.len() < LOOP_RUN {
        return false;
    }
    let tail = &log[log.len() - LOOP_RUN..];
    let first = (tail[0].action.signature(), &tail[0].url);
    tail.iter().all(|e| {
        matches!(e.source, ActionSource::Service | ActionSource::Local)
            && !e.progressed
            && e.action.signature() == first.0
            && &e.url == first.1
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentAction, Target};
    use chrono::Utc;

    fn entry(step: usize, action: AgentAction, error: Option<&str>) -> ActionLogEntry {
        ActionLogEntry {
            step,
            action,
            success: error.is_none(),
            error: error.map(String::from),
            duration_ms: 10,
            url: "https://app.test/cart".to_string(),
            screenshot: None,
            timestamp: Utc::now(),
            source: ActionSource::Service,
            progressed: false,
        }
    }

    #[test]
    fn test_rule_order_first_match_wins() {
        let classifier = FailureClassifier::new();
        let cases = [
            ("Target page, context or browser has been closed", FailureCategory::BrowserCrash),
            ("Element not found: button 'Pay'", FailureCategory::ElementNotFound),
            ("element is disabled", FailureCategory::ElementNotInteractable),
            ("Navigation timeout of 30000 ms exceeded", FailureCategory::NavigationError),
            ("fetch failed: ECONNREFUSED", FailureCategory::NetworkError),
            ("HTTP 401 Unauthorized", FailureCategory::AuthError),
            ("Email is required", FailureCategory::FormError),
            ("assertion text_visible = 'Thanks' did not hold", FailureCategory::AssertionFailed),
            ("step timed out after 30s", FailureCategory::Timeout),
            ("decision service error: 529 overloaded", FailureCategory::LlmError),
            ("something odd happened", FailureCategory::Unknown),
        ];
        for (error, expected) in cases {
            assert_eq!(classifier.categorize(Some(error), &[]), expected, "{}", error);
        }
    }

    #[test]
    fn test_loop_detected_from_log() {
        let classifier = FailureClassifier::new();
        let click = AgentAction::click(Target::by_role("button", "Next"), "advance");
        let log: Vec<_> = (1..=3).map(|i| entry(i, click.clone(), None)).collect();
        assert_eq!(
            classifier.categorize(Some("Step budget exhausted after 3 actions"), &log),
            FailureCategory::StuckLoop
        );
    }

    #[test]
    fn test_loop_needs_decided_actions_without_progress() {
        let classifier = FailureClassifier::new();
        let scroll = AgentAction::click(Target::by_text("Load more"), "more rows");
        let budget = Some("Step budget exhausted after 3 action(s) without completing the goal");

        let mut progressing: Vec<_> = (1..=3).map(|i| entry(i, scroll.clone(), None)).collect();
        progressing[1].progressed = true;
        assert_eq!(classifier.categorize(budget, &progressing), FailureCategory::Timeout);

        let placeholder = AgentAction::wait(0, "no action was decided before the step failed");
        let undecided: Vec<_> = (1..=5)
            .map(|i| {
                let mut e = entry(i, placeholder.clone(), Some("Step timed out after 60s"));
                e.source = ActionSource::Undecided;
                e
            })
            .collect();
        assert_eq!(
            classifier.categorize(
                Some("Aborted after 5 consecutive failed actions; last error: Step 5 timed out after 60s"),
                &undecided
            ),
            FailureCategory::Timeout
        );
    }

    #[test]
    fn test_service_outage_reported_as_llm_error() {
        let classifier = FailureClassifier::new();
        let wait = AgentAction::wait(1_000, "Fallback: no usable decision");
        let log: Vec<_> = (1..=3)
            .map(|i| {
                let mut e = entry(i, wait.clone(), None);
                e.source = ActionSource::ServiceUnavailable;
                e
            })
            .collect();
        assert_eq!(
            classifier.categorize(
                Some("Step budget exhausted after 3 action(s) without completing the goal"),
                &log
            ),
            FailureCategory::LlmError
        );
    }

    #[test]
    fn test_falls_back_to_last_step_error() {
        let classifier = FailureClassifier::new();
        let log = vec![entry(
            1,
            AgentAction::click(Target::by_text("Ghost"), "try"),
            Some("Element not found: text 'Ghost'"),
        )];
        assert_eq!(classifier.categorize(None, &log), FailureCategory::ElementNotFound);
        assert_eq!(classifier.categorize(None, &[]), FailureCategory::Unknown);
    }

    #[test]
    fn test_deterministic() {
        let classifier = FailureClassifier::new();
        let error = Some("waiting for locator('#pay') timed out");
        let first = classifier.categorize(error, &[]);
        for _ in 0..5 {
            assert_eq!(classifier.categorize(error, &[]), first);
        }
        assert_eq!(first, FailureCategory::ElementNotFound);
    }
}
