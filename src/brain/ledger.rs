//! Goal decomposition and outcome tracking.
//!
//! A goal is split into clauses ("open the dashboard, verify widgets visible
//! and no errors"), each clause becomes a required outcome with a keyword
//! set, and an outcome completes on the first observation that contains all
//! of its keywords.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::types::{GoalLedger, PageObservation};

const LEAD_INS: &[&str] = &[
    "make sure that ",
    "make sure ",
    "verify that ",
    "verify ",
    "check that ",
    "check ",
    "ensure that ",
    "ensure ",
    "confirm that ",
    "confirm ",
    "validate that ",
    "validate ",
    "assert that ",
    "assert ",
    "see that ",
    "that ",
];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "to", "of", "in", "on", "at", "for", "with", "as", "by", "from", "into",
    "is", "are", "be", "it", "its", "and", "or", "user", "users", "page", "can", "should", "is",
    "has", "have", "was", "were", "this", "that", "their", "my", "your", "all", "up", "out",
];

/// Imperative verbs describe what to do, not what the screen should show.
const ACTION_VERBS: &[&str] = &[
    "open", "go", "navigate", "visit", "click", "press", "tap", "enter", "type", "fill", "submit",
    "use", "choose", "pick", "log", "sign", "start", "try", "view", "find", "select",
];

/// Words saying "it is on screen"; satisfied by presence of the other keywords.
const PRESENCE_QUALIFIERS: &[&str] = &[
    "visible", "shown", "show", "shows", "displayed", "display", "appear", "appears", "present",
    "loaded", "load", "loads", "rendered", "exist", "exists", "available", "seen",
];

const NEGATIONS: &[&str] = &["no ", "without ", "zero ", "not any "];

static CLAUSE_SPLITTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*(?:[,;.]|\band then\b|\bthen\b|\band\b|\balso\b)\s*").unwrap()
});

#[derive(Debug, Clone, PartialEq)]
enum OutcomeKind {
    /// All keywords must be present in the observation.
    Present(Vec<String>),
    /// Nothing matching the keywords may be shown; an empty list or an
    /// error-like subject means "the page is clean".
    Absent(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
struct Outcome {
    text: String,
    kind: OutcomeKind,
}

fn stem(word: &str) -> String {
    if word.len() > 4 && word.ends_with("ies") {
        return format!("{}y", &word[..word.len() - 3]);
    }
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Content keywords of a phrase: stopwords, imperative verbs and presence
/// qualifiers removed, stemmed, order preserved.
pub fn keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens(text)
        .filter(|t| {
            !STOPWORDS.contains(&t.as_str())
                && !ACTION_VERBS.contains(&t.as_str())
                && !PRESENCE_QUALIFIERS.contains(&t.as_str())
        })
        .map(|t| stem(&t))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn strip_lead_in(clause: &str) -> &str {
    let mut clause = clause.trim();
    loop {
        let before = clause;
        for lead in LEAD_INS {
            if let Some(rest) = clause.strip_prefix(lead) {
                clause = rest.trim_start();
            }
        }
        if clause == before {
            return clause;
        }
    }
}

/// Splits a goal into ordered, de-duplicated outcome phrases. Never empty:
/// a goal with no usable clause becomes a single outcome.
pub fn extract_outcomes(goal: &str) -> Vec<String> {
    let lowered = goal.to_lowercase();
    let mut outcomes: Vec<String> = Vec::new();
    for clause in CLAUSE_SPLITTER.split(&lowered) {
        let clause = strip_lead_in(clause);
        if clause.is_empty() {
            continue;
        }
        let negative = NEGATIONS.iter().any(|n| clause.starts_with(n));
        if !negative && keywords(clause).is_empty() {
            continue;
        }
        if !outcomes.iter().any(|o| o == clause) {
            outcomes.push(clause.to_string());
        }
    }

    if outcomes.is_empty() {
        outcomes.push(goal.trim().to_lowercase());
    }
    outcomes
}

fn classify(outcome: &str) -> Outcome {
    let negation = NEGATIONS.iter().find(|n| outcome.starts_with(*n));
    let kind = match negation {
        Some(prefix) => {
            let subject = keywords(&outcome[prefix.len()..]);
            let error_like = subject.iter().any(|k| {
                ["error", "fail", "crash", "warning"]
                    .iter()
                    .any(|prefix| k.starts_with(prefix))
            });
            if error_like {
                OutcomeKind::Absent(Vec::new())
            } else {
                OutcomeKind::Absent(subject)
            }
        }
        None => OutcomeKind::Present(keywords(outcome)),
    };
    Outcome {
        text: outcome.to_string(),
        kind,
    }
}

/// Stemmed words of one observation. Matching is by whole word, so
/// "total" is not found inside "subtotal".
pub struct ScreenText {
    words: HashSet<String>,
}

impl ScreenText {
    pub fn new(observation: &PageObservation) -> Self {
        let words = tokens(&observation.searchable_text())
            .map(|t| stem(&t))
            .collect();
        Self { words }
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.words.contains(keyword)
    }
}

/// The ledger plus the matching rules for its outcomes.
#[derive(Debug, Clone)]
pub struct GoalLedgerState {
    ledger: GoalLedger,
    outcomes: Vec<Outcome>,
}

impl GoalLedgerState {
    pub fn new(goal: &str) -> Self {
        let required = extract_outcomes(goal);
        let outcomes = required.iter().map(|o| classify(o)).collect();
        Self {
            ledger: GoalLedger {
                goal: goal.to_string(),
                required_outcomes: required,
                ..Default::default()
            },
            outcomes,
        }
    }

    pub fn ledger(&self) -> &GoalLedger {
        &self.ledger
    }

    /// Keywords of outcomes not yet completed.
    pub fn pending_keywords(&self) -> Vec<String> {
        let mut out = Vec::new();
        for outcome in &self.outcomes {
            if self.ledger.is_complete(&outcome.text) {
                continue;
            }
            if let OutcomeKind::Present(words) = &outcome.kind {
                for word in words {
                    if !out.contains(word) {
                        out.push(word.clone());
                    }
                }
            }
        }
        out
    }

    /// Pending outcomes that `observation` satisfies, in required order.
    ///
    /// Absence outcomes only count after some positive outcome is done (or
    /// when the goal has nothing else), and only when the step succeeded.
    pub fn satisfied_by(&self, observation: &PageObservation, step_succeeded: bool) -> Vec<String> {
        let screen = ScreenText::new(observation);
        let present: Vec<&Outcome> = self
            .outcomes
            .iter()
            .filter(|o| !self.ledger.is_complete(&o.text))
            .filter(|o| match &o.kind {
                OutcomeKind::Present(words) => {
                    !words.is_empty() && words.iter().all(|w| screen.contains(w))
                }
                OutcomeKind::Absent(_) => false,
            })
            .collect();

        let has_positive = self
            .outcomes
            .iter()
            .any(|o| matches!(o.kind, OutcomeKind::Present(_)));
        let positive_done = !self.ledger.completed_outcomes.is_empty() || !present.is_empty();
        let absence_allowed = step_succeeded && (positive_done || !has_positive);

        self.outcomes
            .iter()
            .filter(|o| !self.ledger.is_complete(&o.text))
            .filter(|o| match &o.kind {
                OutcomeKind::Present(_) => present.iter().any(|p| p.text == o.text),
                OutcomeKind::Absent(words) if absence_allowed => {
                    if words.is_empty() {
                        !observation.has_errors()
                    } else {
                        !words.iter().any(|w| screen.contains(w))
                    }
                }
                OutcomeKind::Absent(_) => false,
            })
            .map(|o| o.text.clone())
            .collect()
    }

    /// Completed count if the outcomes visible in `observation` were committed.
    pub fn projected_completion(&self, observation: &PageObservation) -> (usize, usize) {
        let extra = self.satisfied_by(observation, true).len();
        (
            self.ledger.completed_outcomes.len() + extra,
            self.ledger.required_outcomes.len(),
        )
    }

    /// Applies one finished step. Returns the outcomes completed by it.
    ///
    /// The stuck score resets exactly when something new completes.
    pub fn apply_step(&mut self, observation: &PageObservation, step_succeeded: bool) -> Vec<String> {
        let newly = self.satisfied_by(observation, step_succeeded);
        if newly.is_empty() {
            self.ledger.steps_since_progress += 1;
        } else {
            self.ledger.completed_outcomes.extend(newly.iter().cloned());
            self.ledger.stuck_score = 0;
            self.ledger.steps_since_progress = 0;
        }
        newly
    }

    /// Called when a step left the screen unchanged.
    pub fn bump_stuck(&mut self) {
        self.ledger.stuck_score += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InteractiveElement;

    #[test]
    fn test_extract_outcomes_splits_and_strips() {
        let outcomes = extract_outcomes("Open the dashboard, verify widgets visible and no errors");
        assert_eq!(outcomes, vec!["open the dashboard", "widgets visible", "no errors"]);
    }

    #[test]
    fn test_extract_outcomes_never_empty() {
        assert_eq!(extract_outcomes("Go."), vec!["go."]);
    }

    #[test]
    fn test_keywords_drop_verbs_and_qualifiers() {
        assert_eq!(keywords("open the dashboard"), vec!["dashboard"]);
        assert_eq!(keywords("widgets visible"), vec!["widget"]);
        assert_eq!(keywords("Search results appear"), vec!["search", "result"]);
    }

    #[test]
    fn test_outcome_completes_on_first_matching_screen() {
        let mut state = GoalLedgerState::new("Open the dashboard and verify widgets visible");
        let login = PageObservation::new("https://app.test/login", "Login");
        assert!(state.apply_step(&login, true).is_empty());

        let dash = PageObservation::new("https://app.test/dashboard", "Dashboard")
            .with_elements(vec![InteractiveElement::new("region", "Sales widget")]);
        let newly = state.apply_step(&dash, true);
        assert_eq!(newly, vec!["open the dashboard", "widgets visible"]);
        assert_eq!(state.ledger().completion_ratio(), 1.0);
    }

    #[test]
    fn test_outcome_ignores_redirect_query_and_partial_words() {
        let mut state = GoalLedgerState::new("Open the dashboard and check total shown");
        let login = PageObservation::new("https://app.test/login?next=/dashboard", "Sign in");
        assert!(state.apply_step(&login, true).is_empty());
        assert_eq!(state.projected_completion(&login), (0, 2));

        let cart = PageObservation::new("https://app.test/cart", "Cart")
            .with_heading("Subtotal $12.00");
        assert!(state.apply_step(&cart, true).is_empty());

        let dash = PageObservation::new("https://app.test/dashboard", "Overview")
            .with_heading("Order total $12.00");
        assert_eq!(
            state.apply_step(&dash, true),
            vec!["open the dashboard", "total shown"]
        );
    }

    #[test]
    fn test_absence_waits_for_positive_progress() {
        let mut state = GoalLedgerState::new("open reports and no errors");
        let clean = PageObservation::new("https://app.test/home", "Home");
        assert!(state.apply_step(&clean, true).is_empty());

        let reports = PageObservation::new("https://app.test/reports", "Reports");
        assert_eq!(
            state.apply_step(&reports, true),
            vec!["open reports", "no errors"]
        );
    }

    #[test]
    fn test_absence_blocked_by_errors() {
        let mut state = GoalLedgerState::new("open reports and no errors");
        let mut reports = PageObservation::new("https://app.test/reports", "Reports");
        reports.error_texts.push("Something went wrong".to_string());
        assert_eq!(state.apply_step(&reports, true), vec!["open reports"]);
    }

    #[test]
    fn test_stuck_score_resets_only_on_progress() {
        let mut state = GoalLedgerState::new("open billing");
        let home = PageObservation::new("https://app.test/", "Home");
        state.bump_stuck();
        state.apply_step(&home, true);
        state.bump_stuck();
        state.apply_step(&home, false);
        assert_eq!(state.ledger().stuck_score, 2);
        state.apply_step(&home, true);
        assert_eq!(state.ledger().stuck_score, 2);
        assert_eq!(state.ledger().steps_since_progress, 3);

        let billing = PageObservation::new("https://app.test/billing", "Billing");
        state.bump_stuck();
        state.apply_step(&billing, true);
        assert_eq!(state.ledger().stuck_score, 0);
        assert_eq!(state.ledger().steps_since_progress, 0);
    }

    #[test]
    fn test_pending_keywords_shrink() {
        let mut state = GoalLedgerState::new("open billing and download invoice");
        assert_eq!(state.pending_keywords(), vec!["billing", "download", "invoice"]);
        state.apply_step(&PageObservation::new("https://app.test/billing", "Billing"), true);
        assert_eq!(state.pending_keywords(), vec!["download", "invoice"]);
    }
}
