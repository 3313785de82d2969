pub mod cache;
pub mod categorize;
pub mod consensus;
pub mod context;
pub mod critic;
pub mod ledger;
pub mod parser;
pub mod profile;
pub mod retry;
pub mod stuck;

pub use categorize::FailureClassifier;
pub use parser::{parse_action, ActionParseError};
pub use profile::QaProfile;
pub use retry::{DecisionError, RetryPolicy};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use self::cache::CacheState;
use self::consensus::ScoringContext;
use self::context::{HistoryState, PromptInputs};
use self::critic::StepRecord;
use self::ledger::GoalLedgerState;
use self::stuck::{ScreenSignature, StuckDetector, StuckVerdict};
use crate::providers::{DecisionService, Message};
use crate::storage::{CachedStep, LessonLearned, MemoryStore};
use crate::types::action::truncate;
use crate::types::{
    ActionKind, ActionLogEntry, ActionSource, AgentAction, ExecutionOutcome, FailureCategory,
    GoalLedger, PageObservation, PerceptionEntry, ScrollDirection, Target, TestScenario,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainConfig {
    /// Interactive elements rendered into one prompt.
    pub max_elements: usize,
    pub history_lines: usize,
    pub max_lessons_in_prompt: usize,
    /// Lessons kept per scenario in the memory store.
    pub lessons_keep: usize,
    pub stuck_threshold: u32,
    pub max_replans: u32,
    pub decision_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub decision_timeout_secs: u64,
    /// Wall-clock cap on one decision, retries and consensus included.
    pub decision_deadline_secs: u64,
    /// Candidates requested when uncertainty triggers consensus. 1 disables it.
    pub consensus_samples: usize,
    pub low_confidence_threshold: f32,
    pub low_confidence_streak: u32,
    pub critic_interval: usize,
    pub critic_window: usize,
    /// Share of the step budget after which `done` is accepted regardless.
    pub done_budget_ratio: f32,
    pub fallback_wait_ms: u64,
    pub default_profile: Option<String>,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            max_elements: 60,
            history_lines: 40,
            max_lessons_in_prompt: 5,
            lessons_keep: 20,
            stuck_threshold: 3,
            max_replans: 2,
            decision_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            decision_timeout_secs: 20,
            decision_deadline_secs: 40,
            consensus_samples: 3,
            low_confidence_threshold: 0.4,
            low_confidence_streak: 2,
            critic_interval: 5,
            critic_window: 4,
            done_budget_ratio: 0.9,
            fallback_wait_ms: 1_000,
            default_profile: None,
        }
    }
}

impl BrainConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.decision_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// One message exchanged with the decision service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub step: usize,
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// What `record_result` learned about a step, for the action log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordedStep {
    pub source: ActionSource,
    pub progressed: bool,
}

/// The decided-but-not-yet-recorded step.
#[derive(Debug, Clone)]
struct PendingStep {
    step: usize,
    action: AgentAction,
    source: ActionSource,
    observation: PageObservation,
    cache_signature: String,
}

/// Roles worth clicking when the brain has to choose on its own.
const CLICKABLE_ROLES: &[&str] = &[
    "button", "link", "tab", "menuitem", "checkbox", "radio", "option", "switch",
];

/// Never clicked by a local fallback.
const DESTRUCTIVE_WORDS: &[&str] = &[
    "delete", "remove", "logout", "log out", "sign out", "cancel", "deactivate", "destroy",
];

const SCROLL_STEP_PX: u32 = 600;

/// Per-scenario decision state machine: prompt assembly, retries, parsing,
/// consensus, goal tracking, stuck handling, caching and lessons.
///
/// One instance serves one scenario at a time. `decide_action` never fails;
/// when the decision service is unusable it degrades to a local fallback.
pub struct DecisionBrain {
    service: Arc<dyn DecisionService>,
    store: Arc<dyn MemoryStore>,
    config: BrainConfig,
    decision_deadline: Duration,
    classifier: FailureClassifier,

    scenario: TestScenario,
    profile: QaProfile,
    step: usize,
    ledger: GoalLedgerState,
    history: HistoryState,
    records: Vec<StepRecord>,
    stuck: StuckDetector,
    cache: CacheState,
    lessons: Vec<LessonLearned>,
    new_lessons: Vec<LessonLearned>,
    perception: Vec<PerceptionEntry>,
    transcript: Vec<ConversationTurn>,
    pending: Option<PendingStep>,
    replan_reason: Option<String>,
    expected_signal: Option<String>,
    low_confidence_run: u32,
}

impl DecisionBrain {
    pub fn new(
        service: Arc<dyn DecisionService>,
        store: Arc<dyn MemoryStore>,
        config: BrainConfig,
    ) -> Self {
        let scenario = TestScenario::new("", "", "");
        let profile = QaProfile::resolve(&scenario, config.default_profile.as_deref());
        Self {
            service,
            store,
            decision_deadline: Duration::from_secs(config.decision_deadline_secs.max(1)),
            classifier: FailureClassifier::new(),
            ledger: GoalLedgerState::new(""),
            history: HistoryState::new(config.history_lines),
            stuck: StuckDetector::new(config.stuck_threshold, config.max_replans),
            scenario,
            profile,
            step: 0,
            records: Vec::new(),
            cache: CacheState::default(),
            lessons: Vec::new(),
            new_lessons: Vec::new(),
            perception: Vec::new(),
            transcript: Vec::new(),
            pending: None,
            replan_reason: None,
            expected_signal: None,
            low_confidence_run: 0,
            config,
        }
    }

    /// Resets all per-scenario state and loads cache and lessons for it.
    /// Store failures are logged; the scenario then starts without memory.
    pub async fn init_scenario(&mut self, scenario: &TestScenario) {
        self.scenario = scenario.clone();
        self.profile = QaProfile::resolve(scenario, self.config.default_profile.as_deref());
        self.step = 0;
        self.ledger = GoalLedgerState::new(&scenario.goal);
        self.history = HistoryState::new(self.config.history_lines);
        self.records.clear();
        self.stuck = StuckDetector::new(self.config.stuck_threshold, self.config.max_replans);
        self.new_lessons.clear();
        self.perception.clear();
        self.transcript.clear();
        self.pending = None;
        self.replan_reason = None;
        self.expected_signal = None;
        self.low_confidence_run = 0;

        let cached = match self.store.load_cache(&scenario.id).await {
            Ok(cached) => cached,
            Err(e) => {
                log::warn!("Failed to load action cache for {}: {}", scenario.id, e);
                None
            }
        };
        self.cache = CacheState::new(cached);
        self.lessons = match self.store.load_lessons(&scenario.id).await {
            Ok(lessons) => lessons,
            Err(e) => {
                log::warn!("Failed to load lessons for {}: {}", scenario.id, e);
                Vec::new()
            }
        };

        log::info!(
            "Scenario {} initialised: profile {}, {} outcome(s), {} lesson(s)",
            scenario.id,
            self.profile.name,
            self.ledger.ledger().required_outcomes.len(),
            self.lessons.len()
        );
    }

    pub fn profile(&self) -> &QaProfile {
        &self.profile
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn ledger(&self) -> &GoalLedger {
        self.ledger.ledger()
    }

    pub fn perception_log(&self) -> &[PerceptionEntry] {
        &self.perception
    }

    pub fn transcript(&self) -> &[ConversationTurn] {
        &self.transcript
    }

    pub fn history(&self) -> &HistoryState {
        &self.history
    }

    /// Lowers the decision deadline so a decision always ends inside `limit`.
    pub fn limit_decision_time(&mut self, limit: Duration) {
        self.decision_deadline = self.decision_deadline.min(limit);
    }

    pub fn decision_deadline(&self) -> Duration {
        self.decision_deadline
    }

    /// The action decided for the current step, if it has not been recorded yet.
    pub fn pending_action(&self) -> Option<&AgentAction> {
        self.pending.as_ref().map(|p| &p.action)
    }

    /// Chooses the next action for `observation`.
    pub async fn decide_action(&mut self, observation: &PageObservation) -> AgentAction {
        self.step += 1;
        let step = self.step;
        let mut confusion = Vec::new();

        let verdict = self.stuck.observe(ScreenSignature::of(observation));
        if verdict.is_repeat() {
            self.ledger.bump_stuck();
            confusion.push(format!(
                "same screen {} time(s) in a row",
                self.stuck.same_screen_count()
            ));
        }
        if observation.has_errors() {
            confusion.push("errors visible on screen".to_string());
        }

        if let Some(expected) = self.expected_signal.take() {
            if !expectation_met(&expected, observation) {
                self.history.push(format!(
                    "Note: expected \"{}\" after the last action but it is not visible",
                    truncate(&expected, 120)
                ));
                confusion.push("expected signal missing".to_string());
            }
        }

        let cache_signature =
            cache::screen_signature(&self.scenario.id, &self.scenario.goal, observation);
        let hint = self.cache.hint_for(&cache_signature).cloned();
        if verdict.is_repeat() && self.cache.was_tried(&cache_signature) {
            log::debug!("Cached action for step {} already replayed without effect", step);
        }

        let mut directive = self.replan_reason.take();
        match verdict {
            StuckVerdict::Replan(count) => {
                directive = Some(format!(
                    "The screen has not changed for {} steps. Your recent actions are not working; pick a different element, scroll, or navigate elsewhere.",
                    count
                ));
            }
            StuckVerdict::Fallback(count) => {
                let reason = format!("screen unchanged for {} steps after replanning", count);
                log::info!("Step {}: {}, choosing locally", step, reason);
                let action = self.diversified_fallback(observation, &cache_signature, &reason);
                return self.commit(
                    step,
                    observation,
                    (action, ActionSource::Local),
                    cache_signature,
                    hint,
                    confusion,
                );
            }
            StuckVerdict::Fresh | StuckVerdict::Repeated(_) => {}
        }

        let messages = context::build_messages(&PromptInputs {
            scenario: &self.scenario,
            profile: &self.profile,
            observation,
            ledger: self.ledger.ledger(),
            history: &self.history,
            lessons: &self.lessons,
            hint: hint.as_ref(),
            directive: directive.as_deref(),
            step,
            max_elements: self.config.max_elements,
            max_lessons: self.config.max_lessons_in_prompt,
        });
        if let Some(prompt) = messages.last() {
            self.push_turn(step, "user", prompt.content.clone());
        }

        let deadline = self.decision_deadline;
        let decided =
            match tokio::time::timeout(deadline, self.consult(step, messages, observation)).await {
                Ok(result) => result,
                Err(_) => Err(DecisionError::Deadline(deadline)),
            };
        let decided = match decided {
            Ok(action) => (action, ActionSource::Service),
            Err(e) => {
                log::warn!("Step {}: decision failed, falling back: {}", step, e);
                self.history
                    .push(format!("Step {}: decision service unusable ({})", step, e));
                confusion.push("decision service unavailable".to_string());
                let wait = AgentAction::wait(
                    self.config.fallback_wait_ms,
                    format!("Fallback: no usable decision ({}); waiting before retrying", e),
                )
                .with_confidence(0.1);
                (wait, ActionSource::ServiceUnavailable)
            }
        };

        let decided = self.gate_done(step, decided, observation, &cache_signature, &mut confusion);
        self.commit(step, observation, decided, cache_signature, hint, confusion)
    }

    /// Records what happened to the action returned by the last `decide_action`.
    pub fn record_result(
        &mut self,
        action: &AgentAction,
        outcome: &ExecutionOutcome,
        duration: Duration,
    ) -> RecordedStep {
        let Some(pending) = self.pending.take() else {
            log::warn!("record_result called without a decided step");
            return RecordedStep::default();
        };
        let step = pending.step;

        let completed = self.ledger.apply_step(&pending.observation, outcome.success);
        let progressed = !completed.is_empty();
        if let Some(entry) = self.perception.iter_mut().rev().find(|p| p.step == step) {
            entry.progress_made = progressed;
        }

        let status = match &outcome.error {
            None if outcome.success => "OK".to_string(),
            Some(error) => format!("FAILED: {}", truncate(error, 160)),
            None => "FAILED".to_string(),
        };
        self.history.push(format!(
            "Step {}: {} -> {} ({}ms)",
            step,
            action.describe(),
            status,
            duration.as_millis()
        ));
        if progressed {
            self.history
                .push(format!("Progress: completed {}", completed.join("; ")));
        }

        self.records.push(StepRecord {
            step,
            signature: action.signature(),
            success: outcome.success,
            progressed,
        });

        if outcome.success {
            self.cache
                .record_success(&pending.cache_signature, &pending.observation.url, action);
        } else if let Some(error) = &outcome.error {
            let lesson = lesson_from_failure(action, error, &pending.observation.url);
            if !self.new_lessons.iter().any(|l| l.lesson == lesson) {
                self.new_lessons.push(LessonLearned {
                    scenario_id: self.scenario.id.clone(),
                    lesson,
                    step,
                    recorded_at: Utc::now(),
                });
            }
        }

        let interval = self.config.critic_interval;
        if interval > 0 && step % interval == 0 {
            if let Some(reason) = critic::critique(&self.records, self.config.critic_window) {
                log::info!("Critic at step {}: {}", step, reason);
                self.replan_reason = Some(reason);
            }
        }

        RecordedStep {
            source: pending.source,
            progressed,
        }
    }

    /// Keeps step numbering aligned when a step was cut off before its
    /// action could be recorded normally.
    pub fn abandon_step(&mut self, step: usize, reason: &str) {
        self.pending = None;
        self.step = self.step.max(step);
        self.expected_signal = None;
        self.history.push(format!("Step {}: abandoned ({})", step, reason));
        self.records.push(StepRecord {
            step,
            signature: "abandoned".to_string(),
            success: false,
            progressed: false,
        });
    }

    /// Persists what this run learned: the action sequence when it passed,
    /// lessons from failures either way.
    pub async fn finalize_scenario(&mut self, passed: bool) -> Result<()> {
        let id = self.scenario.id.clone();
        let cache = std::mem::take(&mut self.cache);
        if passed {
            if let Some(sequence) = cache.into_sequence(&id) {
                self.store.save_cache(&sequence).await?;
                log::info!("Cached {} step(s) for {}", sequence.steps.len(), id);
            }
        }
        if !self.new_lessons.is_empty() {
            self.store
                .append_lessons(&id, &self.new_lessons, self.config.lessons_keep)
                .await?;
        }
        Ok(())
    }

    pub fn categorize_failure(
        &self,
        error: Option<&str>,
        action_log: &[ActionLogEntry],
    ) -> FailureCategory {
        self.classifier.categorize(error, action_log)
    }

    fn push_turn(&mut self, step: usize, role: &str, content: String) {
        self.transcript.push(ConversationTurn {
            step,
            role: role.to_string(),
            content,
            timestamp: Utc::now(),
        });
    }

    fn sample_count(&self) -> usize {
        if self.profile.consensus_samples > 1 {
            return self.profile.consensus_samples;
        }
        let ledger = self.ledger.ledger();
        let pending = ledger.required_outcomes.len() - ledger.completed_outcomes.len();
        let uncertain = self.low_confidence_run >= self.config.low_confidence_streak;
        let nearly_done = ledger.required_outcomes.len() > 1
            && !ledger.completed_outcomes.is_empty()
            && pending == 1;
        if uncertain || nearly_done {
            self.config.consensus_samples.max(1)
        } else {
            1
        }
    }

    async fn consult(
        &mut self,
        step: usize,
        messages: Vec<Message>,
        observation: &PageObservation,
    ) -> Result<AgentAction, DecisionError> {
        let samples = self.sample_count();
        let policy = self.config.retry_policy();
        let timeout = Duration::from_secs(self.config.decision_timeout_secs);

        if samples <= 1 {
            let (result, raw) =
                request_candidate(self.service.as_ref(), messages, &policy, timeout).await;
            for response in raw {
                self.push_turn(step, "assistant", response);
            }
            return result;
        }

        let requests = (0..samples).map(|_| {
            request_candidate(self.service.as_ref(), messages.clone(), &policy, timeout)
        });
        let outcomes = futures::future::join_all(requests).await;

        let mut candidates = Vec::new();
        let mut first_error = None;
        for (result, raw) in outcomes {
            for response in raw {
                self.push_turn(step, "assistant", response);
            }
            match result {
                Ok(action) => candidates.push(action),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        let recent = self.history.recent_signatures(8);
        let pending_keywords = self.ledger.pending_keywords();
        let ctx = ScoringContext {
            observation,
            recent_signatures: &recent,
            pending_keywords: &pending_keywords,
        };
        match consensus::select_best(&candidates, &ctx) {
            Some((index, score)) => {
                log::info!(
                    "Step {}: consensus picked candidate {} of {} ({}) with score {:.2}",
                    step,
                    index + 1,
                    candidates.len(),
                    candidates[index].signature(),
                    score
                );
                Ok(candidates.swap_remove(index))
            }
            None => Err(first_error.unwrap_or_else(|| {
                DecisionError::Service("no candidates returned".to_string())
            })),
        }
    }

    /// Accepts `done` only when the goal is mostly observed or the budget is
    /// nearly spent; otherwise substitutes a corrective action.
    fn gate_done(
        &mut self,
        step: usize,
        decided: (AgentAction, ActionSource),
        observation: &PageObservation,
        cache_signature: &str,
        confusion: &mut Vec<String>,
    ) -> (AgentAction, ActionSource) {
        if !decided.0.is_done() {
            return decided;
        }
        let (completed, required) = self.ledger.projected_completion(observation);
        let ratio = completed as f32 / required.max(1) as f32;
        let budget_used = step as f32 / self.scenario.max_actions.max(1) as f32;
        if (completed >= 1 && ratio >= self.profile.done_completion_ratio)
            || budget_used >= self.config.done_budget_ratio
        {
            return decided;
        }

        let pending: Vec<String> = self.ledger.ledger().pending_outcomes().cloned().collect();
        let reason = format!(
            "Rejected done at step {}: {}/{} outcomes observed, still pending: {}",
            step,
            completed,
            required,
            pending.join("; ")
        );
        log::info!("{}", reason);
        self.history.push(reason.clone());
        confusion.push("premature done".to_string());
        let action = self.diversified_fallback(observation, cache_signature, &reason);
        (action, ActionSource::Local)
    }

    /// Local choice that differs from recent behaviour: an untried cached
    /// step, else an enabled element not clicked recently (goal-related first),
    /// else scrolling, else waiting.
    fn diversified_fallback(
        &mut self,
        observation: &PageObservation,
        cache_signature: &str,
        reason: &str,
    ) -> AgentAction {
        let recent = self.history.recent_signatures(8);

        if let Some(step) = self.cache.untried_hint(cache_signature, &recent) {
            let CachedStep { action, .. } = step.clone();
            self.cache.mark_tried(cache_signature);
            let mut action = action;
            action.reasoning = format!("Replaying an action that worked before ({})", reason);
            return action.with_confidence(0.4);
        }

        let pending = self.ledger.pending_keywords();
        let mut candidates: Vec<(usize, usize, AgentAction)> = observation
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.disabled && CLICKABLE_ROLES.contains(&e.role.as_str()))
            .filter(|(_, e)| !e.name.trim().is_empty())
            .filter(|(_, e)| {
                let name = e.name.to_lowercase();
                !DESTRUCTIVE_WORDS.iter().any(|w| name.contains(w))
            })
            .map(|(index, e)| {
                let target = match &e.test_id {
                    Some(test_id) => Target::by_test_id(test_id.clone()),
                    None => Target::by_role(e.role.clone(), e.name.clone()),
                };
                let name_words = ledger::keywords(&e.name);
                let overlap = pending.iter().filter(|k| name_words.contains(k)).count();
                (
                    overlap,
                    index,
                    AgentAction::click(target, format!("Trying an unexplored element ({})", reason)),
                )
            })
            .filter(|(_, _, action)| !recent.contains(&action.signature()))
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        if let Some((_, _, action)) = candidates.into_iter().next() {
            return action
                .with_expected_signal("the screen changes")
                .with_confidence(0.3);
        }

        let viewport = &observation.viewport;
        let more_below = viewport.scroll_y + (viewport.height as f64) < viewport.scroll_height;
        let scroll = AgentAction::new(
            ActionKind::Scroll {
                direction: ScrollDirection::Down,
                amount: Some(SCROLL_STEP_PX),
            },
            format!("Scrolling to reveal more of the page ({})", reason),
        );
        if more_below && !recent.iter().rev().take(2).any(|s| *s == scroll.signature()) {
            return scroll.with_confidence(0.3);
        }

        AgentAction::wait(
            self.config.fallback_wait_ms,
            format!("Nothing new to try, waiting for the page ({})", reason),
        )
        .with_confidence(0.2)
    }

    fn commit(
        &mut self,
        step: usize,
        observation: &PageObservation,
        (action, source): (AgentAction, ActionSource),
        cache_signature: String,
        hint: Option<CachedStep>,
        mut confusion: Vec<String>,
    ) -> AgentAction {
        if let Some(hint) = hint {
            if hint.action.signature() == action.signature() {
                self.cache.mark_tried(&cache_signature);
            }
        }

        if action.confidence < self.config.low_confidence_threshold {
            self.low_confidence_run += 1;
            confusion.push("low confidence".to_string());
        } else {
            self.low_confidence_run = 0;
        }

        self.history.record_signature(action.signature());
        self.perception.push(PerceptionEntry {
            step,
            url: observation.url.clone(),
            confidence: action.confidence,
            confusion_signals: confusion,
            progress_made: false,
        });
        let signal = action.expected_signal.trim();
        self.expected_signal = (!signal.is_empty()).then(|| signal.to_string());
        self.pending = Some(PendingStep {
            step,
            action: action.clone(),
            source,
            observation: observation.clone(),
            cache_signature,
        });
        action
    }
}

/// Asks the service for one action, retrying service errors with backoff and
/// answering parse errors with corrective feedback. Returns every raw
/// response alongside the result.
async fn request_candidate(
    service: &dyn DecisionService,
    mut messages: Vec<Message>,
    policy: &RetryPolicy,
    timeout: Duration,
) -> (Result<AgentAction, DecisionError>, Vec<String>) {
    let mut raw_responses = Vec::new();
    let mut last_error = None;

    for attempt in 1..=policy.attempts() {
        let error = match tokio::time::timeout(timeout, service.propose(messages.clone())).await {
            Err(_) => DecisionError::Timeout(timeout),
            Ok(Err(e)) => DecisionError::Service(e.to_string()),
            Ok(Ok(raw)) => match parse_action(&raw) {
                Ok(action) => {
                    raw_responses.push(raw);
                    return (Ok(action), raw_responses);
                }
                Err(parse_error) => {
                    messages.push(Message::assistant(raw.clone()));
                    messages.push(Message::user(format!(
                        "That reply was rejected: {}. Reply with exactly one valid JSON action.",
                        parse_error
                    )));
                    raw_responses.push(raw);
                    DecisionError::Parse(parse_error)
                }
            },
        };

        log::debug!(
            "Decision attempt {}/{} via {} failed: {}",
            attempt,
            policy.attempts(),
            service.name(),
            error
        );
        let backoff = error.needs_backoff();
        last_error = Some(error);
        if backoff && attempt < policy.attempts() {
            tokio::time::sleep(policy.delay_after(attempt)).await;
        }
    }

    let last = last_error.unwrap_or_else(|| DecisionError::Service("no attempt made".to_string()));
    (
        Err(DecisionError::Exhausted {
            attempts: policy.attempts(),
            last: Box::new(last),
        }),
        raw_responses,
    )
}

/// At least half of the expected signal's keywords are on screen.
fn expectation_met(expected: &str, observation: &PageObservation) -> bool {
    let words = ledger::keywords(expected);
    if words.is_empty() {
        return true;
    }
    let screen = ledger::ScreenText::new(observation);
    let hits = words.iter().filter(|w| screen.contains(w)).count();
    hits * 2 >= words.len()
}

fn lesson_from_failure(action: &AgentAction, error: &str, url: &str) -> String {
    let place = url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let target = action
        .target
        .as_ref()
        .map(Target::describe)
        .unwrap_or_else(|| action.type_name().to_string());
    let lowered = error.to_lowercase();
    if lowered.contains("not found") || lowered.contains("no element") {
        format!(
            "On {}, {} could not be found; locate it by another role or label, or scroll first",
            place, target
        )
    } else if lowered.contains("disabled") || lowered.contains("not enabled") {
        format!(
            "On {}, {} was disabled; complete the required inputs before using it",
            place, target
        )
    } else {
        format!(
            "On {}, {} failed: {}",
            place,
            action.signature(),
            truncate(error, 120)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InteractiveElement;

    #[test]
    fn test_expectation_met() {
        let obs = PageObservation::new("https://app.test/orders", "Orders")
            .with_heading("Order confirmed");
        assert!(expectation_met("order confirmation is shown", &obs));
        assert!(!expectation_met("payment receipt emailed", &obs));
        assert!(expectation_met("", &obs));
    }

    #[test]
    fn test_lesson_wording() {
        let click = AgentAction::click(Target::by_role("button", "Pay"), "pay");
        let lesson = lesson_from_failure(
            &click,
            "Element not found: button 'Pay'",
            "https://shop.test/checkout?step=2",
        );
        assert_eq!(
            lesson,
            "On /checkout, button 'Pay' could not be found; locate it by another role or label, or scroll first"
        );
        let lesson = lesson_from_failure(&click, "element is disabled", "/checkout");
        assert!(lesson.contains("was disabled"));
    }

    #[test]
    fn test_config_defaults_retry_policy() {
        let config = BrainConfig::default();
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_after(2), Duration::from_millis(1_000));
    }

    #[test]
    fn test_clickable_roles_cover_common_controls() {
        let element = InteractiveElement::new("button", "Next");
        assert!(CLICKABLE_ROLES.contains(&element.role.as_str()));
    }
}
