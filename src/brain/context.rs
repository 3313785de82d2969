use std::collections::VecDeque;

use super::profile::QaProfile;
use crate::providers::Message;
use crate::storage::{CachedStep, LessonLearned};
use crate::types::action::truncate;
use crate::types::{GoalLedger, PageObservation, TestScenario};

const SYSTEM_PROMPT: &str = r#"You are an autonomous QA tester driving a web application through a browser.
Each turn you receive the current screen and must reply with exactly ONE JSON object describing the next action.

Action types: click, type, navigate, scroll, select, upload, wait, verify, api_call, screenshot, key, hover, drag, done.

Required shape:
{
  "type": "<action type>",
  "target": {"role": "...", "name": "...", "testId": "...", "text": "...", "label": "...", "placeholder": "...", "css": "..."},
  "value": "<for type/select>",
  "url": "<for navigate/api_call>",
  "reasoning": "<why this action moves the goal forward>",
  "progress": "<what has been achieved so far>",
  "blocker": "<what is in the way, if anything>",
  "expectedSignal": "<what should be visible after this action>",
  "confidence": 0.0-1.0
}

Rules:
- click, type, select, upload, hover and drag need a target that exists on the current screen.
- Prefer testId, then role+name, then label or text. Use css only as a last resort.
- Reply "done" only when every outcome of the goal is visible on screen. "done" has no target.
- Never repeat an action that just failed without changing something first.
- Output JSON only, no commentary."#;

/// Bounded record of what happened so far, rendered into each prompt.
#[derive(Debug, Clone)]
pub struct HistoryState {
    lines: VecDeque<String>,
    max_lines: usize,
    signatures: Vec<String>,
}

impl HistoryState {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            max_lines: max_lines.max(1),
            signatures: Vec::new(),
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push_back(line.into());
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
    }

    pub fn record_signature(&mut self, signature: String) {
        self.signatures.push(signature);
    }

    /// Signatures of the last `n` decided actions, oldest first.
    pub fn recent_signatures(&self, n: usize) -> Vec<String> {
        let start = self.signatures.len().saturating_sub(n);
        self.signatures[start..].to_vec()
    }

    pub fn lines(&self) -> impl Iterator<Item = &String> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Everything one decision prompt is built from.
pub struct PromptInputs<'a> {
    pub scenario: &'a TestScenario,
    pub profile: &'a QaProfile,
    pub observation: &'a PageObservation,
    pub ledger: &'a GoalLedger,
    pub history: &'a HistoryState,
    pub lessons: &'a [LessonLearned],
    pub hint: Option<&'a CachedStep>,
    pub directive: Option<&'a str>,
    pub step: usize,
    pub max_elements: usize,
    pub max_lessons: usize,
}

const MAX_API_CALLS: usize = 5;
const MAX_ERRORS: usize = 3;
const MAX_TEXT: usize = 200;

fn render_screen(out: &mut String, observation: &PageObservation, max_elements: usize) {
    out.push_str("## Current screen\n");
    out.push_str(&format!("URL: {}\nTitle: {}\n", observation.url, observation.title));
    if let Some(heading) = &observation.heading {
        out.push_str(&format!("Heading: {}\n", heading));
    }

    let (elements, elided) = observation.compact_elements(max_elements);
    out.push_str(&format!("Interactive elements ({}):\n", observation.elements.len()));
    for line in elements {
        out.push_str(&format!("- {}\n", line));
    }
    if elided > 0 {
        out.push_str(&format!("- ... {} more elements not shown\n", elided));
    }

    for toast in observation.toasts.iter().take(MAX_ERRORS) {
        out.push_str(&format!("Notification: {}\n", truncate(toast, MAX_TEXT)));
    }
    for error in observation.error_texts.iter().take(MAX_ERRORS) {
        out.push_str(&format!("Error on page: {}\n", truncate(error, MAX_TEXT)));
    }
    for error in observation.console_errors.iter().rev().take(MAX_ERRORS) {
        out.push_str(&format!("Console error: {}\n", truncate(error, MAX_TEXT)));
    }

    let calls: Vec<_> = observation.api_calls.iter().rev().take(MAX_API_CALLS).collect();
    if !calls.is_empty() {
        out.push_str("Recent API calls:\n");
        for call in calls.into_iter().rev() {
            out.push_str(&format!(
                "- {} {} -> {} ({}ms)\n",
                call.method, call.url, call.status, call.latency_ms
            ));
        }
    }
}

pub fn build_messages(inputs: &PromptInputs<'_>) -> Vec<Message> {
    let mut system = SYSTEM_PROMPT.to_string();
    if !inputs.profile.policy.is_empty() {
        system.push_str(&format!(
            "\n\nTesting policy ({}): {}",
            inputs.profile.name, inputs.profile.policy
        ));
    }
    let persona = inputs.scenario.persona.modifier();
    if !persona.is_empty() {
        system.push_str(&format!("\n\nPersona: {}", persona));
    }

    let mut user = String::new();
    user.push_str(&format!(
        "## Goal\n{}\n\nStep {} of {}\n\n",
        inputs.scenario.goal, inputs.step, inputs.scenario.max_actions
    ));

    user.push_str("## Outcomes\n");
    for outcome in &inputs.ledger.required_outcomes {
        let mark = if inputs.ledger.is_complete(outcome) { "x" } else { " " };
        user.push_str(&format!("[{}] {}\n", mark, outcome));
    }
    user.push_str(&format!("{}\n\n", inputs.ledger.status_line()));

    let lessons: Vec<_> = inputs.lessons.iter().rev().take(inputs.max_lessons).collect();
    if !lessons.is_empty() {
        user.push_str("## Lessons from earlier runs\n");
        for lesson in lessons.into_iter().rev() {
            user.push_str(&format!("- {}\n", truncate(&lesson.lesson, MAX_TEXT)));
        }
        user.push('\n');
    }

    if !inputs.history.is_empty() {
        user.push_str("## History\n");
        for line in inputs.history.lines() {
            user.push_str(line);
            user.push('\n');
        }
        user.push('\n');
    }

    render_screen(&mut user, inputs.observation, inputs.max_elements);

    if let Some(hint) = inputs.hint {
        user.push_str(&format!(
            "\n## Worked before on this screen\n{}\nReuse it only if it still fits what you see.\n",
            hint.action.describe()
        ));
    }

    if let Some(directive) = inputs.directive {
        user.push_str(&format!("\n## Change approach\n{}\n", directive));
    }

    user.push_str("\nReply with the next action as a single JSON object.");

    vec![Message::system(system), Message::user(user)]
}
