use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::observation::InteractiveElement;

/// One decided interaction. Exactly one `kind` per instance; `Done` is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAction {
    #[serde(flatten)]
    pub kind: ActionKind,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocker: Option<String>,
    #[serde(default)]
    pub expected_signal: String,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    Type {
        value: String,
    },
    Navigate {
        url: String,
    },
    Scroll {
        direction: ScrollDirection,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount: Option<u32>,
    },
    Select {
        value: String,
    },
    Upload {
        files: Vec<String>,
    },
    Wait {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ms: Option<u64>,
        #[serde(default, rename = "waitFor", skip_serializing_if = "Option::is_none")]
        wait_for: Option<String>,
    },
    Verify {
        assertion: Assertion,
    },
    ApiCall {
        method: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
    Screenshot {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    Key {
        key: String,
    },
    Hover,
    Drag {
        #[serde(rename = "dragTo")]
        drag_to: Target,
    },
    Done,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Type { .. } => "type",
            ActionKind::Navigate { .. } => "navigate",
            ActionKind::Scroll { .. } => "scroll",
            ActionKind::Select { .. } => "select",
            ActionKind::Upload { .. } => "upload",
            ActionKind::Wait { .. } => "wait",
            ActionKind::Verify { .. } => "verify",
            ActionKind::ApiCall { .. } => "api_call",
            ActionKind::Screenshot { .. } => "screenshot",
            ActionKind::Key { .. } => "key",
            ActionKind::Hover => "hover",
            ActionKind::Drag { .. } => "drag",
            ActionKind::Done => "done",
        }
    }

    /// Kinds that act on a single element and cannot run without a locator.
    pub fn requires_target(&self) -> bool {
        matches!(
            self,
            ActionKind::Click
                | ActionKind::Type { .. }
                | ActionKind::Select { .. }
                | ActionKind::Upload { .. }
                | ActionKind::Hover
                | ActionKind::Drag { .. }
        )
    }

    fn payload_summary(&self) -> Option<String> {
        match self {
            ActionKind::Type { value } | ActionKind::Select { value } => {
                Some(format!("\"{}\"", value))
            }
            ActionKind::Navigate { url } => Some(url.clone()),
            ActionKind::Scroll { direction, amount } => Some(match amount {
                Some(px) => format!("{} {}px", direction.as_str(), px),
                None => direction.as_str().to_string(),
            }),
            ActionKind::Upload { files } => Some(files.join(",")),
            ActionKind::Wait { ms, wait_for } => match (wait_for, ms) {
                (Some(cond), _) => Some(cond.clone()),
                (None, Some(ms)) => Some(format!("{}ms", ms)),
                (None, None) => None,
            },
            ActionKind::Verify { assertion } => Some(assertion.describe()),
            ActionKind::ApiCall { method, url, .. } => Some(format!("{} {}", method, url)),
            ActionKind::Screenshot { label } => label.clone(),
            ActionKind::Key { key } => Some(key.clone()),
            ActionKind::Drag { drag_to } => Some(format!("-> {}", drag_to.describe())),
            ActionKind::Click | ActionKind::Hover | ActionKind::Done => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
        }
    }
}

/// Ranked set of ways to locate an element. Earlier fields are preferred.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nth: Option<u32>,
}

impl Target {
    pub fn by_role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn by_test_id(test_id: impl Into<String>) -> Self {
        Self {
            test_id: Some(test_id.into()),
            ..Default::default()
        }
    }

    pub fn by_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// A target is usable when at least one locator is present.
    pub fn is_usable(&self) -> bool {
        let has_text = |field: &Option<String>| {
            field.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
        };
        has_text(&self.role)
            || has_text(&self.name)
            || has_text(&self.test_id)
            || has_text(&self.css)
            || has_text(&self.text)
            || has_text(&self.label)
            || has_text(&self.placeholder)
            || self.coordinates.is_some()
    }

    pub fn describe(&self) -> String {
        if let Some(test_id) = &self.test_id {
            return format!("[data-testid={}]", test_id);
        }
        match (&self.role, &self.name) {
            (Some(role), Some(name)) => return format!("{} '{}'", role, name),
            (None, Some(name)) => return format!("'{}'", name),
            _ => {}
        }
        if let Some(label) = &self.label {
            return format!("label '{}'", label);
        }
        if let Some(text) = &self.text {
            return format!("text '{}'", text);
        }
        if let Some(placeholder) = &self.placeholder {
            return format!("placeholder '{}'", placeholder);
        }
        if let Some(css) = &self.css {
            return css.clone();
        }
        if let Some(role) = &self.role {
            return role.clone();
        }
        if let Some((x, y)) = self.coordinates {
            return format!("@({:.0},{:.0})", x, y);
        }
        "(none)".to_string()
    }

    /// Loose match against an observed element, used to judge whether a
    /// proposed target plausibly exists on the current screen.
    pub fn matches_element(&self, element: &InteractiveElement) -> bool {
        if let (Some(wanted), Some(actual)) = (&self.test_id, &element.test_id) {
            if wanted == actual {
                return true;
            }
        }
        let name = element.name.to_lowercase();
        let name_hit = [&self.name, &self.text, &self.label, &self.placeholder]
            .into_iter()
            .flatten()
            .any(|needle| {
                let needle = needle.trim().to_lowercase();
                !needle.is_empty() && (name == needle || name.contains(&needle))
            });
        match &self.role {
            Some(role) if name_hit => role.eq_ignore_ascii_case(&element.role),
            Some(role) if self.name.is_none() && self.text.is_none() => {
                role.eq_ignore_ascii_case(&element.role)
            }
            _ => name_hit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionKind {
    TextVisible,
    ElementVisible,
    ElementHidden,
    UrlContains,
    TitleContains,
    ElementCount,
    NoErrors,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assertion {
    pub kind: AssertionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
}

impl Assertion {
    pub fn text_visible(text: impl Into<String>) -> Self {
        Self {
            kind: AssertionKind::TextVisible,
            target: None,
            expected: Some(text.into()),
        }
    }

    pub fn describe(&self) -> String {
        let kind = serde_json::to_value(self.kind)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| "custom".to_string());
        let mut out = kind;
        if let Some(target) = &self.target {
            out.push(' ');
            out.push_str(&target.describe());
        }
        if let Some(expected) = &self.expected {
            out.push_str(&format!(" = '{}'", expected));
        }
        out
    }
}

impl AgentAction {
    pub fn new(kind: ActionKind, reasoning: impl Into<String>) -> Self {
        Self {
            kind,
            reasoning: reasoning.into(),
            progress: None,
            blocker: None,
            expected_signal: String::new(),
            confidence: 0.5,
            target: None,
        }
    }

    pub fn click(target: Target, reasoning: impl Into<String>) -> Self {
        Self::new(ActionKind::Click, reasoning).with_target(target)
    }

    pub fn wait(ms: u64, reasoning: impl Into<String>) -> Self {
        Self::new(
            ActionKind::Wait {
                ms: Some(ms),
                wait_for: None,
            },
            reasoning,
        )
    }

    pub fn done(reasoning: impl Into<String>) -> Self {
        Self::new(ActionKind::Done, reasoning)
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_expected_signal(mut self, signal: impl Into<String>) -> Self {
        self.expected_signal = signal.into();
        self
    }

    pub fn is_done(&self) -> bool {
        matches!(self.kind, ActionKind::Done)
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Stable identity of an action used for repeat detection and caching.
    /// Reasoning and confidence are deliberately excluded.
    pub fn signature(&self) -> String {
        let mut parts = vec![self.kind.as_str().to_string()];
        if let Some(target) = &self.target {
            parts.push(target.describe());
        }
        if let Some(payload) = self.kind.payload_summary() {
            parts.push(payload);
        }
        parts.join(" ")
    }

    /// One-line description for history and logs.
    pub fn describe(&self) -> String {
        let mut line = self.signature();
        if !self.reasoning.is_empty() {
            line.push_str(&format!(" ({})", truncate(&self.reasoning, 80)));
        }
        line
    }

    /// Text this action contributes to keyword matching.
    pub fn keyword_text(&self) -> String {
        let mut text = format!("{} {}", self.reasoning, self.expected_signal);
        if let Some(target) = &self.target {
            text.push(' ');
            text.push_str(&target.describe());
        }
        if let Some(payload) = self.kind.payload_summary() {
            text.push(' ');
            text.push_str(&payload);
        }
        text
    }
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}
