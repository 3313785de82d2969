use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::action::Assertion;
use super::ScenarioId;

/// A natural-language test case. Read-only once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestScenario {
    pub id: ScenarioId,
    #[serde(default)]
    pub name: String,
    pub goal: String,
    pub start_url: String,
    #[serde(default = "default_max_actions")]
    pub max_actions: usize,
    #[serde(default)]
    pub success_criteria: Vec<SuccessCriterion>,
    #[serde(default)]
    pub backend_checks: Vec<BackendCheck>,
    #[serde(default)]
    pub setup: Vec<SetupAction>,
    #[serde(default)]
    pub teardown: Vec<TeardownAction>,
    #[serde(default)]
    pub persona: Persona,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_max_actions() -> usize {
    25
}

fn default_weight() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessCriterion {
    pub description: String,
    pub assertion: Assertion,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

/// A request against the application's backend whose response is judged
/// independently of the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendCheck {
    pub name: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub endpoint: String,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub expect_status: Option<u16>,
    #[serde(default)]
    pub expect_body_contains: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SetupAction {
    ApiCall {
        #[serde(default = "default_method")]
        method: String,
        endpoint: String,
        #[serde(default)]
        body: Option<Value>,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    Navigate {
        url: String,
    },
    Wait {
        ms: u64,
    },
    Script {
        source: String,
    },
}

impl SetupAction {
    pub fn describe(&self) -> String {
        match self {
            SetupAction::ApiCall {
                method, endpoint, ..
            } => format!("api_call {} {}", method, endpoint),
            SetupAction::Navigate { url } => format!("navigate {}", url),
            SetupAction::Wait { ms } => format!("wait {}ms", ms),
            SetupAction::Script { source } => {
                format!("script ({} chars)", source.chars().count())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeardownAction {
    #[serde(flatten)]
    pub action: SetupAction,
    #[serde(default)]
    pub run_on_failure: bool,
}

/// Who the agent pretends to be while exploring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    #[default]
    Default,
    Novice,
    PowerUser,
    Mobile,
    Accessibility,
    Adversarial,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::Default => "default",
            Persona::Novice => "novice",
            Persona::PowerUser => "power_user",
            Persona::Mobile => "mobile",
            Persona::Accessibility => "accessibility",
            Persona::Adversarial => "adversarial",
        }
    }

    pub fn modifier(&self) -> &'static str {
        match self {
            Persona::Default => "",
            Persona::Novice => {
                "Act as a first-time user. Prefer visible labels and obvious buttons, read \
                 instructions on screen, and never rely on keyboard shortcuts."
            }
            Persona::PowerUser => {
                "Act as an experienced user. Prefer keyboard shortcuts and the most direct path, \
                 skip optional onboarding."
            }
            Persona::Mobile => {
                "Act as a user on a small touch screen. Expect collapsed menus and scroll to \
                 reveal content before concluding it is missing."
            }
            Persona::Accessibility => {
                "Act as a keyboard and screen-reader user. Locate elements by role and \
                 accessible name only, and report controls that have no accessible name."
            }
            Persona::Adversarial => {
                "Act as a careless or hostile user. Try empty, overlong and malformed inputs \
                 and double submissions, and note how the application reacts."
            }
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "critical" | "p0" => Some(Priority::Critical),
            "high" | "p1" => Some(Priority::High),
            "medium" | "p2" => Some(Priority::Medium),
            "low" | "p3" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl TestScenario {
    pub fn new(
        id: impl Into<String>,
        goal: impl Into<String>,
        start_url: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            goal: goal.into(),
            start_url: start_url.into(),
            max_actions: default_max_actions(),
            success_criteria: Vec::new(),
            backend_checks: Vec::new(),
            setup: Vec::new(),
            teardown: Vec::new(),
            persona: Persona::Default,
            profile: None,
            priority: Priority::Medium,
            category: None,
            tags: Vec::new(),
        }
    }

    pub fn with_max_actions(mut self, max_actions: usize) -> Self {
        self.max_actions = max_actions;
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_from_yaml() {
        let yaml = r#"
id: login-happy-path
goal: Log in as alice and verify the dashboard is visible
startUrl: /login
maxActions: 12
priority: high
tags: [auth, smoke]
setup:
  - type: api_call
    method: POST
    endpoint: /api/test/reset
teardown:
  - type: api_call
    endpoint: /api/test/cleanup
    runOnFailure: true
successCriteria:
  - description: dashboard heading shown
    assertion:
      kind: text_visible
      expected: Dashboard
"#;
        let scenario: TestScenario = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(scenario.max_actions, 12);
        assert_eq!(scenario.priority, Priority::High);
        assert!(scenario.has_tag("SMOKE"));
        assert_eq!(scenario.setup.len(), 1);
        assert!(scenario.teardown[0].run_on_failure);
        assert_eq!(scenario.success_criteria[0].weight, 1.0);
        assert_eq!(scenario.persona, Persona::Default);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical < Priority::Low);
        assert_eq!(Priority::from_str("P1"), Some(Priority::High));
        assert_eq!(Priority::from_str("urgent"), None);
    }
}
