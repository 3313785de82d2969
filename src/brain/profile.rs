use serde::{Deserialize, Serialize};

use crate::types::{Persona, Priority, TestScenario};

/// A testing policy: how hard to look, how many opinions to ask for, and
/// how much of the goal must be observed before `done` is believed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaProfile {
    pub name: String,
    pub policy: String,
    pub consensus_samples: usize,
    pub done_completion_ratio: f32,
}

pub const PROFILE_NAMES: &[&str] = &["smoke", "regression", "exploratory", "critical_path"];

impl QaProfile {
    pub fn builtin(name: &str) -> Option<Self> {
        let (policy, samples, ratio) = match name {
            "smoke" => (
                "Take the shortest path to the goal. Do not explore side features; stop as soon as the goal is visibly met.",
                1,
                0.75,
            ),
            "regression" => (
                "Follow the goal step by step and confirm each outcome on screen before moving on.",
                1,
                0.75,
            ),
            "exploratory" => (
                "Pursue the goal but note anything surprising: broken layouts, confusing labels, slow responses, console errors.",
                1,
                0.5,
            ),
            "critical_path" => (
                "This flow must not break. Verify every outcome explicitly and prefer stable locators (test ids, roles) over text.",
                3,
                1.0,
            ),
            _ => return None,
        };
        Some(Self {
            name: name.to_string(),
            policy: policy.to_string(),
            consensus_samples: samples,
            done_completion_ratio: ratio,
        })
    }

    /// Scenario override, then the run default, then inference from
    /// priority, tags and persona.
    pub fn resolve(scenario: &TestScenario, default: Option<&str>) -> Self {
        let explicit = scenario
            .profile
            .as_deref()
            .or(default)
            .and_then(|name| {
                let profile = Self::builtin(name);
                if profile.is_none() {
                    log::warn!("Unknown QA profile '{}', inferring one instead", name);
                }
                profile
            });
        explicit.unwrap_or_else(|| Self::infer(scenario))
    }

    fn infer(scenario: &TestScenario) -> Self {
        let name = if scenario.priority == Priority::Critical {
            "critical_path"
        } else if scenario.has_tag("smoke") {
            "smoke"
        } else if scenario.has_tag("exploratory") || scenario.persona == Persona::Adversarial {
            "exploratory"
        } else {
            "regression"
        };
        Self::builtin(name).unwrap_or_else(Self::fallback)
    }

    fn fallback() -> Self {
        Self {
            name: "regression".to_string(),
            policy: String::new(),
            consensus_samples: 1,
            done_completion_ratio: 0.75,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> TestScenario {
        TestScenario::new("s1", "open settings", "https://app.test/")
    }

    #[test]
    fn test_all_names_resolve() {
        for name in PROFILE_NAMES {
            assert_eq!(QaProfile::builtin(name).unwrap().name, *name);
        }
        assert!(QaProfile::builtin("chaos").is_none());
    }

    #[test]
    fn test_resolution_order() {
        let mut s = scenario();
        assert_eq!(QaProfile::resolve(&s, None).name, "regression");
        assert_eq!(QaProfile::resolve(&s, Some("smoke")).name, "smoke");

        s.priority = Priority::Critical;
        assert_eq!(QaProfile::resolve(&s, None).name, "critical_path");

        s.profile = Some("exploratory".to_string());
        assert_eq!(QaProfile::resolve(&s, Some("smoke")).name, "exploratory");

        s.profile = Some("nonsense".to_string());
        assert_eq!(QaProfile::resolve(&s, None).name, "critical_path");
    }

    #[test]
    fn test_tags_infer_smoke() {
        let mut s = scenario();
        s.tags = vec!["smoke".to_string()];
        let profile = QaProfile::resolve(&s, None);
        assert_eq!(profile.name, "smoke");
        assert_eq!(profile.consensus_samples, 1);
    }
}
