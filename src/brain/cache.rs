use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::storage::{CachedActionSequence, CachedStep};
use crate::types::{ActionKind, AgentAction, PageObservation};

/// Elements folded into the screen fingerprint.
const FINGERPRINT_ELEMENTS: usize = 12;

fn url_path(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(parsed) => format!(
            "{}{}",
            parsed.host_str().unwrap_or_default(),
            parsed.path().trim_end_matches('/')
        ),
        Err(_) => raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string(),
    }
}

/// Hash of (scenario, url path, goal, element fingerprint). Query strings and
/// element order do not change the signature.
pub fn screen_signature(scenario_id: &str, goal: &str, observation: &PageObservation) -> String {
    let mut fingerprint: Vec<String> = observation
        .elements
        .iter()
        .take(FINGERPRINT_ELEMENTS)
        .map(|e| format!("{}:{}", e.role, e.name).to_lowercase())
        .collect();
    fingerprint.sort();

    let mut hasher = Sha256::new();
    hasher.update(scenario_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(url_path(&observation.url).as_bytes());
    hasher.update(b"\n");
    hasher.update(goal.as_bytes());
    hasher.update(b"\n");
    hasher.update(fingerprint.join("|").as_bytes());
    hex::encode(hasher.finalize())
}

/// Per-run view of the action cache: what was loaded, which entries were
/// already replayed, and what this run recorded.
#[derive(Debug, Default)]
pub struct CacheState {
    loaded: Option<CachedActionSequence>,
    tried: HashSet<String>,
    recorded: Vec<CachedStep>,
}

impl CacheState {
    pub fn new(loaded: Option<CachedActionSequence>) -> Self {
        Self {
            loaded,
            ..Default::default()
        }
    }

    /// Cached step for this screen, unless it was already replayed this run.
    pub fn hint_for(&self, signature: &str) -> Option<&CachedStep> {
        if self.tried.contains(signature) {
            return None;
        }
        self.loaded.as_ref()?.find(signature)
    }

    /// Any cached step not yet replayed whose action is not in `recent`.
    pub fn untried_hint(&self, signature: &str, recent: &[String]) -> Option<&CachedStep> {
        self.hint_for(signature)
            .filter(|step| !recent.contains(&step.action.signature()))
    }

    pub fn mark_tried(&mut self, signature: &str) {
        self.tried.insert(signature.to_string());
    }

    pub fn was_tried(&self, signature: &str) -> bool {
        self.tried.contains(signature)
    }

    pub fn record_success(&mut self, signature: &str, url: &str, action: &AgentAction) {
        if matches!(
            action.kind,
            ActionKind::Done | ActionKind::Wait { .. } | ActionKind::Screenshot { .. }
        ) {
            return;
        }
        if self.recorded.iter().any(|s| s.signature == signature) {
            return;
        }
        self.recorded.push(CachedStep {
            signature: signature.to_string(),
            url: url.to_string(),
            action: action.clone(),
        });
    }

    pub fn recorded_len(&self) -> usize {
        self.recorded.len()
    }

    /// Sequence to persist after a passing run.
    pub fn into_sequence(self, scenario_id: &str) -> Option<CachedActionSequence> {
        if self.recorded.is_empty() {
            return None;
        }
        let success_count = self.loaded.map(|s| s.success_count).unwrap_or(0) + 1;
        Some(CachedActionSequence {
            scenario_id: scenario_id.to_string(),
            steps: self.recorded,
            success_count,
            recorded_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InteractiveElement, Target};

    fn dashboard(url: &str, order: &[(&str, &str)]) -> PageObservation {
        PageObservation::new(url, "Dashboard").with_elements(
            order
                .iter()
                .map(|(role, name)| InteractiveElement::new(*role, *name))
                .collect(),
        )
    }

    #[test]
    fn test_signature_ignores_query_and_element_order() {
        let a = dashboard(
            "https://app.test/dash?tab=1",
            &[("button", "Save"), ("link", "Help")],
        );
        let b = dashboard("https://app.test/dash", &[("link", "Help"), ("button", "Save")]);
        let c = dashboard("https://app.test/other", &[("button", "Save"), ("link", "Help")]);

        let sig = screen_signature("s1", "goal", &a);
        assert_eq!(sig, screen_signature("s1", "goal", &b));
        assert_ne!(sig, screen_signature("s1", "goal", &c));
        assert_ne!(sig, screen_signature("s2", "goal", &a));
        assert_eq!(sig.len(), 64);
    }

    #[test]
    fn test_hint_is_offered_once() {
        let click = AgentAction::click(Target::by_role("button", "Save"), "save");
        let mut state = CacheState::new(Some(CachedActionSequence {
            scenario_id: "s1".to_string(),
            steps: vec![CachedStep {
                signature: "sig".to_string(),
                url: "/dash".to_string(),
                action: click.clone(),
            }],
            success_count: 2,
            recorded_at: Utc::now(),
        }));

        assert!(state.hint_for("sig").is_some());
        assert!(state.untried_hint("sig", &[click.signature()]).is_none());
        state.mark_tried("sig");
        assert!(state.hint_for("sig").is_none());
        assert!(state.was_tried("sig"));
    }

    #[test]
    fn test_into_sequence_counts_successes() {
        let mut state = CacheState::new(None);
        assert!(CacheState::new(None).into_sequence("s1").is_none());

        let click = AgentAction::click(Target::by_text("Next"), "advance");
        state.record_success("sig-a", "/a", &click);
        state.record_success("sig-a", "/a", &click);
        state.record_success("sig-b", "/b", &AgentAction::done("finished"));
        assert_eq!(state.recorded_len(), 1);

        let sequence = state.into_sequence("s1").unwrap();
        assert_eq!(sequence.success_count, 1);
        assert_eq!(sequence.steps[0].signature, "sig-a");
    }
}
