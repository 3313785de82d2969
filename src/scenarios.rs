//! Scenario catalogs on disk.
//!
//! A catalog file is YAML or JSON holding either a list of scenarios, a
//! mapping with a `scenarios` list, or a single scenario. A directory is read
//! file by file in name order.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::types::{Priority, TestScenario};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Wrapped { scenarios: Vec<TestScenario> },
    List(Vec<TestScenario>),
    Single(Box<TestScenario>),
}

impl CatalogFile {
    fn into_scenarios(self) -> Vec<TestScenario> {
        match self {
            CatalogFile::Wrapped { scenarios } | CatalogFile::List(scenarios) => scenarios,
            CatalogFile::Single(scenario) => vec![*scenario],
        }
    }
}

fn is_catalog_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml") | Some("json")
    )
}

fn parse_file(path: &Path, content: &str) -> Result<Vec<TestScenario>> {
    let catalog: CatalogFile = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(content)
            .with_context(|| format!("Invalid scenario JSON in {}", path.display()))?
    } else {
        serde_yaml::from_str(content)
            .with_context(|| format!("Invalid scenario YAML in {}", path.display()))?
    };
    Ok(catalog.into_scenarios())
}

fn validate(scenario: &TestScenario, source: &Path) -> Result<()> {
    if scenario.id.trim().is_empty() {
        bail!("Scenario with empty id in {}", source.display());
    }
    if scenario.goal.trim().is_empty() {
        bail!("Scenario '{}' has an empty goal", scenario.id);
    }
    if scenario.max_actions == 0 {
        bail!("Scenario '{}' must allow at least one action", scenario.id);
    }
    Ok(())
}

/// Loads every scenario under `path` (file or directory). Ids must be unique
/// across the whole catalog.
pub async fn load_catalog(path: &Path) -> Result<Vec<TestScenario>> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Scenario catalog not found: {}", path.display()))?;

    let files: Vec<PathBuf> = if metadata.is_dir() {
        let mut entries = tokio::fs::read_dir(path).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file = entry.path();
            if is_catalog_file(&file) {
                files.push(file);
            }
        }
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    let mut seen = HashSet::new();
    let mut scenarios = Vec::new();
    for file in files {
        let content = tokio::fs::read_to_string(&file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;
        for scenario in parse_file(&file, &content)? {
            validate(&scenario, &file)?;
            if !seen.insert(scenario.id.clone()) {
                return Err(anyhow!(
                    "Duplicate scenario id '{}' in {}",
                    scenario.id,
                    file.display()
                ));
            }
            scenarios.push(scenario);
        }
    }
    log::debug!("Loaded {} scenario(s) from {}", scenarios.len(), path.display());
    Ok(scenarios)
}

/// Selection over a catalog. Empty lists match everything; within one list
/// any entry may match, across lists all must.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioFilter {
    pub ids: Vec<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub priorities: Vec<Priority>,
}

impl ScenarioFilter {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
            && self.categories.is_empty()
            && self.tags.is_empty()
            && self.priorities.is_empty()
    }

    pub fn matches(&self, scenario: &TestScenario) -> bool {
        let id_ok = self.ids.is_empty() || self.ids.iter().any(|id| *id == scenario.id);
        let category_ok = self.categories.is_empty()
            || scenario.category.as_deref().is_some_and(|category| {
                self.categories
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(category))
            });
        let tag_ok = self.tags.is_empty() || self.tags.iter().any(|tag| scenario.has_tag(tag));
        let priority_ok =
            self.priorities.is_empty() || self.priorities.contains(&scenario.priority);
        id_ok && category_ok && tag_ok && priority_ok
    }

    /// Keeps matching scenarios, most important first. Catalog order is
    /// preserved within a priority.
    pub fn apply(&self, scenarios: Vec<TestScenario>) -> Vec<TestScenario> {
        let mut selected: Vec<TestScenario> =
            scenarios.into_iter().filter(|s| self.matches(s)).collect();
        selected.sort_by_key(|s| s.priority);
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
scenarios:
  - id: login
    goal: Log in and see the dashboard
    startUrl: /login
    priority: low
    tags: [auth, smoke]
  - id: checkout
    goal: Buy the first product
    startUrl: /shop
    priority: critical
    category: commerce
"#;

    #[tokio::test]
    async fn test_load_wrapped_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        std::fs::write(&path, CATALOG).unwrap();

        let scenarios = load_catalog(&path).await.unwrap();
        assert_eq!(scenarios.len(), 2);
        assert_eq!(scenarios[0].id, "login");
        assert_eq!(scenarios[1].priority, Priority::Critical);
    }

    #[tokio::test]
    async fn test_load_directory_mixes_formats() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            r#"{"id": "search", "goal": "Search for shoes", "startUrl": "/"}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b.yml"),
            "- id: profile\n  goal: Edit the profile name\n  startUrl: /me\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let scenarios = load_catalog(dir.path()).await.unwrap();
        let ids: Vec<&str> = scenarios.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["search", "profile"]);
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.yaml"), CATALOG).unwrap();
        std::fs::write(dir.path().join("b.yaml"), CATALOG).unwrap();

        let err = load_catalog(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("Duplicate scenario id 'login'"));
    }

    #[tokio::test]
    async fn test_empty_goal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "id: broken\ngoal: '  '\nstartUrl: /\n").unwrap();
        assert!(load_catalog(&path).await.is_err());
    }

    #[test]
    fn test_filter_combines_and_orders() {
        let scenarios = vec![
            TestScenario::new("login", "Log in", "/login"),
            {
                let mut s = TestScenario::new("checkout", "Buy", "/shop");
                s.priority = Priority::Critical;
                s.tags = vec!["smoke".to_string()];
                s
            },
            {
                let mut s = TestScenario::new("logout", "Log out", "/");
                s.tags = vec!["Smoke".to_string()];
                s
            },
        ];

        let filter = ScenarioFilter {
            tags: vec!["smoke".to_string()],
            ..Default::default()
        };
        let ids: Vec<String> = filter.apply(scenarios.clone()).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, ["checkout", "logout"]);

        let filter = ScenarioFilter {
            tags: vec!["smoke".to_string()],
            priorities: vec![Priority::Medium],
            ..Default::default()
        };
        assert_eq!(filter.apply(scenarios.clone()).len(), 1);

        assert!(ScenarioFilter::default().is_empty());
        assert_eq!(ScenarioFilter::default().apply(scenarios)[0].id, "checkout");
    }
}
