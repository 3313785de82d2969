use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::brain::BrainConfig;
use crate::runner::{BatchConfig, RunnerConfig};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Anthropic,
    OpenAI,
    /// Replays `scripted_responses`; no network.
    Scripted,
}

impl ProviderKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Some(ProviderKind::Anthropic),
            "openai" => Some(ProviderKind::OpenAI),
            "scripted" => Some(ProviderKind::Scripted),
            _ => None,
        }
    }
}

/// Run configuration. Values come from an optional TOML file, then
/// environment variables override what they name. API keys only ever come
/// from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip)]
    pub openai_api_key: Option<String>,
    #[serde(skip)]
    pub anthropic_api_key: Option<String>,
    pub provider: ProviderKind,
    pub model: Option<String>,
    /// OpenAI-compatible endpoint override.
    pub llm_base_url: Option<String>,
    pub llm_timeout_secs: u64,
    pub scripted_responses: Vec<String>,
    pub driver_url: String,
    pub scenarios: PathBuf,
    pub evidence_dir: PathBuf,
    pub store_dir: PathBuf,
    pub brain: BrainConfig,
    pub runner: RunnerConfig,
    pub batch: BatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            anthropic_api_key: None,
            provider: ProviderKind::default(),
            model: None,
            llm_base_url: None,
            llm_timeout_secs: 60,
            scripted_responses: Vec::new(),
            driver_url: "http://127.0.0.1:4777".to_string(),
            scenarios: PathBuf::from("scenarios"),
            evidence_dir: PathBuf::from("qa-evidence"),
            store_dir: PathBuf::from(".autoqa"),
            brain: BrainConfig::default(),
            runner: RunnerConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env(name).and_then(|v| v.parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Reads `path` when given (it must exist), else `autoqa.toml` in the
    /// working directory when present, then applies the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from("autoqa.toml")).filter(|p| p.exists()),
        };
        let mut config = match file {
            Some(file) => {
                let text = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read config {}", file.display()))?;
                Self::from_toml(&text)
                    .with_context(|| format!("Invalid config {}", file.display()))?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn apply_env(&mut self) {
        self.openai_api_key = env("OPENAI_API_KEY");
        self.anthropic_api_key = env("ANTHROPIC_API_KEY");

        if let Some(provider) = env("AUTOQA_PROVIDER").and_then(|p| ProviderKind::from_str(&p)) {
            self.provider = provider;
        }
        if let Some(model) = env("AUTOQA_MODEL") {
            self.model = Some(model);
        }
        if let Some(url) = env("OPENAI_BASE_URL") {
            self.llm_base_url = Some(url);
        }
        if let Some(url) = env("AUTOQA_DRIVER_URL") {
            self.driver_url = url;
        }
        if let Some(url) = env("AUTOQA_BASE_URL") {
            self.runner.base_url = Some(url);
        }
        if let Some(dir) = env("AUTOQA_EVIDENCE_DIR") {
            self.evidence_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env("AUTOQA_STORE_DIR") {
            self.store_dir = PathBuf::from(dir);
        }
        if let Some(profile) = env("AUTOQA_PROFILE") {
            self.brain.default_profile = Some(profile);
        }
        if let Some(retries) = env_parse("AUTOQA_MAX_RETRIES") {
            self.batch.max_retries = retries;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.brain.consensus_samples == 0 {
            bail!("brain.consensus_samples must be at least 1");
        }
        if self.brain.stuck_threshold == 0 {
            bail!("brain.stuck_threshold must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.brain.done_budget_ratio) {
            bail!("brain.done_budget_ratio must be within [0, 1]");
        }
        if self.runner.step_timeout_secs == 0 {
            bail!("runner.step_timeout_secs must be at least 1");
        }
        Ok(())
    }

    /// API key for the configured provider, if one is needed and present.
    pub fn api_key(&self) -> Option<&str> {
        match self.provider {
            ProviderKind::Anthropic => self.anthropic_api_key.as_deref(),
            ProviderKind::OpenAI => self.openai_api_key.as_deref(),
            ProviderKind::Scripted => None,
        }
    }
}
