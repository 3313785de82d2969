pub mod remote;

pub use remote::{RemoteDriver, RemoteDriverConfig};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::{AgentAction, Assertion, ExecutionOutcome, PageObservation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: u16,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub passed: bool,
    #[serde(default)]
    pub actual: Option<String>,
}

/// The browser/DOM driver the orchestration core talks to.
///
/// One executor instance owns one target-application session; it is never
/// shared across concurrently running scenarios. An operation the runner
/// stopped waiting for (step timeout) may still complete on the driver side,
/// so implementations must key any artifacts they write by the label or
/// step they were given, never by "the current step".
#[async_trait]
pub trait Executor: Send + Sync {
    async fn observe(&self) -> Result<PageObservation>;

    async fn execute(&self, action: &AgentAction) -> Result<ExecutionOutcome>;

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    async fn take_screenshot(&self, label: &str) -> Result<PathBuf>;

    async fn api_call(
        &self,
        method: &str,
        endpoint: &str,
        body: Option<&Value>,
        headers: &HashMap<String, String>,
    ) -> Result<ApiResponse>;

    async fn verify(&self, assertion: &Assertion) -> Result<VerifyOutcome>;

    async fn save_network_log(&self, scenario_id: &str) -> Result<Option<PathBuf>>;

    async fn run_script(&self, _source: &str) -> Result<Value> {
        anyhow::bail!("script execution is not supported by this executor")
    }

    /// False once the page or session is gone.
    async fn is_open(&self) -> bool {
        true
    }
}
