use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::{ApiResponse, Executor, VerifyOutcome};
use crate::types::{AgentAction, Assertion, ExecutionOutcome, PageObservation};

#[derive(Debug, Clone)]
pub struct RemoteDriverConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub headed: bool,
    pub trace: bool,
}

impl Default for RemoteDriverConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4777".to_string(),
            request_timeout: Duration::from_secs(60),
            headed: false,
            trace: false,
        }
    }
}

/// Talks JSON over HTTP to a driver process that owns the real browser.
///
/// Every request carries the session id handed out by `open_session`, so a
/// late response for an abandoned request cannot be applied to another
/// session.
pub struct RemoteDriver {
    config: RemoteDriverConfig,
    client: reqwest::Client,
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct PathResponse {
    #[serde(default)]
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct OpenResponse {
    open: bool,
}

#[derive(Debug, Serialize)]
struct DriverRequest<'a, T: Serialize> {
    session_id: &'a str,
    #[serde(flatten)]
    payload: T,
}

impl RemoteDriver {
    /// Opens a fresh browser session on the driver.
    pub async fn open_session(config: RemoteDriverConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let url = format!("{}/session", config.base_url.trim_end_matches('/'));
        let response = client
            .post(&url)
            .json(&json!({ "headed": config.headed, "trace": config.trace }))
            .send()
            .await
            .with_context(|| format!("Driver unreachable at {}", config.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Driver refused session {}: {}", status, body));
        }

        let session: SessionResponse = response.json().await?;
        log::info!(
            "Opened driver session {} at {}",
            session.session_id,
            config.base_url
        );
        Ok(Self {
            config,
            client,
            session_id: session.session_id,
        })
    }

    pub async fn close_session(&self) -> Result<()> {
        let _: Value = self.post("close", json!({})).await?;
        Ok(())
    }

    async fn post<T: Serialize + Send, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        payload: T,
    ) -> Result<R> {
        let url = format!(
            "{}/session/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint
        );
        let request = DriverRequest {
            session_id: &self.session_id,
            payload,
        };
        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Driver {} failed ({}): {}", endpoint, status, body));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Executor for RemoteDriver {
    async fn observe(&self) -> Result<PageObservation> {
        self.post("observe", json!({})).await
    }

    async fn execute(&self, action: &AgentAction) -> Result<ExecutionOutcome> {
        self.post("execute", json!({ "action": action })).await
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let _: Value = self
            .post(
                "navigate",
                json!({ "url": url, "timeoutMs": timeout.as_millis() as u64 }),
            )
            .await?;
        Ok(())
    }

    async fn take_screenshot(&self, label: &str) -> Result<PathBuf> {
        let response: PathResponse = self.post("screenshot", json!({ "label": label })).await?;
        response
            .path
            .ok_or_else(|| anyhow!("Driver returned no screenshot path for {}", label))
    }

    async fn api_call(
        &self,
        method: &str,
        endpoint: &str,
        body: Option<&Value>,
        headers: &HashMap<String, String>,
    ) -> Result<ApiResponse> {
        self.post(
            "api",
            json!({
                "method": method,
                "endpoint": endpoint,
                "body": body,
                "headers": headers,
            }),
        )
        .await
    }

    async fn verify(&self, assertion: &Assertion) -> Result<VerifyOutcome> {
        self.post("verify", json!({ "assertion": assertion })).await
    }

    async fn save_network_log(&self, scenario_id: &str) -> Result<Option<PathBuf>> {
        let response: PathResponse = self
            .post("network-log", json!({ "scenarioId": scenario_id }))
            .await?;
        Ok(response.path)
    }

    async fn run_script(&self, source: &str) -> Result<Value> {
        self.post("script", json!({ "source": source })).await
    }

    async fn is_open(&self) -> bool {
        match self.post::<_, OpenResponse>("status", json!({})).await {
            Ok(status) => status.open,
            Err(e) => {
                log::debug!("Driver status check failed: {}", e);
                false
            }
        }
    }
}
