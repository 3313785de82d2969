use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// The external process that turns a prompt into a raw proposed action.
///
/// Treated as unreliable: callers wrap every call with a timeout, retry and a
/// local fallback. May be called several times concurrently.
#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn propose(&self, messages: Vec<Message>) -> Result<String>;

    fn name(&self) -> &str {
        "decision-service"
    }
}

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    temperature: f32,
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api_key,
            model: "claude-3-5-sonnet-20240620".to_string(),
            temperature: 0.2,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl DecisionService for AnthropicProvider {
    async fn propose(&self, messages: Vec<Message>) -> Result<String> {
        let system = messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let request = AnthropicRequest {
            model: self.model.clone(),
            messages: messages
                .into_iter()
                .filter(|m| m.role != "system")
                .map(|m| AnthropicMessage {
                    role: m.role,
                    content: m.content,
                })
                .collect(),
            max_tokens: 1024,
            temperature: self.temperature,
            system: (!system.is_empty()).then_some(system),
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            anyhow::bail!("LLM request failed: Anthropic API error {}: {}", status, body);
        }

        let result: AnthropicResponse = response.json().await?;
        let text: String = result.content.into_iter().map(|c| c.text).collect();
        if text.trim().is_empty() {
            anyhow::bail!("LLM returned an empty response");
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    response_format: OpenAIResponseFormat,
}

#[derive(Debug, Serialize)]
struct OpenAIResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

impl OpenAIProvider {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api_key,
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.2,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Point at any OpenAI-compatible endpoint (local gateways, proxies).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl DecisionService for OpenAIProvider {
    async fn propose(&self, messages: Vec<Message>) -> Result<String> {
        let request = OpenAIRequest {
            model: self.model.clone(),
            messages: messages
                .into_iter()
                .map(|m| OpenAIMessage {
                    role: m.role,
                    content: Some(m.content),
                })
                .collect(),
            temperature: self.temperature,
            response_format: OpenAIResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            anyhow::bail!("LLM request failed: OpenAI API error {}: {}", status, body);
        }

        let result: OpenAIResponse = response.json().await?;
        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("LLM returned no choices"))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Replays a fixed list of responses, then repeats the last one.
///
/// Used for dry runs and tests. An entry starting with `!` is returned as an
/// error instead of a response.
pub struct ScriptedDecisionService {
    responses: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedDecisionService {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DecisionService for ScriptedDecisionService {
    async fn propose(&self, messages: Vec<Message>) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages);
        }
        let next = {
            let mut responses = self
                .responses
                .lock()
                .map_err(|_| anyhow::anyhow!("scripted responses poisoned"))?;
            responses.pop_front()
        };
        let mut last = self
            .last
            .lock()
            .map_err(|_| anyhow::anyhow!("scripted responses poisoned"))?;
        let response = match next {
            Some(response) => {
                *last = Some(response.clone());
                response
            }
            None => last
                .clone()
                .ok_or_else(|| anyhow::anyhow!("LLM unavailable: no scripted response"))?,
        };
        match response.strip_prefix('!') {
            Some(error) => Err(anyhow::anyhow!("{}", error.to_string())),
            None => Ok(response),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let sys = Message::system("test");
        assert_eq!(sys.role, "system");
        assert_eq!(sys.content, "test");

        let user = Message::user("hello");
        assert_eq!(user.role, "user");

        let assistant = Message::assistant("hi");
        assert_eq!(assistant.role, "assistant");
    }

    #[test]
    fn test_provider_creation() {
        let anthropic =
            AnthropicProvider::new("test-key".to_string(), Duration::from_secs(5)).unwrap();
        assert_eq!(anthropic.name(), "claude-3-5-sonnet-20240620");

        let openai = OpenAIProvider::new("test-key".to_string(), Duration::from_secs(5))
            .unwrap()
            .with_base_url("http://localhost:8080/v1/".to_string());
        assert_eq!(openai.name(), "gpt-4o");
        assert_eq!(openai.base_url, "http://localhost:8080/v1");
    }

    #[tokio::test]
    async fn test_scripted_service_replays_then_repeats() {
        let service = ScriptedDecisionService::new(["first", "second"]);
        assert_eq!(service.propose(vec![]).await.unwrap(), "first");
        assert_eq!(service.propose(vec![]).await.unwrap(), "second");
        assert_eq!(service.propose(vec![]).await.unwrap(), "second");
        assert_eq!(service.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_service_errors() {
        let service = ScriptedDecisionService::new(["!LLM timeout"]);
        let err = service.propose(vec![Message::user("x")]).await.unwrap_err();
        assert_eq!(err.to_string(), "LLM timeout");

        let empty = ScriptedDecisionService::new(Vec::<String>::new());
        assert!(empty.propose(vec![]).await.is_err());
    }
}
