//! API wrappers - hosted models behind an OpenAI-compatible endpoint
//!
//! Covers OpenAI, Groq, DeepSeek, OpenRouter and any other service that
//! speaks the `/chat/completions` protocol. Streaming uses server-sent events.

use crate::error::{AgentConfigError, Result};
use crate::shell::elapsed_ms;
use crate::task::{AgentResult, AgentTask};
use crate::wrapper::{stream_header, AgentWrapper, ChunkStream};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{future, stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Timeout for the `/models` health probe
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// API agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Registry id
    pub id: String,
    /// Display name
    pub name: String,
    /// Base URL up to and including the version segment
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Model id
    pub model: String,
    /// Completion token cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Capability tags
    #[serde(default)]
    pub capabilities: Vec<String>,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout() -> u64 {
    120
}

impl ApiConfig {
    /// Create a config with default sampling settings
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key_env: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            base_url: base_url.into(),
            api_key_env: api_key_env.into(),
            model: model.into(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
            capabilities: vec!["chat".to_string(), "code-generation".to_string()],
        }
    }

    /// OpenAI
    pub fn openai() -> Self {
        Self::new(
            "openai",
            "OpenAI",
            "https://api.openai.com/v1",
            "OPENAI_API_KEY",
            "gpt-4o-mini",
        )
    }

    /// Groq
    pub fn groq() -> Self {
        Self::new(
            "groq",
            "Groq",
            "https://api.groq.com/openai/v1",
            "GROQ_API_KEY",
            "llama-3.3-70b-versatile",
        )
    }

    /// DeepSeek
    pub fn deepseek() -> Self {
        Self::new(
            "deepseek",
            "DeepSeek",
            "https://api.deepseek.com/v1",
            "DEEPSEEK_API_KEY",
            "deepseek-chat",
        )
    }

    /// OpenRouter
    pub fn openrouter() -> Self {
        Self::new(
            "openrouter",
            "OpenRouter",
            "https://openrouter.ai/api/v1",
            "OPENROUTER_API_KEY",
            "openai/gpt-4o-mini",
        )
    }

    /// All built-in presets
    pub fn presets() -> Vec<Self> {
        vec![
            Self::openai(),
            Self::groq(),
            Self::deepseek(),
            Self::openrouter(),
        ]
    }

    /// Validate required fields
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("id", &self.id),
            ("name", &self.name),
            ("base_url", &self.base_url),
            ("api_key_env", &self.api_key_env),
            ("model", &self.model),
        ] {
            if value.trim().is_empty() {
                return Err(AgentConfigError::EmptyField {
                    agent: self.id.clone(),
                    field,
                });
            }
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(AgentConfigError::InvalidBaseUrl {
                agent: self.id.clone(),
                url: self.base_url.clone(),
            });
        }
        if self.timeout_seconds == 0 {
            return Err(AgentConfigError::ZeroTimeout(self.id.clone()));
        }
        Ok(())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Agent wrapper that calls a hosted chat-completions API
pub struct ApiWrapper {
    config: ApiConfig,
    client: reqwest::Client,
}

impl ApiWrapper {
    /// Create a wrapper from a validated config
    pub fn new(config: ApiConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            client: reqwest::Client::new(),
        })
    }

    /// Access the configuration
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn api_key(&self) -> Option<String> {
        std::env::var(&self.config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    fn missing_key_message(&self) -> String {
        format!("API key not configured: set {}", self.config.api_key_env)
    }

    /// JSON body for a chat-completions request
    pub(crate) fn request_body(&self, task: &AgentTask, stream: bool) -> Value {
        let mut messages = Vec::new();
        if let Some(persona) = task.context.get("persona").and_then(|v| v.as_str()) {
            if !persona.is_empty() {
                messages.push(json!({ "role": "system", "content": persona }));
            }
        }
        messages.push(json!({ "role": "user", "content": task.prompt }));

        json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "stream": stream,
        })
    }

    fn completion_request(&self, key: &str, body: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(self.config.endpoint("chat/completions"))
            .bearer_auth(key)
            .json(body)
            .timeout(Duration::from_secs(self.config.timeout_seconds))
    }
}

/// Extract `choices[0].message.content` from a completion response
pub(crate) fn extract_message_content(response: &Value) -> Option<String> {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// One parsed server-sent-events line
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseEvent {
    /// Text delta
    Delta(String),
    /// End of stream marker
    Done,
    /// Comment, keep-alive, or a chunk without text
    Ignore,
}

pub(crate) fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return SseEvent::Ignore;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseEvent::Done;
    }
    serde_json::from_str::<Value>(data)
        .ok()
        .and_then(|v| {
            v.pointer("/choices/0/delta/content")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .map_or(SseEvent::Ignore, SseEvent::Delta)
}

#[async_trait]
impl AgentWrapper for ApiWrapper {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn binary(&self) -> &str {
        &self.config.base_url
    }

    fn capabilities(&self) -> &[String] {
        &self.config.capabilities
    }

    async fn execute(&self, task: &AgentTask) -> AgentResult {
        let start = Instant::now();
        let Some(key) = self.api_key() else {
            return AgentResult::failure(&self.config.id, "", self.missing_key_message(), 0);
        };

        debug!(agent_id = %self.config.id, model = %self.config.model, "Calling API agent");

        let body = self.request_body(task, false);
        let response = match self.completion_request(&key, &body).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(agent_id = %self.config.id, error = %e, "API request failed");
                let detail = if e.is_timeout() {
                    format!("timed out after {}s", self.config.timeout_seconds)
                } else {
                    format!("request failed: {}", e)
                };
                return AgentResult::failure(&self.config.id, "", detail, elapsed_ms(start));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(agent_id = %self.config.id, status = %status, "API returned error status");
            return AgentResult::failure(
                &self.config.id,
                "",
                format!("HTTP {}: {}", status, text),
                elapsed_ms(start),
            );
        }

        let parsed = match response.json::<Value>().await {
            Ok(value) => value,
            Err(e) => {
                return AgentResult::failure(
                    &self.config.id,
                    "",
                    format!("invalid response: {}", e),
                    elapsed_ms(start),
                );
            }
        };

        match extract_message_content(&parsed) {
            Some(content) => AgentResult::success(&self.config.id, content, elapsed_ms(start)),
            None => AgentResult::failure(
                &self.config.id,
                "",
                "invalid response: missing choices[0].message.content",
                elapsed_ms(start),
            ),
        }
    }

    fn execute_stream(&self, task: &AgentTask) -> ChunkStream {
        let header = stream_header(&self.config.name);
        let name = self.config.name.clone();
        let request = match self.api_key() {
            Some(key) => Ok(self.completion_request(&key, &self.request_body(task, true))),
            None => Err(self.missing_key_message()),
        };

        let body = stream::once(async move {
            match request {
                Ok(request) => sse_stream(request, name).await,
                Err(message) => {
                    stream::once(future::ready(format!("[{}] Error: {}\n", name, message))).boxed()
                }
            }
        })
        .flatten();

        stream::once(future::ready(header)).chain(body).boxed()
    }

    async fn health(&self) -> bool {
        let Some(key) = self.api_key() else {
            return false;
        };
        self.client
            .get(self.config.endpoint("models"))
            .bearer_auth(key)
            .timeout(HEALTH_PROBE_TIMEOUT)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn version(&self) -> Option<String> {
        Some(self.config.model.clone())
    }
}

struct SseState {
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    done: bool,
    name: String,
}

impl SseState {
    /// Move complete lines out of the buffer into `pending`
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            match parse_sse_line(&String::from_utf8_lossy(&line)) {
                SseEvent::Delta(text) => self.pending.push_back(text),
                SseEvent::Done => {
                    self.done = true;
                    self.buffer.clear();
                    return;
                }
                SseEvent::Ignore => {}
            }
        }
    }
}

async fn sse_stream(request: reqwest::RequestBuilder, name: String) -> ChunkStream {
    let response = match request.send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            let message = format!("[{}] Error: HTTP {}\n", name, response.status());
            return stream::once(future::ready(message)).boxed();
        }
        Err(e) => {
            return stream::once(future::ready(format!("[{}] Error: {}\n", name, e))).boxed();
        }
    };

    let state = SseState {
        bytes: response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed(),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
        name,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.pending.pop_front() {
                return Some((chunk, state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(bytes)) => {
                    state.buffer.extend_from_slice(&bytes);
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state.done = true;
                    let message = format!("[{}] Error: {}\n", state.name, e);
                    state.pending.push_back(message);
                }
                None => {
                    state.buffer.push(b'\n');
                    state.drain_lines();
                    state.done = true;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::AgentStatus;

    fn offline_config() -> ApiConfig {
        ApiConfig::new(
            "local",
            "Local",
            "http://127.0.0.1:9/v1",
            "PI_API_TEST_KEY_THAT_IS_NEVER_SET",
            "test-model",
        )
    }

    #[test]
    fn test_presets_are_valid() {
        for preset in ApiConfig::presets() {
            assert!(preset.validate().is_ok(), "preset {} invalid", preset.id);
        }
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = offline_config();
        config.base_url = "ftp://example.com".to_string();
        assert!(matches!(
            config.validate(),
            Err(AgentConfigError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let mut config = offline_config();
        config.base_url = "https://api.example.com/v1/".to_string();
        assert_eq!(
            config.endpoint("chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_body_includes_persona() {
        let wrapper = ApiWrapper::new(offline_config()).unwrap();
        let task = AgentTask::new("hi").with_context("persona", json!("Be brief."));
        let body = wrapper.request_body(&task, true);

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_extract_message_content() {
        let response = json!({"choices": [{"message": {"role": "assistant", "content": "done"}}]});
        assert_eq!(extract_message_content(&response).as_deref(), Some("done"));
        assert_eq!(extract_message_content(&json!({"choices": []})), None);
    }

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#),
            SseEvent::Delta("Hel".to_string())
        );
        assert_eq!(parse_sse_line("data: [DONE]"), SseEvent::Done);
        assert_eq!(parse_sse_line(": keep-alive"), SseEvent::Ignore);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseEvent::Ignore
        );
    }

    #[tokio::test]
    async fn test_execute_without_key_is_error_result() {
        let wrapper = ApiWrapper::new(offline_config()).unwrap();
        let result = wrapper.execute(&AgentTask::new("hi")).await;

        assert_eq!(result.status, AgentStatus::Error);
        assert!(result
            .stderr
            .unwrap()
            .contains("PI_API_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[tokio::test]
    async fn test_health_false_without_key() {
        let wrapper = ApiWrapper::new(offline_config()).unwrap();
        assert!(!wrapper.health().await);
        assert_eq!(wrapper.version().await.as_deref(), Some("test-model"));
    }

    #[tokio::test]
    async fn test_stream_without_key_yields_header_and_error() {
        let wrapper = ApiWrapper::new(offline_config()).unwrap();
        let chunks: Vec<String> = wrapper.execute_stream(&AgentTask::new("hi")).collect().await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "[Local] Starting...\n");
        assert!(chunks[1].contains("API key not configured"));
    }
}
