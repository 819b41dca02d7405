//! Task and result types exchanged with agent wrappers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Agent id used on results when no wrapper could be selected
pub const NO_AGENT_ID: &str = "none";

/// Agent id used on results when a middleware stopped the request
pub const MIDDLEWARE_AGENT_ID: &str = "middleware";

/// A unit of work handed to an agent wrapper
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentTask {
    /// Prompt text sent to the agent
    pub prompt: String,
    /// Capability tag required from the agent (e.g. "bug-fixing")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    /// Free-form context passed through to the wrapper
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl AgentTask {
    /// Create a task for the given prompt
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Require a capability
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    /// Attach a context value
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// Terminal status of one execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// The agent finished successfully
    Success,
    /// The agent failed (non-zero exit, timeout, API error, ...)
    Error,
}

impl AgentStatus {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    /// Id of the agent that produced the result
    pub agent: String,
    /// Success or error
    pub status: AgentStatus,
    /// Captured output (stdout or completion text)
    pub output: String,
    /// Captured diagnostics for failed runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl AgentResult {
    /// Create a successful result
    #[must_use]
    pub fn success(agent: impl Into<String>, output: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            agent: agent.into(),
            status: AgentStatus::Success,
            output: output.into(),
            stderr: None,
            duration_ms,
        }
    }

    /// Create a failed result
    #[must_use]
    pub fn failure(
        agent: impl Into<String>,
        output: impl Into<String>,
        stderr: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            agent: agent.into(),
            status: AgentStatus::Error,
            output: output.into(),
            stderr: Some(stderr.into()),
            duration_ms,
        }
    }

    /// Result returned when no registered agent can take the task
    #[must_use]
    pub fn no_agent(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            agent: NO_AGENT_ID.to_string(),
            status: AgentStatus::Error,
            output: detail.clone(),
            stderr: Some(detail),
            duration_ms: 0,
        }
    }

    /// Result returned when a middleware blocks the request
    #[must_use]
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            agent: MIDDLEWARE_AGENT_ID.to_string(),
            status: AgentStatus::Error,
            output: reason.into(),
            stderr: None,
            duration_ms: 0,
        }
    }

    /// Whether the attempt succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == AgentStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_builder() {
        let task = AgentTask::new("fix the bug")
            .with_capability("bug-fixing")
            .with_context("file", serde_json::json!("src/lib.rs"));

        assert_eq!(task.prompt, "fix the bug");
        assert_eq!(task.capability.as_deref(), Some("bug-fixing"));
        assert_eq!(task.context["file"], "src/lib.rs");
    }

    #[test]
    fn test_no_agent_result() {
        let result = AgentResult::no_agent("no agent available");
        assert_eq!(result.agent, NO_AGENT_ID);
        assert_eq!(result.status, AgentStatus::Error);
        assert!(!result.is_success());
    }

    #[test]
    fn test_blocked_result_carries_reason_as_output() {
        let result = AgentResult::blocked("secrets in prompt");
        assert_eq!(result.agent, MIDDLEWARE_AGENT_ID);
        assert_eq!(result.output, "secrets in prompt");
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&AgentResult::success("aider", "done", 12)).unwrap();
        assert!(json.contains("\"status\":\"success\""));
        assert!(!json.contains("stderr"));
    }
}
