//! Mock agent wrapper for testing
//!
//! Returns queued results (or a fixed default), records the prompts it
//! receives and lets tests flip its health at runtime.

use crate::task::{AgentResult, AgentTask};
use crate::wrapper::{stream_header, AgentWrapper, ChunkStream};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A scripted in-memory agent
pub struct MockWrapper {
    id: String,
    name: String,
    capabilities: Vec<String>,
    healthy: AtomicBool,
    failing: bool,
    output: String,
    version: Option<String>,
    delay: Option<Duration>,
    health_delay: Option<Duration>,
    queue: Mutex<VecDeque<AgentResult>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    health_checks: AtomicUsize,
}

impl MockWrapper {
    /// Create a healthy mock that succeeds with `"mock response"`
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            capabilities: Vec::new(),
            healthy: AtomicBool::new(true),
            failing: false,
            output: "mock response".to_string(),
            version: Some("mock-1.0".to_string()),
            delay: None,
            health_delay: None,
            queue: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            health_checks: AtomicUsize::new(0),
        }
    }

    /// Set the display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set capability tags
    #[must_use]
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Set the default output
    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Report unhealthy from the start
    #[must_use]
    pub fn unhealthy(self) -> Self {
        self.healthy.store(false, Ordering::SeqCst);
        self
    }

    /// Fail every call that has no queued result
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Sleep before returning from `execute`
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep before answering a health probe
    #[must_use]
    pub fn with_health_delay(mut self, delay: Duration) -> Self {
        self.health_delay = Some(delay);
        self
    }

    /// Set the reported version
    #[must_use]
    pub fn with_version(mut self, version: Option<&str>) -> Self {
        self.version = version.map(str::to_string);
        self
    }

    /// Flip health at runtime
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Queue a successful result
    pub fn push_success(&self, output: impl Into<String>) {
        let result = AgentResult::success(&self.id, output, 1);
        self.push_result(result);
    }

    /// Queue a failed result
    pub fn push_failure(&self, stderr: impl Into<String>) {
        let result = AgentResult::failure(&self.id, "", stderr, 1);
        self.push_result(result);
    }

    /// Queue an arbitrary result
    pub fn push_result(&self, result: AgentResult) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(result);
    }

    /// Number of `execute`/`execute_stream` calls
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of health probes answered
    pub fn health_check_count(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    /// Prompts received, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next_result(&self, task: &AgentTask) -> AgentResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(task.prompt.clone());

        let queued = self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match queued {
            Some(result) => result,
            None if self.failing => AgentResult::failure(&self.id, "", "mock failure", 1),
            None => AgentResult::success(&self.id, self.output.clone(), 1),
        }
    }
}

#[async_trait]
impl AgentWrapper for MockWrapper {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn binary(&self) -> &str {
        "mock"
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn execute(&self, task: &AgentTask) -> AgentResult {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_result(task)
    }

    fn execute_stream(&self, task: &AgentTask) -> ChunkStream {
        let result = self.next_result(task);
        let body = if result.is_success() {
            result.output
        } else {
            format!(
                "[{}] Error: {}\n",
                self.name,
                result.stderr.unwrap_or_default()
            )
        };
        stream::iter([stream_header(&self.name), body]).boxed()
    }

    async fn health(&self) -> bool {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.health_delay {
            tokio::time::sleep(delay).await;
        }
        self.healthy.load(Ordering::SeqCst)
    }

    async fn version(&self) -> Option<String> {
        self.version.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::AgentStatus;

    #[tokio::test]
    async fn test_queued_results_then_default() {
        let mock = MockWrapper::new("m").with_output("fallback text");
        mock.push_failure("boom");

        let first = mock.execute(&AgentTask::new("one")).await;
        let second = mock.execute(&AgentTask::new("two")).await;

        assert_eq!(first.status, AgentStatus::Error);
        assert_eq!(second.output, "fallback text");
        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.prompts(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_health_flag() {
        let mock = MockWrapper::new("m").unhealthy();
        assert!(!mock.health().await);
        mock.set_healthy(true);
        assert!(mock.health().await);
        assert_eq!(mock.health_check_count(), 2);
    }

    #[test]
    fn test_version_is_configurable() {
        let mock = MockWrapper::new("m").with_version(None);
        assert_eq!(tokio_test::block_on(mock.version()), None);
        let mock = MockWrapper::new("m").with_version(Some("2.0"));
        assert_eq!(tokio_test::block_on(mock.version()).as_deref(), Some("2.0"));
    }

    #[tokio::test]
    async fn test_stream_emits_header() {
        let mock = MockWrapper::new("m").with_name("Mock").with_output("body");
        let chunks: Vec<String> = mock.execute_stream(&AgentTask::new("x")).collect().await;
        assert_eq!(chunks, vec!["[Mock] Starting...\n", "body"]);
    }
}
