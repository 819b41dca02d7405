//! AgentWrapper - uniform contract over external agents
//!
//! Every backend (a CLI tool spawned as a child process, or an HTTP model
//! API) is exposed through the same four operations so the orchestrator can
//! treat them interchangeably.

use crate::task::{AgentResult, AgentTask};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Lazy, finite stream of text chunks in arrival order
pub type ChunkStream = BoxStream<'static, String>;

/// Header chunk emitted first by every stream so merged output can be attributed
#[must_use]
pub fn stream_header(name: &str) -> String {
    format!("[{}] Starting...\n", name)
}

/// Trait for agent backends
#[async_trait]
pub trait AgentWrapper: Send + Sync {
    /// Registry key
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    /// Binary or endpoint the wrapper talks to
    fn binary(&self) -> &str;

    /// Capability tags used for task matching
    fn capabilities(&self) -> &[String];

    /// Run the task to completion.
    ///
    /// Expected failures (non-zero exit, timeout, auth) are reported as an
    /// error-status [`AgentResult`], never by panicking.
    async fn execute(&self, task: &AgentTask) -> AgentResult;

    /// Stream output chunks as they arrive.
    ///
    /// The first chunk is [`stream_header`] for this wrapper's name.
    fn execute_stream(&self, task: &AgentTask) -> ChunkStream;

    /// Cheap liveness probe; resolves `false` on any internal error
    async fn health(&self) -> bool;

    /// Detected version, if any
    async fn version(&self) -> Option<String>;

    /// Whether this wrapper can take a task requiring `capability`.
    ///
    /// Wrappers without declared capabilities accept everything.
    fn supports(&self, capability: Option<&str>) -> bool {
        match capability {
            None => true,
            Some(cap) => {
                let caps = self.capabilities();
                caps.is_empty() || caps.iter().any(|c| c == cap)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWrapper;

    #[test]
    fn test_stream_header_format() {
        assert_eq!(stream_header("Aider"), "[Aider] Starting...\n");
    }

    #[test]
    fn test_supports_capability() {
        let wrapper = MockWrapper::new("a").with_capabilities(["code-generation"]);
        assert!(wrapper.supports(None));
        assert!(wrapper.supports(Some("code-generation")));
        assert!(!wrapper.supports(Some("bug-fixing")));
    }

    #[test]
    fn test_empty_capabilities_match_everything() {
        let wrapper = MockWrapper::new("generalist");
        assert!(wrapper.supports(Some("bug-fixing")));
    }
}
