//! Middleware - ordered hooks that run before a message is dispatched
//!
//! Each middleware sees the working prompt and the session context and may
//! pass it on, rewrite it, block the message or force a specific agent.

use crate::error::{Error, Result};
use crate::message::ChatMessage;
use async_trait::async_trait;
use pi_agents::WrapperOrchestrator;
use regex::Regex;
use std::future::Future;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

static MENTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*@([\w-]+)\s+(.*)$").expect("MENTION_REGEX is a compile-time constant")
});

/// What a middleware decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiddlewareAction {
    /// Continue with the prompt unchanged
    Pass,
    /// Continue with a rewritten prompt
    Transform {
        /// New working prompt
        prompt: String,
    },
    /// Stop; nothing is dispatched
    Block {
        /// Why the message was blocked
        reason: String,
    },
    /// Stop evaluating middleware and dispatch to this agent
    Route {
        /// Target agent id
        agent_id: String,
        /// Replacement prompt, if any
        prompt: Option<String>,
    },
}

impl MiddlewareAction {
    /// Shorthand for [`MiddlewareAction::Transform`]
    pub fn transform(prompt: impl Into<String>) -> Self {
        Self::Transform {
            prompt: prompt.into(),
        }
    }

    /// Shorthand for [`MiddlewareAction::Block`]
    pub fn block(reason: impl Into<String>) -> Self {
        Self::Block {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`MiddlewareAction::Route`] keeping the prompt
    pub fn route(agent_id: impl Into<String>) -> Self {
        Self::Route {
            agent_id: agent_id.into(),
            prompt: None,
        }
    }
}

/// Read-only view of the session handed to middleware
#[derive(Debug, Clone, Default)]
pub struct MiddlewareContext {
    /// Session identifier
    pub session_id: String,
    /// History up to and including the current user message
    pub history: Vec<ChatMessage>,
}

/// A pre-dispatch hook
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str {
        "middleware"
    }

    /// Decide what happens to the working prompt
    async fn handle(&self, prompt: &str, context: &MiddlewareContext) -> MiddlewareAction;
}

struct FnMiddleware<F> {
    f: F,
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&str, &MiddlewareContext) -> MiddlewareAction + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "fn"
    }

    async fn handle(&self, prompt: &str, context: &MiddlewareContext) -> MiddlewareAction {
        (self.f)(prompt, context)
    }
}

struct AsyncFnMiddleware<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Middleware for AsyncFnMiddleware<F>
where
    F: Fn(String, MiddlewareContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareAction> + Send + 'static,
{
    fn name(&self) -> &str {
        "async-fn"
    }

    async fn handle(&self, prompt: &str, context: &MiddlewareContext) -> MiddlewareAction {
        (self.f)(prompt.to_string(), context.clone()).await
    }
}

/// Wrap a synchronous closure as middleware
pub fn middleware_fn<F>(f: F) -> Arc<dyn Middleware>
where
    F: Fn(&str, &MiddlewareContext) -> MiddlewareAction + Send + Sync + 'static,
{
    Arc::new(FnMiddleware { f })
}

/// Wrap a closure returning a future as middleware
pub fn async_middleware_fn<F, Fut>(f: F) -> Arc<dyn Middleware>
where
    F: Fn(String, MiddlewareContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareAction> + Send + 'static,
{
    Arc::new(AsyncFnMiddleware { f })
}

/// Blocks prompts that match a deny-list or exceed a length limit
pub struct PromptGuard {
    patterns: Vec<Regex>,
    max_length: Option<usize>,
}

impl PromptGuard {
    /// Compile the deny-list
    pub fn new<I, S>(patterns: I, max_length: Option<usize>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if max_length == Some(0) {
            return Err(Error::Configuration(
                "max_prompt_length must be greater than zero".to_string(),
            ));
        }
        let patterns = patterns
            .into_iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| Error::InvalidPattern {
                    pattern: p.as_ref().to_string(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            patterns,
            max_length,
        })
    }
}

#[async_trait]
impl Middleware for PromptGuard {
    fn name(&self) -> &str {
        "prompt-guard"
    }

    async fn handle(&self, prompt: &str, _context: &MiddlewareContext) -> MiddlewareAction {
        if let Some(max) = self.max_length {
            let length = prompt.chars().count();
            if length > max {
                warn!(length, max, "Prompt exceeds length limit");
                return MiddlewareAction::block(format!("prompt exceeds {} characters", max));
            }
        }
        if let Some(pattern) = self.patterns.iter().find(|p| p.is_match(prompt)) {
            warn!(pattern = %pattern.as_str(), "Prompt matched blocked pattern");
            return MiddlewareAction::block(format!(
                "prompt matches blocked pattern '{}'",
                pattern.as_str()
            ));
        }
        MiddlewareAction::Pass
    }
}

/// Routes `@agent-id rest of prompt` to a registered agent
pub struct MentionRouter {
    orchestrator: Arc<WrapperOrchestrator>,
}

impl MentionRouter {
    /// Resolve mentions against the orchestrator's registry
    pub fn new(orchestrator: Arc<WrapperOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl Middleware for MentionRouter {
    fn name(&self) -> &str {
        "mention-router"
    }

    async fn handle(&self, prompt: &str, _context: &MiddlewareContext) -> MiddlewareAction {
        let Some(caps) = MENTION_REGEX.captures(prompt) else {
            return MiddlewareAction::Pass;
        };
        let agent_id = &caps[1];
        if self.orchestrator.get_wrapper(agent_id).is_none() {
            debug!(agent_id = %agent_id, "Mention does not name a registered agent");
            return MiddlewareAction::Pass;
        }
        MiddlewareAction::Route {
            agent_id: agent_id.to_string(),
            prompt: Some(caps[2].trim().to_string()),
        }
    }
}
