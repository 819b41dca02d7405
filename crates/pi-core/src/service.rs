//! OrchestratorService - one chat session over a wrapper orchestrator
//!
//! Every message is appended to history, run through the middleware chain
//! in registration order and dispatched to an agent. Lifecycle events are
//! published on the [`EventBus`].

use crate::events::{EventBus, ServiceEvent};
use crate::message::ChatMessage;
use crate::middleware::{Middleware, MiddlewareAction, MiddlewareContext};
use pi_agents::{
    AgentResult, AgentTask, AgentWrapper, WrapperOrchestrator, MIDDLEWARE_AGENT_ID, NO_AGENT_ID,
};
use pi_routing::{FailoverManager, ProviderMonitor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of processing one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Assistant message (for blocked turns, a message carrying the reason)
    pub message: ChatMessage,
    /// Outcome of the dispatch
    pub agent_result: AgentResult,
}

/// What the middleware chain decided for one message
enum Dispatch {
    Blocked(String),
    Select(String),
    Forced { agent_id: String, prompt: String },
}

/// A chat session with a middleware pipeline
pub struct OrchestratorService {
    session_id: String,
    history: Vec<ChatMessage>,
    middleware: Vec<Arc<dyn Middleware>>,
    orchestrator: Arc<WrapperOrchestrator>,
    events: EventBus,
    monitor: Option<Arc<ProviderMonitor>>,
    failover: Option<Arc<FailoverManager>>,
}

impl OrchestratorService {
    /// Create a session bound to `orchestrator`
    #[must_use]
    pub fn new(orchestrator: Arc<WrapperOrchestrator>) -> Self {
        let session_id = Uuid::new_v4().to_string();
        info!(session_id = %session_id, "Session started");
        Self {
            session_id,
            history: Vec::new(),
            middleware: Vec::new(),
            orchestrator,
            events: EventBus::default(),
            monitor: None,
            failover: None,
        }
    }

    /// Publish on an existing bus instead of a private one
    #[must_use]
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Record every dispatch outcome in a provider monitor
    #[must_use]
    pub fn with_monitor(mut self, monitor: Arc<ProviderMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Feed outcomes to a failover manager and keep blacklisted agents out of selection
    #[must_use]
    pub fn with_failover(mut self, failover: Arc<FailoverManager>) -> Self {
        let gate = Arc::clone(&failover);
        self.orchestrator
            .set_availability_gate(Arc::new(move |id: &str| gate.is_provider_available(id)));
        self.failover = Some(failover);
        self
    }

    /// Append a middleware to the chain
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        debug!(middleware = %middleware.name(), "Middleware added");
        self.middleware.push(middleware);
        self
    }

    /// Remove a middleware previously added (compared by identity)
    pub fn unuse_middleware(&mut self, middleware: &Arc<dyn Middleware>) -> &mut Self {
        let target = Arc::as_ptr(middleware) as *const ();
        self.middleware
            .retain(|m| Arc::as_ptr(m) as *const () != target);
        self
    }

    /// Register a wrapper with the bound orchestrator
    pub fn register_wrapper(&self, wrapper: Arc<dyn AgentWrapper>) -> &Self {
        self.orchestrator.register(wrapper);
        self
    }

    /// Unregister a wrapper from the bound orchestrator
    pub fn unregister_wrapper(&self, id: &str) -> &Self {
        self.orchestrator.unregister(id);
        self
    }

    /// Registered wrappers in registration order
    pub fn list_wrappers(&self) -> Vec<Arc<dyn AgentWrapper>> {
        self.orchestrator.wrappers()
    }

    /// The bound orchestrator
    pub fn orchestrator(&self) -> &Arc<WrapperOrchestrator> {
        &self.orchestrator
    }

    /// Session identifier, stable for the life of the service
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Messages so far, oldest first
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Empty the history; the session id is unchanged
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    /// Process a plain user message
    pub async fn process_message(&mut self, text: &str) -> Turn {
        self.process_task(AgentTask::new(text)).await
    }

    /// Process a user task; its prompt is what middleware sees and rewrites
    pub async fn process_task(&mut self, mut task: AgentTask) -> Turn {
        let user_message = ChatMessage::user(task.prompt.clone());
        self.history.push(user_message.clone());
        self.publish(ServiceEvent::UserMessage {
            session_id: self.session_id.clone(),
            message: user_message,
        });

        let context = MiddlewareContext {
            session_id: self.session_id.clone(),
            history: self.history.clone(),
        };

        let forced = match self.run_middleware(task.prompt.clone(), &context).await {
            Dispatch::Blocked(reason) => return self.blocked_turn(reason),
            Dispatch::Select(prompt) => {
                task.prompt = prompt;
                None
            }
            Dispatch::Forced { agent_id, prompt } => {
                task.prompt = prompt;
                Some(agent_id)
            }
        };

        let mut attempts = match forced {
            Some(agent_id) => match self.orchestrator.get_wrapper(&agent_id) {
                Some(wrapper) => {
                    debug!(agent_id = %agent_id, "Dispatching to routed agent");
                    vec![wrapper.execute(&task).await]
                }
                None => {
                    warn!(agent_id = %agent_id, "Routed agent is not registered");
                    vec![AgentResult::no_agent(format!(
                        "Agent '{}' is not registered",
                        agent_id
                    ))]
                }
            },
            None => self.orchestrator.execute_attempts(&task).await,
        };

        // Failures that were fallen back from still count against their agent
        for attempt in &attempts {
            self.record_outcome(attempt);
        }
        let result = attempts
            .pop()
            .unwrap_or_else(|| AgentResult::no_agent("No agent produced a result"));

        let message = ChatMessage::assistant(reply_text(&result), result.agent.clone());
        self.history.push(message.clone());
        self.publish(ServiceEvent::AssistantMessage {
            session_id: self.session_id.clone(),
            message: message.clone(),
            result: result.clone(),
        });

        Turn {
            message,
            agent_result: result,
        }
    }

    async fn run_middleware(&self, mut prompt: String, context: &MiddlewareContext) -> Dispatch {
        for middleware in &self.middleware {
            match middleware.handle(&prompt, context).await {
                MiddlewareAction::Pass => {}
                MiddlewareAction::Transform { prompt: rewritten } => {
                    debug!(middleware = %middleware.name(), "Prompt transformed");
                    prompt = rewritten;
                }
                MiddlewareAction::Block { reason } => {
                    info!(middleware = %middleware.name(), reason = %reason, "Message blocked");
                    return Dispatch::Blocked(reason);
                }
                MiddlewareAction::Route {
                    agent_id,
                    prompt: routed,
                } => {
                    debug!(middleware = %middleware.name(), agent_id = %agent_id, "Message routed");
                    return Dispatch::Forced {
                        agent_id,
                        prompt: routed.unwrap_or(prompt),
                    };
                }
            }
        }
        Dispatch::Select(prompt)
    }

    fn blocked_turn(&self, reason: String) -> Turn {
        self.publish(ServiceEvent::Error {
            session_id: self.session_id.clone(),
            error: format!("middleware blocked: {}", reason),
        });
        let result = AgentResult::blocked(reason);
        Turn {
            message: ChatMessage::assistant(result.output.clone(), MIDDLEWARE_AGENT_ID),
            agent_result: result,
        }
    }

    fn record_outcome(&self, result: &AgentResult) {
        if result.agent == NO_AGENT_ID {
            return;
        }
        if let Some(monitor) = &self.monitor {
            let tokens = (result.output.len() / 4) as u64;
            monitor.record_request(
                &result.agent,
                result.duration_ms,
                result.is_success(),
                tokens,
                0.0,
            );
        }
        if let Some(failover) = &self.failover {
            if result.is_success() {
                failover.record_success(&result.agent);
            } else {
                failover.record_failure(
                    &result.agent,
                    result.stderr.as_deref().unwrap_or("agent returned an error"),
                );
            }
        }
    }

    fn publish(&self, event: ServiceEvent) {
        let reached = self.events.publish(event);
        debug!(session_id = %self.session_id, subscribers = reached, "Event published");
    }
}

/// Text stored in history for a dispatch result
fn reply_text(result: &AgentResult) -> String {
    if result.is_success() || !result.output.trim().is_empty() {
        result.output.clone()
    } else {
        result.stderr.clone().unwrap_or_default()
    }
}
