//! EventBus - broadcast-based lifecycle events for chat sessions.
//!
//! Transport layers subscribe to relay user messages, assistant replies and
//! errors without polling the service.

use crate::message::ChatMessage;
use pi_agents::AgentResult;
use serde::Serialize;
use tokio::sync::broadcast;

/// Events emitted while processing messages
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceEvent {
    /// A user message was appended to history
    UserMessage {
        /// Session identifier
        session_id: String,
        /// The message
        message: ChatMessage,
    },
    /// An assistant reply was appended to history
    AssistantMessage {
        /// Session identifier
        session_id: String,
        /// The message
        message: ChatMessage,
        /// Outcome of the dispatch that produced it
        result: AgentResult,
    },
    /// Processing stopped with an error
    Error {
        /// Session identifier
        session_id: String,
        /// Error description
        error: String,
    },
}

impl ServiceEvent {
    /// Session the event belongs to
    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Self::UserMessage { session_id, .. }
            | Self::AssistantMessage { session_id, .. }
            | Self::Error { session_id, .. } => session_id,
        }
    }

    /// Event name as used on the wire
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserMessage { .. } => "user_message",
            Self::AssistantMessage { .. } => "assistant_message",
            Self::Error { .. } => "error",
        }
    }
}

/// Broadcast-based event bus.
///
/// Slow subscribers miss events (lagged) rather than blocking the publisher.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ServiceEvent>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all future events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; returns the number of subscribers reached
    pub fn publish(&self, event: ServiceEvent) -> usize {
        // send() fails only when nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    /// Current number of subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
