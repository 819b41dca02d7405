//! Pi Core - middleware-pipelined conversation orchestration
//!
//! This crate provides:
//! - [`OrchestratorService`]: a chat session that dispatches messages to agents
//! - [`Middleware`] hooks that transform, block or route messages
//! - [`EventBus`] for session lifecycle events

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod message;
pub mod middleware;
pub mod service;

pub use error::{Error, Result};
pub use events::{EventBus, ServiceEvent};
pub use message::{ChatMessage, ChatRole};
pub use middleware::{
    async_middleware_fn, middleware_fn, MentionRouter, Middleware, MiddlewareAction,
    MiddlewareContext, PromptGuard,
};
pub use service::{OrchestratorService, Turn};
