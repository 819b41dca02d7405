//! Pi Agents - wrappers around external coding agents
//!
//! This crate provides:
//! - The [`AgentWrapper`] contract shared by every backend
//! - Shell wrappers for CLI agents (Claude Code, Aider, Codex, ...)
//! - API wrappers for OpenAI-compatible model endpoints
//! - [`WrapperOrchestrator`] for capability-based selection with fallback

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod error;
pub mod mock;
pub mod orchestrator;
pub mod shell;
pub mod task;
pub mod wrapper;

pub use api::{ApiConfig, ApiWrapper};
pub use error::{AgentConfigError, Result};
pub use mock::MockWrapper;
pub use orchestrator::{AvailabilityGate, WrapperOrchestrator, WrapperOrchestratorConfig};
pub use shell::{ShellConfig, ShellWrapper};
pub use task::{AgentResult, AgentStatus, AgentTask, MIDDLEWARE_AGENT_ID, NO_AGENT_ID};
pub use wrapper::{stream_header, AgentWrapper, ChunkStream};
