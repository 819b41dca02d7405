//! Shell wrappers - CLI coding agents spawned as child processes
//!
//! Each wrapper launches a local binary (Claude Code, Aider, Codex, ...)
//! with the prompt as an argument and captures its output.

use crate::error::{AgentConfigError, Result};
use crate::task::{AgentResult, AgentTask};
use crate::wrapper::{stream_header, AgentWrapper, ChunkStream};
use async_trait::async_trait;
use futures::{future, stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Upper bound for `--version` probes
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shell agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Registry id
    pub id: String,
    /// Display name
    pub name: String,
    /// Binary to execute
    pub command: String,
    /// Arguments placed before the prompt
    #[serde(default)]
    pub args: Vec<String>,
    /// Flag preceding the prompt (`None` passes it positionally)
    #[serde(default)]
    pub prompt_flag: Option<String>,
    /// Arguments for the version probe
    #[serde(default = "default_version_args")]
    pub version_args: Vec<String>,
    /// Environment variables (`${VAR}` values are expanded)
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Execution timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Working directory (overridden by a `workspace` context entry)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Capability tags
    #[serde(default)]
    pub capabilities: Vec<String>,
}

fn default_version_args() -> Vec<String> {
    vec!["--version".to_string()]
}

fn default_timeout() -> u64 {
    300
}

impl ShellConfig {
    /// Create a config with defaults for everything but identity
    pub fn new(id: impl Into<String>, name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            prompt_flag: None,
            version_args: default_version_args(),
            env: HashMap::new(),
            timeout_seconds: default_timeout(),
            working_dir: None,
            capabilities: Vec::new(),
        }
    }

    /// Set leading arguments
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Pass the prompt after a flag
    #[must_use]
    pub fn with_prompt_flag(mut self, flag: impl Into<String>) -> Self {
        self.prompt_flag = Some(flag.into());
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

    /// Set timeout
    #[must_use]
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Claude Code (`claude --print`)
    pub fn claude_code() -> Self {
        Self::new("claude-code", "Claude Code", "claude")
            .with_args(["--print"])
            .with_capabilities([
                "code-generation",
                "bug-fixing",
                "refactoring",
                "code-review",
                "git-aware",
            ])
    }

    /// Aider
    pub fn aider() -> Self {
        Self::new("aider", "Aider", "aider")
            .with_args(["--yes-always", "--no-pretty"])
            .with_prompt_flag("--message")
            .with_capabilities(["code-generation", "bug-fixing", "refactoring", "git-aware"])
    }

    /// OpenAI Codex CLI
    pub fn codex() -> Self {
        Self::new("codex", "Codex CLI", "codex")
            .with_args(["exec"])
            .with_capabilities(["code-generation", "bug-fixing"])
    }

    /// Gemini CLI
    pub fn gemini() -> Self {
        Self::new("gemini", "Gemini CLI", "gemini")
            .with_prompt_flag("-p")
            .with_timeout(180)
            .with_capabilities(["code-generation", "code-review", "chat"])
    }

    /// OpenCode
    pub fn opencode() -> Self {
        Self::new("opencode", "OpenCode", "opencode")
            .with_args(["run"])
            .with_capabilities(["code-generation", "refactoring"])
    }

    /// Goose
    pub fn goose() -> Self {
        Self::new("goose", "Goose", "goose")
            .with_args(["run"])
            .with_prompt_flag("--text")
            .with_capabilities(["code-generation", "git-aware"])
    }

    /// All built-in presets
    pub fn presets() -> Vec<Self> {
        vec![
            Self::claude_code(),
            Self::aider(),
            Self::codex(),
            Self::gemini(),
            Self::opencode(),
            Self::goose(),
        ]
    }

    /// Validate required fields
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("id", &self.id),
            ("name", &self.name),
            ("command", &self.command),
        ] {
            if value.trim().is_empty() {
                return Err(AgentConfigError::EmptyField {
                    agent: self.id.clone(),
                    field,
                });
            }
        }
        if self.timeout_seconds == 0 {
            return Err(AgentConfigError::ZeroTimeout(self.id.clone()));
        }
        Ok(())
    }
}

/// Expand a `${VAR}` reference against the process environment
pub(crate) fn expand_env(value: &str) -> String {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).unwrap_or_default()
    } else {
        value.to_string()
    }
}

/// Prompt text including an optional persona from the task context
pub(crate) fn full_prompt(task: &AgentTask) -> String {
    match task.context.get("persona").and_then(|v| v.as_str()) {
        Some(persona) if !persona.is_empty() => format!("{}\n\nTask: {}", persona, task.prompt),
        _ => task.prompt.clone(),
    }
}

/// Agent wrapper that spawns a CLI tool
pub struct ShellWrapper {
    config: ShellConfig,
}

impl ShellWrapper {
    /// Create a wrapper from a validated config
    pub fn new(config: ShellConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Access the configuration
    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Build the command line for a task
    pub(crate) fn build_command(&self, task: &AgentTask) -> Command {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args);
        if let Some(flag) = &self.config.prompt_flag {
            cmd.arg(flag);
        }
        cmd.arg(full_prompt(task));

        for (key, value) in &self.config.env {
            cmd.env(key, expand_env(value));
        }

        let workspace = task
            .context
            .get("workspace")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .or_else(|| self.config.working_dir.clone());
        if let Some(dir) = workspace {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl AgentWrapper for ShellWrapper {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn binary(&self) -> &str {
        &self.config.command
    }

    fn capabilities(&self) -> &[String] {
        &self.config.capabilities
    }

    async fn execute(&self, task: &AgentTask) -> AgentResult {
        let start = Instant::now();
        let mut cmd = self.build_command(task);

        debug!(agent_id = %self.config.id, command = %self.config.command, "Executing shell agent");

        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(agent_id = %self.config.id, error = %e, "Failed to spawn agent");
                return AgentResult::failure(
                    &self.config.id,
                    "",
                    format!("failed to spawn '{}': {}", self.config.command, e),
                    elapsed_ms(start),
                );
            }
            Err(_) => {
                warn!(agent_id = %self.config.id, timeout_secs = self.config.timeout_seconds, "Agent timed out");
                return AgentResult::failure(
                    &self.config.id,
                    "",
                    format!("timed out after {}s", self.config.timeout_seconds),
                    elapsed_ms(start),
                );
            }
        };

        let duration_ms = elapsed_ms(start);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            debug!(agent_id = %self.config.id, duration_ms, "Shell agent completed");
            AgentResult::success(&self.config.id, stdout, duration_ms)
        } else {
            let detail = if stderr.trim().is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            };
            warn!(agent_id = %self.config.id, status = %output.status, "Shell agent failed");
            AgentResult::failure(&self.config.id, stdout, detail, duration_ms)
        }
    }

    fn execute_stream(&self, task: &AgentTask) -> ChunkStream {
        let header = stream_header(&self.config.name);
        let mut cmd = self.build_command(task);
        cmd.stdout(Stdio::piped()).stderr(Stdio::null());
        let name = self.config.name.clone();

        let body = stream::once(async move { spawn_line_stream(cmd, name) }).flatten();
        stream::once(future::ready(header)).chain(body).boxed()
    }

    async fn health(&self) -> bool {
        self.version().await.is_some()
    }

    async fn version(&self) -> Option<String> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.version_args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(VERSION_PROBE_TIMEOUT, cmd.output())
            .await
            .ok()?
            .ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
    }
}

/// Spawn the command and stream its stdout line by line
fn spawn_line_stream(mut cmd: Command, name: String) -> ChunkStream {
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return stream::once(future::ready(format!("[{}] Error: {}\n", name, e))).boxed();
        }
    };
    let Some(stdout) = child.stdout.take() else {
        return stream::once(future::ready(format!("[{}] Error: stdout unavailable\n", name)))
            .boxed();
    };

    let lines = BufReader::new(stdout).lines();
    stream::unfold(Some((lines, child, name)), |state| async move {
        let (mut lines, mut child, name) = state?;
        match lines.next_line().await {
            Ok(Some(line)) => Some((format!("{}\n", line), Some((lines, child, name)))),
            Ok(None) | Err(_) => match child.wait().await {
                Ok(status) if !status.success() => {
                    Some((format!("[{}] exited with {}\n", name, status), None))
                }
                Err(e) => Some((format!("[{}] Error: {}\n", name, e), None)),
                Ok(_) => None,
            },
        }
    })
    .boxed()
}

pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests;
