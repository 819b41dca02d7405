//! One-shot prompt commands

use crate::app::App;
use anyhow::bail;
use futures::StreamExt;
use pi_agents::AgentTask;
use pi_core::{middleware_fn, MiddlewareAction};
use std::io::Write;

fn task(prompt: String, capability: Option<String>) -> AgentTask {
    match capability {
        Some(capability) => AgentTask::new(prompt).with_capability(capability),
        None => AgentTask::new(prompt),
    }
}

pub async fn run(
    mut app: App,
    prompt: String,
    capability: Option<String>,
    agent: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    if let Some(agent_id) = agent {
        // Appended last so configured guards still run first
        app.service.use_middleware(middleware_fn(move |_, _| {
            MiddlewareAction::route(agent_id.clone())
        }));
    }

    let turn = app.service.process_task(task(prompt, capability)).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&turn)?);
    } else {
        println!("{}", turn.message.content);
    }

    let result = &turn.agent_result;
    if !result.is_success() {
        bail!("[{}] {}", result.agent, result.stderr.as_deref().unwrap_or(&result.output));
    }
    Ok(())
}

pub async fn stream(app: App, prompt: String, capability: Option<String>) -> anyhow::Result<()> {
    let task = task(prompt, capability);
    let mut chunks = app.orchestrator().execute_stream(&task).await;

    let mut stdout = std::io::stdout();
    while let Some(chunk) = chunks.next().await {
        write!(stdout, "{}", chunk)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}
