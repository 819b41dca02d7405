//! CLI module for Pi Builder
//!
//! Provides commands:
//! - `run`: send one prompt through the middleware pipeline
//! - `stream`: stream one prompt's output
//! - `chat`: interactive session
//! - `agents` / `health`: inspect registered agents

use crate::{app, config};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod agents;
pub mod chat;
pub mod run;

/// Pi Builder CLI
#[derive(Parser, Debug)]
#[command(name = "pi")]
#[command(about = "Multi-agent orchestrator for coding agents")]
#[command(version)]
pub struct Cli {
    /// Extra configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single prompt
    Run {
        /// Prompt text
        prompt: String,
        /// Required capability (e.g. bug-fixing)
        #[arg(long)]
        capability: Option<String>,
        /// Send to this agent, bypassing selection
        #[arg(long)]
        agent: Option<String>,
        /// Print the full turn as JSON
        #[arg(long)]
        json: bool,
    },
    /// Stream a single prompt's output
    Stream {
        /// Prompt text
        prompt: String,
        /// Required capability
        #[arg(long)]
        capability: Option<String>,
    },
    /// Interactive chat session
    Chat,
    /// List agents with health and version
    Agents,
    /// Probe agent health
    Health,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    };

    let config = config::load_config(cli.config.as_deref())?;
    let app = app::build(&config)?;

    match command {
        Commands::Run {
            prompt,
            capability,
            agent,
            json,
        } => run::run(app, prompt, capability, agent, json).await,
        Commands::Stream { prompt, capability } => run::stream(app, prompt, capability).await,
        Commands::Chat => chat::run(app).await,
        Commands::Agents => agents::list(app).await,
        Commands::Health => agents::health(app).await,
    }
}
