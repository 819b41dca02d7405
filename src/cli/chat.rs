//! Interactive chat session
//!
//! Reads prompts line by line from stdin. Slash commands:
//! `/history`, `/clear`, `/status` (health, metrics and routing), `/quit`.

use crate::app::App;
use pi_core::ChatRole;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(mut app: App) -> anyhow::Result<()> {
    app.failover.start_health_checks(app.monitor.clone());

    println!("Pi Builder chat (session {})", app.service.session_id());
    println!("Agents: {}", app.orchestrator().ids().join(", "));
    println!("Type /quit to exit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" | "/exit" => break,
            "/clear" => {
                app.service.clear_history();
                println!("History cleared.");
            }
            "/history" => print_history(&app),
            "/status" => print_status(&app),
            prompt => {
                let turn = app.service.process_message(prompt).await;
                let result = &turn.agent_result;
                println!(
                    "[{} · {} · {}ms]\n{}\n",
                    result.agent, result.status, result.duration_ms, turn.message.content
                );
            }
        }
    }

    app.failover.stop_health_checks();
    Ok(())
}

fn print_history(app: &App) {
    for message in app.service.history() {
        let who = match message.role {
            ChatRole::User => "you".to_string(),
            ChatRole::Assistant => message.agent.clone().unwrap_or_default(),
        };
        println!("{} {:>12}: {}", message.timestamp.format("%H:%M:%S"), who, message.content);
    }
}

fn print_status(app: &App) {
    let stats = app.failover.statistics();
    println!(
        "Providers: {}/{} healthy, {} blacklisted, {} failures",
        stats.healthy_providers, stats.total_providers, stats.blacklisted_providers, stats.total_failures
    );
    for metrics in app.monitor.compare_providers() {
        println!(
            "  {:<14} requests={:<4} availability={:.2} p95={}ms",
            metrics.provider, metrics.request_count, metrics.availability, metrics.latency.p95
        );
    }
    print_routing(app);
}

fn print_routing(app: &App) {
    match app.recommend() {
        Ok((decision, chain)) => {
            println!("Routing ({}): {} [{}]", app.strategy, decision.provider, decision.reason);
            println!("  chain: {}", chain.iter().collect::<Vec<_>>().join(" -> "));
        }
        Err(e) => println!("Routing ({}): {}", app.strategy, e),
    }
    let stats = app.router.statistics();
    if let Some(top) = stats.most_selected {
        println!("  {} decisions, most selected: {}", stats.total_decisions, top);
    }
}
