//! Agent inspection commands

use crate::app::App;
use futures::future::join_all;

pub async fn list(app: App) -> anyhow::Result<()> {
    let orchestrator = app.orchestrator();
    let wrappers = orchestrator.wrappers();
    if wrappers.is_empty() {
        println!("No agents configured.");
        return Ok(());
    }

    let probes = wrappers.iter().map(|wrapper| async move {
        let healthy = orchestrator.is_healthy(wrapper.as_ref()).await;
        let version = wrapper.version().await;
        (healthy, version)
    });
    let results = join_all(probes).await;

    println!("{:<14} {:<16} {:<8} {:<20} CAPABILITIES", "ID", "NAME", "HEALTH", "VERSION");
    for (wrapper, (healthy, version)) in wrappers.iter().zip(results) {
        println!(
            "{:<14} {:<16} {:<8} {:<20} {}",
            wrapper.id(),
            wrapper.name(),
            if healthy { "✅" } else { "❌" },
            version.as_deref().unwrap_or("-"),
            wrapper.capabilities().join(", ")
        );
    }
    Ok(())
}

pub async fn health(app: App) -> anyhow::Result<()> {
    let mut report: Vec<_> = app.orchestrator().check_health().await.into_iter().collect();
    report.sort();

    for (id, healthy) in &report {
        println!("{} {}", if *healthy { "✅" } else { "❌" }, id);
    }

    let healthy = report.iter().filter(|(_, h)| *h).count();
    println!("\n{}/{} agents healthy", healthy, report.len());
    if let Ok((decision, chain)) = app.recommend() {
        println!(
            "Recommended ({}): {} | chain: {}",
            app.strategy,
            decision.provider,
            chain.iter().collect::<Vec<_>>().join(" -> ")
        );
    }
    if healthy == 0 {
        std::process::exit(1);
    }
    Ok(())
}
