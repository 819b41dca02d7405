//! Integration tests for Pi Builder
//!
//! These tests verify the integration between the workspace crates:
//! - pi-agents: wrappers and capability-based orchestration
//! - pi-routing: monitoring, failover and provider routing
//! - pi-core: middleware-pipelined chat sessions

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use pi_agents::{
    AgentStatus, AgentTask, MockWrapper, WrapperOrchestrator, WrapperOrchestratorConfig,
    MIDDLEWARE_AGENT_ID, NO_AGENT_ID,
};
use pi_core::{
    middleware_fn, ChatRole, MentionRouter, MiddlewareAction, OrchestratorService, PromptGuard,
    ServiceEvent,
};
use pi_routing::{
    FailoverConfig, FailoverManager, ProviderMonitor, ProviderRouter, ProviderSelectionCriteria,
    ProviderStatus, RoutingError, RoutingStrategy,
};

fn orchestrator(fallback: bool) -> Arc<WrapperOrchestrator> {
    Arc::new(WrapperOrchestrator::new(
        WrapperOrchestratorConfig::default().with_fallback(fallback),
    ))
}

// ============================================================================
// Orchestration
// ============================================================================

#[tokio::test]
async fn test_capability_selects_matching_agent() {
    let orchestrator = orchestrator(false);
    let writer = Arc::new(MockWrapper::new("writer").with_capabilities(["code-generation"]));
    let fixer = Arc::new(
        MockWrapper::new("fixer")
            .with_capabilities(["bug-fixing"])
            .with_output("patched"),
    );
    orchestrator.register(writer.clone());
    orchestrator.register(fixer.clone());

    let mut service = OrchestratorService::new(orchestrator);
    let turn = service
        .process_task(AgentTask::new("fix the crash").with_capability("bug-fixing"))
        .await;

    assert_eq!(turn.agent_result.agent, "fixer");
    assert_eq!(turn.message.content, "patched");
    assert_eq!(writer.call_count(), 0);
}

#[tokio::test]
async fn test_fallback_to_next_agent() {
    let orchestrator = orchestrator(true);
    let broken = Arc::new(MockWrapper::new("broken").failing());
    let backup = Arc::new(MockWrapper::new("backup").with_output("recovered"));
    orchestrator.register(broken.clone());
    orchestrator.register(backup.clone());

    let mut service = OrchestratorService::new(orchestrator);
    let turn = service.process_message("build it").await;

    assert_eq!(turn.agent_result.status, AgentStatus::Success);
    assert_eq!(turn.agent_result.agent, "backup");
    assert_eq!(broken.call_count(), 1);
    assert_eq!(backup.call_count(), 1);
}

#[tokio::test]
async fn test_no_agent_when_nothing_qualifies() {
    let orchestrator = orchestrator(true);
    orchestrator.register(Arc::new(MockWrapper::new("sick").unhealthy()));

    let mut service = OrchestratorService::new(orchestrator.clone());
    let turn = service.process_message("hello").await;
    assert_eq!(turn.agent_result.agent, NO_AGENT_ID);

    let chunks: Vec<String> = orchestrator
        .execute_stream(&AgentTask::new("hello"))
        .await
        .collect()
        .await;
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].starts_with("[none]"));
}

#[tokio::test]
async fn test_stream_starts_with_header() {
    let orchestrator = orchestrator(false);
    orchestrator.register(Arc::new(
        MockWrapper::new("coder").with_name("Coder").with_output("fn main() {}"),
    ));

    let chunks: Vec<String> = orchestrator
        .execute_stream(&AgentTask::new("write main"))
        .await
        .collect()
        .await;
    assert_eq!(chunks, vec!["[Coder] Starting...\n", "fn main() {}"]);
}

// ============================================================================
// Middleware pipeline
// ============================================================================

#[tokio::test]
async fn test_mention_routes_to_named_agent() {
    let orchestrator = orchestrator(false);
    let general = Arc::new(MockWrapper::new("general"));
    let special = Arc::new(MockWrapper::new("special-agent").with_output("on it"));
    orchestrator.register(general.clone());
    orchestrator.register(special.clone());

    let mut service = OrchestratorService::new(orchestrator.clone());
    service.use_middleware(Arc::new(MentionRouter::new(orchestrator)));

    let turn = service.process_message("@special-agent refactor auth").await;

    assert_eq!(turn.agent_result.agent, "special-agent");
    assert_eq!(special.prompts(), vec!["refactor auth"]);
    assert_eq!(general.call_count(), 0);
}

#[tokio::test]
async fn test_guard_blocks_before_dispatch() {
    let orchestrator = orchestrator(false);
    let coder = Arc::new(MockWrapper::new("coder"));
    orchestrator.register(coder.clone());

    let mut service = OrchestratorService::new(orchestrator);
    service.use_middleware(Arc::new(
        PromptGuard::new(["(?i)api[_-]?key"], Some(1000)).unwrap(),
    ));
    let mut events = service.subscribe();

    let turn = service.process_message("here is my API_KEY=abc").await;

    assert_eq!(turn.agent_result.agent, MIDDLEWARE_AGENT_ID);
    assert_eq!(coder.call_count(), 0);
    assert_eq!(service.history().len(), 1);

    assert!(matches!(
        events.recv().await.unwrap(),
        ServiceEvent::UserMessage { .. }
    ));
    assert!(matches!(events.recv().await.unwrap(), ServiceEvent::Error { .. }));
}

#[tokio::test]
async fn test_session_history_across_turns() {
    let orchestrator = orchestrator(false);
    orchestrator.register(Arc::new(MockWrapper::new("coder")));

    let mut service = OrchestratorService::new(orchestrator);
    service.use_middleware(middleware_fn(|prompt, _| {
        MiddlewareAction::transform(prompt.trim().to_string())
    }));
    let session = service.session_id().to_string();
    let mut events = service.subscribe();

    service.process_message("  first  ").await;
    service.process_message("second").await;

    let roles: Vec<_> = service.history().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            ChatRole::User,
            ChatRole::Assistant,
            ChatRole::User,
            ChatRole::Assistant
        ]
    );
    assert_eq!(service.history()[0].content, "  first  ");

    while let Ok(event) = events.try_recv() {
        assert_eq!(event.session_id(), session);
    }
}

// ============================================================================
// Routing and failover
// ============================================================================

#[tokio::test]
async fn test_failing_agent_is_blacklisted() {
    let orchestrator = orchestrator(false);
    let flaky = Arc::new(MockWrapper::new("flaky").failing());
    let steady = Arc::new(MockWrapper::new("steady"));
    orchestrator.register(flaky.clone());
    orchestrator.register(steady.clone());

    let failover = Arc::new(FailoverManager::new(
        FailoverConfig::default().with_failure_threshold(2),
    ));
    let mut service = OrchestratorService::new(orchestrator).with_failover(failover.clone());

    service.process_message("one").await;
    service.process_message("two").await;
    assert_eq!(failover.state("flaky").unwrap().status, ProviderStatus::Offline);

    let turn = service.process_message("three").await;
    assert_eq!(turn.agent_result.agent, "steady");
    assert_eq!(flaky.call_count(), 2);
}

#[tokio::test]
async fn test_failing_agent_is_blacklisted_with_fallback() {
    let orchestrator = orchestrator(true);
    let flaky = Arc::new(MockWrapper::new("flaky").failing());
    let steady = Arc::new(MockWrapper::new("steady"));
    orchestrator.register(flaky.clone());
    orchestrator.register(steady.clone());

    let monitor = Arc::new(ProviderMonitor::default());
    let failover = Arc::new(FailoverManager::new(
        FailoverConfig::default().with_failure_threshold(2),
    ));
    let mut service = OrchestratorService::new(orchestrator)
        .with_monitor(monitor.clone())
        .with_failover(failover.clone());

    for _ in 0..5 {
        let turn = service.process_message("ship it").await;
        assert_eq!(turn.agent_result.agent, "steady");
    }

    assert_eq!(flaky.call_count(), 2);
    assert_eq!(failover.state("flaky").unwrap().status, ProviderStatus::Offline);
    assert_eq!(monitor.latest_metrics("flaky").unwrap().error_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_blacklist_expires() {
    let failover = FailoverManager::new(
        FailoverConfig::default()
            .with_failure_threshold(1)
            .with_blacklist_duration(Duration::from_secs(60)),
    );
    failover.register_provider("openai");
    failover.record_failure("openai", "timeout");
    assert!(!failover.is_provider_available("openai"));

    tokio::time::advance(Duration::from_secs(61)).await;

    assert!(failover.is_provider_available("openai"));
    assert_eq!(failover.state("openai").unwrap().status, ProviderStatus::Degraded);
}

#[tokio::test]
async fn test_router_fails_over_along_chain() {
    let monitor = Arc::new(ProviderMonitor::default());
    for _ in 0..5 {
        monitor.record_request("fast", 100, true, 50, 0.001);
        monitor.record_request("slow", 400, true, 50, 0.001);
    }
    let failover = Arc::new(FailoverManager::new(FailoverConfig::default()));
    let router = ProviderRouter::new(monitor).with_failover(failover.clone());
    router.register_provider(pi_routing::ProviderInfo::new("fast", "Fast"));
    router.register_provider(pi_routing::ProviderInfo::new("slow", "Slow"));

    let chain = router
        .build_failover_chain(&ProviderSelectionCriteria::new(RoutingStrategy::LatencyOptimal))
        .unwrap();
    assert_eq!(chain.primary, "fast");

    let answer = router
        .execute_with_failover(&chain, |provider| async move {
            if provider == "fast" {
                Err("connection reset")
            } else {
                Ok(format!("answered by {}", provider))
            }
        })
        .await
        .unwrap();

    assert_eq!(answer, "answered by slow");
    assert_eq!(failover.state("fast").unwrap().consecutive_failures, 1);
    assert_eq!(router.history(1)[0].provider, "slow");
}

#[tokio::test]
async fn test_router_reports_exhausted_chain() {
    let router = ProviderRouter::new(Arc::new(ProviderMonitor::default()));
    router.register_provider(pi_routing::ProviderInfo::new("only", "Only"));

    let chain = router
        .build_failover_chain(&ProviderSelectionCriteria::default())
        .unwrap();
    let err = router
        .execute_with_failover(&chain, |_| async { Err::<(), _>("down") })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RoutingError::AllProvidersFailed {
            attempts: 1,
            last_error: "down".to_string(),
        }
    );
}
