use super::*;
use crate::mock::MockWrapper;
use crate::task::AgentStatus;

fn orchestrator() -> WrapperOrchestrator {
    WrapperOrchestrator::new(WrapperOrchestratorConfig::default())
}

#[test]
fn test_register_replaces_in_place() {
    let orch = orchestrator();
    orch.register(Arc::new(MockWrapper::new("a").with_name("First")));
    orch.register(Arc::new(MockWrapper::new("b")));
    orch.register(Arc::new(MockWrapper::new("a").with_name("Second")));

    assert_eq!(orch.ids(), vec!["a", "b"]);
    assert_eq!(orch.get_wrapper("a").unwrap().name(), "Second");
}

#[test]
fn test_unregister() {
    let orch = orchestrator();
    orch.register(Arc::new(MockWrapper::new("a")));

    assert!(orch.unregister("a"));
    assert!(!orch.unregister("a"));
    assert!(orch.get_wrapper("a").is_none());
}

#[tokio::test]
async fn test_select_by_capability() {
    let orch = orchestrator();
    orch.register(Arc::new(
        MockWrapper::new("writer").with_capabilities(["code-generation"]),
    ));
    orch.register(Arc::new(
        MockWrapper::new("fixer").with_capabilities(["bug-fixing"]),
    ));

    let task = AgentTask::new("fix it").with_capability("bug-fixing");
    let selected = orch.select_for_task(&task).await.unwrap();
    assert_eq!(selected.id(), "fixer");

    let task = AgentTask::new("translate").with_capability("translation");
    assert!(orch.select_for_task(&task).await.is_none());
}

#[tokio::test]
async fn test_unhealthy_wrappers_are_skipped() {
    let orch = orchestrator();
    orch.register(Arc::new(MockWrapper::new("down").unhealthy()));
    orch.register(Arc::new(MockWrapper::new("up")));

    let selected = orch.select_for_task(&AgentTask::new("x")).await.unwrap();
    assert_eq!(selected.id(), "up");

    let available: Vec<String> = orch
        .available_agents()
        .await
        .iter()
        .map(|w| w.id().to_string())
        .collect();
    assert_eq!(available, vec!["up"]);
}

#[tokio::test]
async fn test_preferred_agents_order() {
    let orch = WrapperOrchestrator::new(
        WrapperOrchestratorConfig::default().with_preferred_agents(["c", "b"]),
    );
    for id in ["a", "b", "c"] {
        orch.register(Arc::new(MockWrapper::new(id)));
    }

    let selected = orch.select_for_task(&AgentTask::new("x")).await.unwrap();
    assert_eq!(selected.id(), "c");
}

#[tokio::test(start_paused = true)]
async fn test_health_cache_reuses_result_within_ttl() {
    let orch = WrapperOrchestrator::new(
        WrapperOrchestratorConfig::default().with_health_cache_ttl(Duration::from_secs(30)),
    );
    let mock = Arc::new(MockWrapper::new("a"));
    orch.register(mock.clone());

    assert!(orch.is_healthy(mock.as_ref()).await);
    mock.set_healthy(false);
    assert!(orch.is_healthy(mock.as_ref()).await);
    assert_eq!(mock.health_check_count(), 1);

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(!orch.is_healthy(mock.as_ref()).await);
    assert_eq!(mock.health_check_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_probe_counts_as_unhealthy() {
    let orch = orchestrator();
    let mock = Arc::new(MockWrapper::new("slow").with_health_delay(Duration::from_secs(10)));
    orch.register(mock.clone());

    assert!(!orch.is_healthy(mock.as_ref()).await);
}

#[tokio::test(start_paused = true)]
async fn test_check_health_bypasses_cache() {
    let orch = orchestrator();
    let mock = Arc::new(MockWrapper::new("a"));
    orch.register(mock.clone());

    assert!(orch.is_healthy(mock.as_ref()).await);
    mock.set_healthy(false);

    let report = orch.check_health().await;
    assert_eq!(report.get("a"), Some(&false));
    assert!(!orch.is_healthy(mock.as_ref()).await);
    assert_eq!(mock.health_check_count(), 2);
}

#[tokio::test]
async fn test_execute_without_agents_returns_none() {
    let orch = orchestrator();
    let result = orch
        .execute(&AgentTask::new("x").with_capability("bug-fixing"))
        .await;

    assert_eq!(result.agent, NO_AGENT_ID);
    assert_eq!(result.status, AgentStatus::Error);
    assert!(result.output.contains("bug-fixing"));
}

#[tokio::test]
async fn test_fallback_uses_next_wrapper() {
    let orch = WrapperOrchestrator::new(WrapperOrchestratorConfig::default().with_fallback(true));
    let broken = Arc::new(MockWrapper::new("broken").failing());
    let backup = Arc::new(MockWrapper::new("backup").with_output("recovered"));
    orch.register(broken.clone());
    orch.register(backup.clone());

    let result = orch.execute(&AgentTask::new("x")).await;

    assert_eq!(result.status, AgentStatus::Success);
    assert_eq!(result.agent, "backup");
    assert_eq!(result.output, "recovered");
    assert_eq!(broken.call_count(), 1);
    assert_eq!(backup.call_count(), 1);
}

#[tokio::test]
async fn test_no_fallback_returns_first_failure() {
    let orch = orchestrator();
    let backup = Arc::new(MockWrapper::new("backup"));
    orch.register(Arc::new(MockWrapper::new("broken").failing()));
    orch.register(backup.clone());

    let result = orch.execute(&AgentTask::new("x")).await;

    assert_eq!(result.agent, "broken");
    assert_eq!(result.status, AgentStatus::Error);
    assert_eq!(backup.call_count(), 0);
}

#[tokio::test]
async fn test_fallback_exhaustion_returns_last_failure() {
    let orch = WrapperOrchestrator::new(WrapperOrchestratorConfig::default().with_fallback(true));
    let first = Arc::new(MockWrapper::new("first").failing());
    let second = Arc::new(MockWrapper::new("second").failing());
    orch.register(first.clone());
    orch.register(second.clone());

    let result = orch.execute(&AgentTask::new("x")).await;

    assert_eq!(result.agent, "second");
    assert_eq!(result.status, AgentStatus::Error);
    assert_eq!(first.call_count(), 1);
    assert_eq!(second.call_count(), 1);
}

#[tokio::test]
async fn test_execute_attempts_keeps_fallback_failures() {
    let orch = WrapperOrchestrator::new(WrapperOrchestratorConfig::default().with_fallback(true));
    orch.register(Arc::new(MockWrapper::new("broken").failing()));
    orch.register(Arc::new(MockWrapper::new("backup")));

    let attempts = orch.execute_attempts(&AgentTask::new("x")).await;

    let outcomes: Vec<_> = attempts.iter().map(|r| (r.agent.as_str(), r.status)).collect();
    assert_eq!(
        outcomes,
        vec![("broken", AgentStatus::Error), ("backup", AgentStatus::Success)]
    );
}

#[tokio::test]
async fn test_execute_attempts_without_agents() {
    let orch = orchestrator();
    let attempts = orch.execute_attempts(&AgentTask::new("x")).await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].agent, NO_AGENT_ID);
}

#[tokio::test]
async fn test_availability_gate_vetoes_selection() {
    let orch = orchestrator();
    orch.register(Arc::new(MockWrapper::new("blocked")));
    orch.register(Arc::new(MockWrapper::new("allowed")));
    orch.set_availability_gate(Arc::new(|id: &str| id != "blocked"));

    let selected = orch.select_for_task(&AgentTask::new("x")).await.unwrap();
    assert_eq!(selected.id(), "allowed");
}

#[tokio::test]
async fn test_execute_stream_forwards_wrapper_chunks() {
    let orch = orchestrator();
    orch.register(Arc::new(
        MockWrapper::new("a").with_name("Alpha").with_output("hello"),
    ));

    let chunks: Vec<String> = orch
        .execute_stream(&AgentTask::new("x"))
        .await
        .collect()
        .await;
    assert_eq!(chunks, vec!["[Alpha] Starting...\n", "hello"]);
}

#[tokio::test]
async fn test_execute_stream_without_agent() {
    let orch = orchestrator();
    let chunks: Vec<String> = orch
        .execute_stream(&AgentTask::new("x"))
        .await
        .collect()
        .await;

    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].starts_with("[none]"));
}
