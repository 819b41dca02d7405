use super::*;
use crate::task::AgentStatus;
use futures::StreamExt;

fn args_of(cmd: &Command) -> Vec<String> {
    cmd.as_std()
        .get_args()
        .map(|a| a.to_string_lossy().to_string())
        .collect()
}

#[test]
fn test_presets_are_valid() {
    let presets = ShellConfig::presets();
    assert_eq!(presets.len(), 6);
    for preset in &presets {
        assert!(preset.validate().is_ok(), "preset {} invalid", preset.id);
    }
}

#[test]
fn test_aider_preset() {
    let config = ShellConfig::aider();
    assert_eq!(config.command, "aider");
    assert_eq!(config.prompt_flag.as_deref(), Some("--message"));
    assert!(config.capabilities.iter().any(|c| c == "git-aware"));
}

#[test]
fn test_validate_rejects_empty_command() {
    let config = ShellConfig::new("broken", "Broken", "  ");
    assert_eq!(
        config.validate(),
        Err(AgentConfigError::EmptyField {
            agent: "broken".to_string(),
            field: "command",
        })
    );
    assert!(ShellWrapper::new(config).is_err());
}

#[test]
fn test_validate_rejects_zero_timeout() {
    let config = ShellConfig::new("t", "T", "true").with_timeout(0);
    assert_eq!(
        config.validate(),
        Err(AgentConfigError::ZeroTimeout("t".to_string()))
    );
}

#[test]
fn test_build_command_positional_prompt() {
    let wrapper = ShellWrapper::new(ShellConfig::claude_code()).unwrap();
    let cmd = wrapper.build_command(&AgentTask::new("write a parser"));
    assert_eq!(args_of(&cmd), vec!["--print", "write a parser"]);
}

#[test]
fn test_build_command_flagged_prompt_with_persona() {
    let wrapper = ShellWrapper::new(ShellConfig::aider()).unwrap();
    let task = AgentTask::new("fix it").with_context("persona", serde_json::json!("You are terse."));
    let cmd = wrapper.build_command(&task);
    assert_eq!(
        args_of(&cmd),
        vec![
            "--yes-always",
            "--no-pretty",
            "--message",
            "You are terse.\n\nTask: fix it"
        ]
    );
}

#[test]
fn test_expand_env() {
    std::env::set_var("PI_SHELL_TEST_TOKEN", "secret");
    assert_eq!(expand_env("${PI_SHELL_TEST_TOKEN}"), "secret");
    assert_eq!(expand_env("literal"), "literal");
    assert_eq!(expand_env("${PI_SHELL_TEST_UNSET_VAR}"), "");
}

#[cfg(unix)]
#[tokio::test]
async fn test_execute_captures_stdout() {
    let wrapper = ShellWrapper::new(ShellConfig::new("echo", "Echo", "echo")).unwrap();
    let result = wrapper.execute(&AgentTask::new("hello agent")).await;

    assert_eq!(result.status, AgentStatus::Success);
    assert_eq!(result.agent, "echo");
    assert_eq!(result.output.trim(), "hello agent");
}

#[cfg(unix)]
#[tokio::test]
async fn test_execute_non_zero_exit_is_error_result() {
    let config =
        ShellConfig::new("failing", "Failing", "sh").with_args(["-c", "echo broken >&2; exit 3"]);
    let wrapper = ShellWrapper::new(config).unwrap();
    let result = wrapper.execute(&AgentTask::new("ignored")).await;

    assert_eq!(result.status, AgentStatus::Error);
    assert_eq!(result.stderr.as_deref().map(str::trim), Some("broken"));
}

#[tokio::test]
async fn test_execute_missing_binary_is_error_result() {
    let config = ShellConfig::new("ghost", "Ghost", "pi-definitely-not-installed-binary");
    let wrapper = ShellWrapper::new(config).unwrap();
    let result = wrapper.execute(&AgentTask::new("anything")).await;

    assert_eq!(result.status, AgentStatus::Error);
    assert!(result.stderr.unwrap().contains("failed to spawn"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_execute_timeout_is_error_result() {
    let config = ShellConfig::new("slow", "Slow", "sh")
        .with_args(["-c", "sleep 5"])
        .with_timeout(1);
    let wrapper = ShellWrapper::new(config).unwrap();
    let result = wrapper.execute(&AgentTask::new("wait")).await;

    assert_eq!(result.status, AgentStatus::Error);
    assert!(result.stderr.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_health_false_for_missing_binary() {
    let config = ShellConfig::new("ghost", "Ghost", "pi-definitely-not-installed-binary");
    let wrapper = ShellWrapper::new(config).unwrap();
    assert!(!wrapper.health().await);
    assert!(wrapper.version().await.is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn test_version_reads_first_line() {
    let mut config = ShellConfig::new("sh", "Shell", "sh");
    config.version_args = vec!["-c".to_string(), "printf '\\nv1.2.3\\nextra\\n'".to_string()];
    let wrapper = ShellWrapper::new(config).unwrap();
    assert_eq!(wrapper.version().await.as_deref(), Some("v1.2.3"));
    assert!(wrapper.health().await);
}

#[cfg(unix)]
#[tokio::test]
async fn test_stream_starts_with_header() {
    let wrapper = ShellWrapper::new(ShellConfig::new("echo", "Echo", "echo")).unwrap();
    let chunks: Vec<String> = wrapper
        .execute_stream(&AgentTask::new("streamed line"))
        .collect()
        .await;

    assert_eq!(chunks[0], "[Echo] Starting...\n");
    assert_eq!(chunks[1], "streamed line\n");
    assert_eq!(chunks.len(), 2);
}

#[tokio::test]
async fn test_stream_spawn_failure_yields_error_chunk() {
    let config = ShellConfig::new("ghost", "Ghost", "pi-definitely-not-installed-binary");
    let wrapper = ShellWrapper::new(config).unwrap();
    let chunks: Vec<String> = wrapper.execute_stream(&AgentTask::new("x")).collect().await;

    assert_eq!(chunks.len(), 2);
    assert!(chunks[1].starts_with("[Ghost] Error:"));
}
