//! End-to-end process tests against real `sh` children.

#![cfg(unix)]

mod common;

use agentwire_core::{
    AgentwireError, EventReceiver, ProcessManager, ProcessManagerConfig, PromptDelivery, RunCommandConfig, SpawnConfig,
};
use agentwire_types::{AgentErrorKind, ProcessEvent, ToolType};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

fn sh(session_id: &str, tool_type: ToolType, script: &str) -> SpawnConfig {
    let mut config = SpawnConfig::new(session_id, tool_type, "/bin/sh", std::env::temp_dir());
    config.args = vec!["-c".to_string(), script.to_string()];
    config
}

/// Collect events for `session_id` until its `exit` event.
async fn until_exit(rx: &mut EventReceiver, session_id: &str) -> Vec<ProcessEvent> {
    let collect = async {
        let mut events = Vec::new();
        loop {
            match rx.recv().await {
                Some(event) if event.session_id() == session_id => {
                    let done = event.is_exit();
                    events.push(event);
                    if done {
                        return events;
                    }
                }
                Some(_) => {}
                None => return events,
            }
        }
    };
    tokio::time::timeout(TIMEOUT, collect)
        .await
        .unwrap_or_else(|_| panic!("Session {} did not exit in time", session_id))
}

fn all_data(events: &[ProcessEvent]) -> String {
    common::data_texts(events).concat()
}

fn exit_code(events: &[ProcessEvent]) -> i32 {
    match events.last() {
        Some(ProcessEvent::Exit { exit_code, .. }) => *exit_code,
        other => panic!("Expected exit event last, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stream_json_child_end_to_end() {
    let manager = ProcessManager::default();
    let mut rx = manager.subscribe();

    let script = r#"printf '%s\n' '{"type":"thread.started","thread_id":"t-1"}' '{"type":"item.completed","item":{"id":"i0","type":"agent_message","text":"hello"}}' '{"type":"turn.completed","usage":{"input_tokens":5,"cached_input_tokens":0,"output_tokens":2}}'"#;
    let mut config = sh("s1", ToolType::Codex, script);
    config.stream_json_output = true;

    let result = manager.spawn(config).await.unwrap();
    assert!(result.pid.is_some());

    let events = until_exit(&mut rx, "s1").await;
    assert_eq!(all_data(&events), "hello");
    assert_eq!(exit_code(&events), 0);
    assert!(events.iter().any(|e| matches!(
        e,
        ProcessEvent::SessionId { agent_session_id, .. } if agent_session_id == "t-1"
    )));
    assert!(!manager.is_active("s1"));
}

#[tokio::test]
async fn test_failing_child_reports_stderr_and_crash() {
    let manager = ProcessManager::default();
    let mut rx = manager.subscribe();

    let mut config = sh("s2", ToolType::Codex, "echo 'something broke' >&2; exit 3");
    config.stream_json_output = true;
    manager.spawn(config).await.unwrap();

    let events = until_exit(&mut rx, "s2").await;
    assert_eq!(exit_code(&events), 3);
    let stderr: String = events
        .iter()
        .filter_map(|e| match e {
            ProcessEvent::Stderr { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(stderr, "something broke\n");

    let errors: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ProcessEvent::AgentError { error, .. } => Some(error),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, AgentErrorKind::AgentCrashed);
    assert_eq!(errors[0].raw.as_deref(), Some("something broke"));
}

#[tokio::test]
async fn test_prompt_over_stdin_in_batch_mode() {
    let manager = ProcessManager::default();
    let mut rx = manager.subscribe();

    let mut config = sh("s3", ToolType::Codex, "cat");
    config.prompt = Some("summarise the diff".into());
    config.prompt_delivery = PromptDelivery::Stdin;
    manager.spawn(config).await.unwrap();

    // stdin is closed after the prompt, so `cat` exits on its own.
    let events = until_exit(&mut rx, "s3").await;
    assert_eq!(all_data(&events), "summarise the diff\n");
    assert_eq!(exit_code(&events), 0);
}

#[tokio::test]
async fn test_write_to_interactive_child() {
    let manager = ProcessManager::default();
    let mut rx = manager.subscribe();

    manager.spawn(sh("s4", ToolType::Codex, "head -n 1")).await.unwrap();
    assert!(manager.is_active("s4"));
    assert!(manager.write("s4", b"ping\n").unwrap());

    let events = until_exit(&mut rx, "s4").await;
    assert_eq!(all_data(&events), "ping\n");
    assert_eq!(exit_code(&events), 0);
}

#[tokio::test]
async fn test_kill_reports_signal_exit() {
    let manager = ProcessManager::default();
    let mut rx = manager.subscribe();

    manager.spawn(sh("s5", ToolType::Codex, "exec sleep 30")).await.unwrap();
    assert!(manager.kill("s5").unwrap());

    let events = until_exit(&mut rx, "s5").await;
    assert_eq!(exit_code(&events), -1);
    assert!(!manager.is_active("s5"));
}

#[tokio::test]
async fn test_interrupt_child() {
    let manager = ProcessManager::default();
    let mut rx = manager.subscribe();

    manager.spawn(sh("s6", ToolType::Codex, "exec sleep 30")).await.unwrap();
    assert!(manager.interrupt("s6").unwrap());

    let events = until_exit(&mut rx, "s6").await;
    assert_eq!(exit_code(&events), -1);
}

#[tokio::test]
async fn test_duplicate_session_rejected() {
    let manager = ProcessManager::default();
    let mut rx = manager.subscribe();

    manager.spawn(sh("dup", ToolType::Codex, "exec sleep 30")).await.unwrap();
    let err = manager.spawn(sh("dup", ToolType::Codex, "true")).await.unwrap_err();
    assert!(matches!(err, AgentwireError::SessionAlreadyExists(id) if id == "dup"));
    assert_eq!(manager.active_sessions(), vec!["dup".to_string()]);

    manager.kill("dup").unwrap();
    until_exit(&mut rx, "dup").await;
    assert!(manager.active_sessions().is_empty());
}

#[tokio::test]
async fn test_run_command() {
    let manager = ProcessManager::default();
    let mut rx = manager.subscribe();

    let mut config = RunCommandConfig::new("cmd", "echo out; echo err >&2; exit 4", std::env::temp_dir());
    config.shell = Some("/bin/sh".into());
    let code = manager.run_command(config).await.unwrap();
    assert_eq!(code, 4);

    let events = until_exit(&mut rx, "cmd").await;
    assert_eq!(all_data(&events), "out\n");
    assert!(events
        .iter()
        .any(|e| matches!(e, ProcessEvent::Stderr { text, .. } if text == "err\n")));
    assert_eq!(exit_code(&events), 4);
}

#[tokio::test]
async fn test_terminal_session_in_pty() {
    let manager = ProcessManager::default();
    let mut rx = manager.subscribe();

    let mut config = SpawnConfig::new("pty", ToolType::Terminal, "", std::env::temp_dir());
    config.shell = Some("/bin/sh".into());
    config.args = vec!["-c".into(), "echo pty-ok".into()];
    manager.spawn(config).await.unwrap();

    let events = until_exit(&mut rx, "pty").await;
    assert!(all_data(&events).contains("pty-ok"));
    assert_eq!(exit_code(&events), 0);
    assert!(!manager.resize("pty", 100, 40).unwrap());
}

#[tokio::test]
async fn test_run_command_cannot_reuse_live_session_id() {
    let manager = ProcessManager::default();
    let mut rx = manager.subscribe();

    manager.spawn(sh("live", ToolType::Codex, "sleep 1; echo late")).await.unwrap();

    let mut config = RunCommandConfig::new("live", "true", std::env::temp_dir());
    config.shell = Some("/bin/sh".into());
    let err = manager.run_command(config).await.unwrap_err();
    assert!(matches!(err, AgentwireError::SessionAlreadyExists(id) if id == "live"));
    assert!(manager.is_active("live"));

    let events = until_exit(&mut rx, "live").await;
    assert_eq!(all_data(&events), "late\n");
    assert_eq!(events.iter().filter(|e| e.is_exit()).count(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    while let Ok(event) = rx.try_recv() {
        assert!(!(event.is_exit() && event.session_id() == "live"), "second exit for live session");
    }
}

#[tokio::test]
async fn test_idle_stdout_is_flushed_before_exit() {
    let manager = ProcessManager::new(ProcessManagerConfig {
        flush_interval: Duration::from_millis(50),
        ..Default::default()
    });
    let mut rx = manager.subscribe();

    manager
        .spawn(sh("idle", ToolType::Codex, "printf a; sleep 0.5; printf b"))
        .await
        .unwrap();

    let collect = async {
        let mut timeline = Vec::new();
        while let Some(event) = rx.recv().await {
            if event.session_id() != "idle" {
                continue;
            }
            let done = event.is_exit();
            timeline.push((std::time::Instant::now(), event));
            if done {
                break;
            }
        }
        timeline
    };
    let timeline = tokio::time::timeout(TIMEOUT, collect).await.expect("session did not exit");

    let data: Vec<_> = timeline
        .iter()
        .filter_map(|(at, e)| match e {
            ProcessEvent::Data { text, .. } => Some((*at, text.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(data.iter().map(|(_, t)| *t).collect::<Vec<_>>(), vec!["a", "b"]);

    let (exited_at, last) = timeline.last().unwrap();
    assert!(last.is_exit());
    // "a" went out while the child was still sleeping.
    assert!(exited_at.duration_since(data[0].0) >= Duration::from_millis(300));
}
