// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Facade handle tests against a missing adapter binary.

use super::*;

fn config_for(command: &[&str]) -> AgentConfig {
    AgentConfig {
        agent_command: command.iter().map(|s| s.to_string()).collect(),
        cwd: std::env::temp_dir(),
        permission_mode: "default".to_string(),
        non_interactive_permissions: None,
        suppress_sdk_console_errors: true,
    }
}

#[tokio::test]
async fn start_fails_cleanly_when_adapter_binary_is_missing() {
    let err = AgentClient::start(config_for(&["/nonexistent/acpx-test-adapter"]))
        .await
        .unwrap_err();

    // Spawn failure surfaces through the Initialize reply, not a panic.
    match err {
        AgentError::Acp(message) => assert!(message.contains("spawn"), "got: {message}"),
        AgentError::Spawn(_) | AgentError::WorkerGone => {}
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn start_fails_cleanly_on_empty_command() {
    let err = AgentClient::start(config_for(&[])).await.unwrap_err();

    match err {
        AgentError::Acp(message) => assert!(message.contains("empty agent command")),
        AgentError::WorkerGone => {}
        other => panic!("unexpected error: {other:?}"),
    }
}
