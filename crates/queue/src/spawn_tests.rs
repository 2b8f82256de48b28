// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawn-or-attach unit tests

use super::*;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn spawn_opts() -> OwnerSpawnOptions {
    OwnerSpawnOptions {
        session_id: "sess01".to_string(),
        ttl_ms: Some(60_000),
        permission_mode: "default".to_string(),
        non_interactive_permissions: None,
        auth_policy: None,
        timeout_ms: None,
        verbose: false,
        suppress_sdk_console_errors: false,
    }
}

#[test]
fn owner_args_carry_required_flags() {
    let args = owner_args(&spawn_opts());

    assert_eq!(args[0], "__queue-owner");
    let joined = args.join(" ");
    assert!(joined.contains("--session-id sess01"));
    assert!(joined.contains("--permission-mode default"));
    assert!(joined.contains("--ttl-ms 60000"));
    assert!(!joined.contains("--verbose"));
    assert!(!joined.contains("--auth-policy"));
}

#[test]
fn owner_args_include_optionals_when_set() {
    let mut opts = spawn_opts();
    opts.non_interactive_permissions = Some("deny-writes".to_string());
    opts.auth_policy = Some("keychain".to_string());
    opts.timeout_ms = Some(9_000);
    opts.verbose = true;
    opts.suppress_sdk_console_errors = true;

    let joined = owner_args(&opts).join(" ");
    assert!(joined.contains("--non-interactive-permissions deny-writes"));
    assert!(joined.contains("--auth-policy keychain"));
    assert!(joined.contains("--timeout-ms 9000"));
    assert!(joined.contains("--verbose"));
    assert!(joined.contains("--suppress-sdk-console-errors"));
}

#[test]
fn parse_startup_error_finds_errors_after_last_marker() {
    let log = format!(
        "old noise\n\
         {marker}100) ---\n\
         2026-01-01T00:00:00Z ERROR acpx: Failed to start owner: old failure\n\
         {marker}200) ---\n\
         2026-01-01T00:01:00Z  INFO acpx: queue owner ready\n",
        marker = STARTUP_MARKER_PREFIX
    );
    assert!(parse_startup_error(&log).is_none());

    let log = format!(
        "{marker}300) ---\n\
         2026-01-01T00:02:00Z ERROR acpx: adapter binary not found\n",
        marker = STARTUP_MARKER_PREFIX
    );
    let parsed = parse_startup_error(&log).expect("should find error");
    assert!(parsed.contains("adapter binary not found"));
}

#[test]
fn parse_startup_error_without_marker_is_none() {
    assert!(parse_startup_error("ERROR something broke").is_none());
}

#[tokio::test]
#[serial(acpx_spawn)]
async fn attach_succeeds_once_owner_answers() {
    std::env::set_var("ACPX_OWNER_BINARY", "/bin/true");
    std::env::set_var("ACPX_SPAWN_DEADLINE_MS", "3000");
    std::env::set_var("ACPX_SPAWN_RETRY_MS", "50");

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in = Arc::clone(&calls);
    let result: Result<u32, QueueError> = attach_with_spawn(&spawn_opts(), move || {
        let calls = Arc::clone(&calls_in);
        async move {
            // "No owner" for the first two attempts, then attached.
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(None)
            } else {
                Ok(Some(7))
            }
        }
    })
    .await;

    std::env::remove_var("ACPX_OWNER_BINARY");
    std::env::remove_var("ACPX_SPAWN_DEADLINE_MS");
    std::env::remove_var("ACPX_SPAWN_RETRY_MS");

    assert_eq!(result.expect("attach failed"), 7);
    assert!(calls.load(Ordering::SeqCst) >= 3);
}

#[tokio::test]
#[serial(acpx_spawn)]
async fn attach_deadline_raises_not_accepting() {
    std::env::set_var("ACPX_OWNER_BINARY", "/bin/true");
    std::env::set_var("ACPX_SPAWN_DEADLINE_MS", "250");
    std::env::set_var("ACPX_SPAWN_RETRY_MS", "50");

    let result: Result<(), QueueError> =
        attach_with_spawn(&spawn_opts(), || async { Ok(None) }).await;

    std::env::remove_var("ACPX_OWNER_BINARY");
    std::env::remove_var("ACPX_SPAWN_DEADLINE_MS");
    std::env::remove_var("ACPX_SPAWN_RETRY_MS");

    let err = result.unwrap_err();
    assert_eq!(
        err.detail_code(),
        crate::protocol::DetailCode::NotAcceptingRequests
    );
    assert!(err.is_retryable());
}

#[tokio::test]
#[serial(acpx_spawn)]
async fn attach_keeps_retrying_through_retryable_errors() {
    std::env::set_var("ACPX_OWNER_BINARY", "/bin/true");
    std::env::set_var("ACPX_SPAWN_DEADLINE_MS", "3000");
    std::env::set_var("ACPX_SPAWN_RETRY_MS", "50");

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in = Arc::clone(&calls);
    let result: Result<&'static str, QueueError> = attach_with_spawn(&spawn_opts(), move || {
        let calls = Arc::clone(&calls_in);
        async move {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(QueueError::connection(
                    crate::protocol::DetailCode::DisconnectedBeforeAck,
                    "owner vanished mid-handshake",
                    true,
                )),
                1 => Ok(None),
                _ => Ok(Some("attached")),
            }
        }
    })
    .await;

    std::env::remove_var("ACPX_OWNER_BINARY");
    std::env::remove_var("ACPX_SPAWN_DEADLINE_MS");
    std::env::remove_var("ACPX_SPAWN_RETRY_MS");

    assert_eq!(result.expect("attach failed"), "attached");
}

#[tokio::test]
#[serial(acpx_spawn)]
async fn non_retryable_error_surfaces_immediately() {
    std::env::set_var("ACPX_OWNER_BINARY", "/bin/true");

    let result: Result<(), QueueError> = attach_with_spawn(&spawn_opts(), || async {
        Err(QueueError::protocol(
            crate::protocol::DetailCode::ProtocolMalformedMessage,
            "bad response",
        ))
    })
    .await;

    std::env::remove_var("ACPX_OWNER_BINARY");

    assert!(matches!(result.unwrap_err(), QueueError::Protocol { .. }));
}
