// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawn-or-attach: find a live owner or start one, within a deadline.
//!
//! A foreground invocation first tries its operation against a running
//! owner. When none is live it starts a detached owner process (this same
//! binary re-entered through the hidden `__queue-owner` subcommand) and
//! keeps retrying the operation until the owner answers or the overall
//! deadline expires. Spawn attempts are rate-limited so a crash-looping
//! owner cannot be forked dozens of times inside one deadline.

use std::future::Future;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Instant;

use tracing::{debug, warn};

use crate::env;
use crate::error::QueueError;

/// Arguments forwarded to the detached `__queue-owner` process.
#[derive(Debug, Clone)]
pub struct OwnerSpawnOptions {
    pub session_id: String,
    pub ttl_ms: Option<i64>,
    pub permission_mode: String,
    pub non_interactive_permissions: Option<String>,
    pub auth_policy: Option<String>,
    pub timeout_ms: Option<u64>,
    pub verbose: bool,
    pub suppress_sdk_console_errors: bool,
}

/// Build the owner subcommand argument vector.
pub fn owner_args(opts: &OwnerSpawnOptions) -> Vec<String> {
    let mut args = vec![
        "__queue-owner".to_string(),
        "--session-id".to_string(),
        opts.session_id.clone(),
        "--permission-mode".to_string(),
        opts.permission_mode.clone(),
    ];
    if let Some(ttl) = opts.ttl_ms {
        args.push("--ttl-ms".to_string());
        args.push(ttl.to_string());
    }
    if let Some(perms) = &opts.non_interactive_permissions {
        args.push("--non-interactive-permissions".to_string());
        args.push(perms.clone());
    }
    if let Some(policy) = &opts.auth_policy {
        args.push("--auth-policy".to_string());
        args.push(policy.clone());
    }
    if let Some(timeout) = opts.timeout_ms {
        args.push("--timeout-ms".to_string());
        args.push(timeout.to_string());
    }
    if opts.verbose {
        args.push("--verbose".to_string());
    }
    if opts.suppress_sdk_console_errors {
        args.push("--suppress-sdk-console-errors".to_string());
    }
    args
}

/// Start a detached owner process for the session.
pub fn start_owner_background(opts: &OwnerSpawnOptions) -> std::io::Result<Child> {
    let binary = owner_binary()?;
    Command::new(binary)
        .args(owner_args(opts))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
}

fn owner_binary() -> std::io::Result<PathBuf> {
    if let Some(path) = env::owner_binary() {
        return Ok(PathBuf::from(path));
    }
    std::env::current_exe()
}

/// Run `attempt` until it reaches an owner, spawning one as needed.
///
/// `attempt` returns `Ok(None)` when no live owner exists, `Ok(Some(v))` on
/// success, and errors otherwise; retryable errors (disconnect before ack,
/// owner not accepting) re-enter the loop. Deadline expiry raises
/// `QUEUE_NOT_ACCEPTING_REQUESTS`, enriched with the spawned owner's
/// startup log when it died early.
pub async fn attach_with_spawn<T, F, Fut>(
    opts: &OwnerSpawnOptions,
    mut attempt: F,
) -> Result<T, QueueError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, QueueError>>,
{
    let deadline = Instant::now() + env::spawn_deadline();
    let mut last_spawn: Option<Instant> = None;
    let mut child: Option<Child> = None;
    let mut startup_failure: Option<String> = None;

    loop {
        match attempt().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) if e.is_retryable() => {
                debug!(error = %e, "retryable queue error, staying in spawn-or-attach");
            }
            Err(e) => return Err(e),
        }

        if Instant::now() >= deadline {
            return Err(deadline_error(&opts.session_id, startup_failure));
        }

        // A spawned owner that exits at once either lost the lease race
        // (fine) or failed to start (remember why for the deadline error).
        if let Some(spawned) = child.as_mut() {
            if let Ok(Some(status)) = spawned.try_wait() {
                if !status.success() {
                    startup_failure = read_startup_error(&opts.session_id)
                        .or(Some(format!("owner exited with {status}")));
                }
                child = None;
            }
        }

        let due = last_spawn.map_or(true, |t| t.elapsed() >= env::spawn_retry_interval());
        if child.is_none() && due {
            match start_owner_background(opts) {
                Ok(spawned) => {
                    debug!(session_id = %opts.session_id, pid = spawned.id(), "spawned queue owner");
                    child = Some(spawned);
                }
                Err(e) => {
                    warn!(error = %e, "failed to spawn queue owner");
                    startup_failure = Some(format!("failed to spawn owner: {e}"));
                }
            }
            last_spawn = Some(Instant::now());
        }

        tokio::time::sleep(env::connect_poll()).await;
    }
}

fn deadline_error(session_id: &str, startup_failure: Option<String>) -> QueueError {
    let failure = startup_failure.or_else(|| read_startup_error(session_id));
    let message = match failure {
        Some(detail) => format!("queue owner did not become ready: {detail}"),
        None => "queue owner did not become ready within the deadline".to_string(),
    };
    QueueError::not_accepting(message)
}

/// Startup marker prefix the owner writes to its log before anything else.
/// Full format: "--- acpx owner: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- acpx owner: starting (pid: ";

/// Read the owner log for errors from its most recent startup attempt.
pub fn read_startup_error(session_id: &str) -> Option<String> {
    let log_path = acpx_core::paths::owner_log_path(session_id).ok()?;
    let content = std::fs::read_to_string(log_path).ok()?;
    parse_startup_error(&content)
}

/// Parse startup errors from log content (pure logic, no I/O).
fn parse_startup_error(content: &str) -> Option<String> {
    let start_pos = content.rfind(STARTUP_MARKER_PREFIX)?;
    let startup_log = &content[start_pos..];

    let errors: Vec<&str> = startup_log
        .lines()
        .filter(|line| line.contains(" ERROR ") || line.contains("Failed to start"))
        .collect();

    if errors.is_empty() {
        return None;
    }

    let messages: Vec<String> = errors
        .iter()
        .filter_map(|line| line.split_once(": ").map(|(_, msg)| msg.to_string()))
        .collect();

    if messages.is_empty() {
        Some(errors.join("\n"))
    } else {
        Some(messages.join("\n"))
    }
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
