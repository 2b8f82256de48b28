// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `acpx __queue-owner` — the hidden owner entrypoint.
//!
//! Started detached by spawn-or-attach. Sets up file logging (the spawning
//! client tails this log to explain startup failures), wires the ACP-backed
//! runner into the owner runtime, and exits 0 both after a normal shutdown
//! and when another process already owns the session.

use anyhow::Result;
use clap::Args;
use std::path::Path;
use std::sync::Arc;

use acpx_core::{exit, paths, SessionRecord};
use acpx_queue::runtime::{normalize_ttl, run_owner};
use acpx_queue::spawn::STARTUP_MARKER_PREFIX;
use acpx_queue::{LeaseStore, TurnController};

use crate::runner::{AcpTurnRunner, Adapter, FallbackControl};

#[derive(Args, Debug)]
pub struct OwnerArgs {
    /// Session digest this owner serves
    #[arg(long = "session-id")]
    session_id: String,

    /// Idle TTL in ms (0 disables; absent/negative uses the default)
    #[arg(long = "ttl-ms", allow_hyphen_values = true)]
    ttl_ms: Option<i64>,

    /// Permission mode for auto-resolving adapter permission requests
    #[arg(long = "permission-mode", default_value = "default")]
    permission_mode: String,

    /// Non-interactive permission policy
    #[arg(long = "non-interactive-permissions")]
    non_interactive_permissions: Option<String>,

    /// Auth policy handled by the credential layer (recorded, not
    /// interpreted here)
    #[arg(long = "auth-policy")]
    auth_policy: Option<String>,

    /// Default per-turn timeout in ms for submissions that carry none
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Verbose logging
    #[arg(long)]
    verbose: bool,

    /// Drop the adapter's stderr instead of logging it
    #[arg(long = "suppress-sdk-console-errors")]
    suppress_sdk_console_errors: bool,
}

pub async fn run(args: OwnerArgs) -> Result<i32> {
    let log_path = paths::owner_log_path(&args.session_id)?;
    rotate_log_if_needed(&log_path);
    write_startup_marker(&log_path)?;
    let _log_guard = setup_logging(&log_path, args.verbose)?;

    if let Some(policy) = &args.auth_policy {
        tracing::debug!(policy = %policy, "auth policy requested");
    }

    let store = LeaseStore::from_env()?;
    let record_path = paths::record_path(&args.session_id)?;
    if SessionRecord::load(&record_path)?.is_none() {
        let message = format!("no session record for session {}", args.session_id);
        write_startup_error(&log_path, &message);
        anyhow::bail!(message);
    }

    let adapter = Arc::new(Adapter::new(
        record_path,
        args.permission_mode.clone(),
        args.non_interactive_permissions.clone(),
        args.suppress_sdk_console_errors,
    ));
    let fallback = Arc::new(FallbackControl::new(Arc::clone(&adapter)));
    let controller = Arc::new(TurnController::new(fallback));
    let runner = Arc::new(AcpTurnRunner::new(Arc::clone(&adapter), args.timeout_ms));
    let ttl = normalize_ttl(args.ttl_ms);

    let result = run_owner(store, &args.session_id, ttl, controller, runner).await;
    adapter.close().await;

    match result {
        Ok(_) => Ok(exit::EXIT_OK),
        Err(e) => {
            tracing::error!(error = %e, "queue owner failed");
            write_startup_error(&log_path, &e.to_string());
            Err(e.into())
        }
    }
}

/// Maximum owner log size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep.
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the owner log if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `<hash>.log` → `.log.1` → `.log.2` → `.log.3`, deleting the
/// oldest. Best-effort: rotation failures never block startup.
fn rotate_log_if_needed(log_path: &Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

/// Append the startup marker the spawning client scans for.
fn write_startup_marker(log_path: &Path) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    writeln!(file, "{}{}) ---\n", STARTUP_MARKER_PREFIX, std::process::id())?;
    Ok(())
}

/// Write a startup error synchronously so it is visible to the spawning
/// client even if this process exits before the async logger flushes.
fn write_startup_error(log_path: &Path, error: &str) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR Failed to start queue owner: {}", error);
}

fn setup_logging(
    log_path: &Path,
    verbose: bool,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let dir = log_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("owner log path has no parent"))?;
    let file_name = log_path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("owner log path has no file name"))?;

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .init();

    Ok(guard)
}
