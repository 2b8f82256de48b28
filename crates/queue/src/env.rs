// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the queue crate.
//!
//! Every timing constant has an `ACPX_*_MS` override so tests and unusual
//! deployments can compress or stretch the coordination timeline.

use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Timeout for a single blocking IPC exchange (write request, read one line)
pub fn timeout_ipc() -> Duration {
    parse_duration_ms("ACPX_TIMEOUT_IPC_MS").unwrap_or(Duration::from_secs(5))
}

/// Interval between connect attempts against a live owner's socket
pub fn connect_poll() -> Duration {
    parse_duration_ms("ACPX_CONNECT_POLL_MS").unwrap_or(Duration::from_millis(50))
}

/// Number of connect attempts before giving up on a live owner
pub fn connect_attempts() -> u32 {
    std::env::var("ACPX_CONNECT_ATTEMPTS")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(40)
}

/// Upper deadline for spawn-or-attach
pub fn spawn_deadline() -> Duration {
    parse_duration_ms("ACPX_SPAWN_DEADLINE_MS").unwrap_or(Duration::from_secs(10))
}

/// Minimum interval between detached owner spawn attempts
pub fn spawn_retry_interval() -> Duration {
    parse_duration_ms("ACPX_SPAWN_RETRY_MS").unwrap_or(Duration::from_millis(250))
}

/// Owner heartbeat interval
pub fn heartbeat_interval() -> Duration {
    parse_duration_ms("ACPX_HEARTBEAT_MS")
        .unwrap_or(Duration::from_millis(acpx_core::lease::HEARTBEAT_INTERVAL_MS))
}

/// Default timeout wrapped around adapter-side control calls
pub fn control_timeout() -> Duration {
    parse_duration_ms("ACPX_CONTROL_TIMEOUT_MS").unwrap_or(Duration::from_secs(30))
}

/// Override for the binary spawned as the queue owner (defaults to
/// `current_exe`)
pub fn owner_binary() -> Option<String> {
    std::env::var("ACPX_OWNER_BINARY").ok().filter(|s| !s.is_empty())
}
