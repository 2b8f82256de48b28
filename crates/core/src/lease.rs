// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue-owner lease model.
//!
//! A lease is the single-line JSON body of a session's lock file. The owner
//! process writes it at acquisition and rewrites it on every heartbeat;
//! readers use the recorded pid and `refreshed_at` to decide whether the
//! owner is live. File operations live in `acpx_queue::lease` — this module
//! is only the data model.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::time::now_epoch_ms;

/// Heartbeat interval for a live owner.
pub const HEARTBEAT_INTERVAL_MS: u64 = 2_000;

/// Age of `refreshed_at` beyond which readers treat a lease as suspect and
/// re-probe the recorded pid.
pub const LEASE_GRACE_MS: u64 = 15_000;

/// Contents of a session's lock file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueOwnerLease {
    /// Session digest this lease covers.
    pub session_id: String,
    /// Owner process id.
    pub pid: u32,
    /// Stream socket the owner is listening on.
    pub socket_path: PathBuf,
    /// Epoch ms when the lease was first acquired.
    pub acquired_at: u64,
    /// Epoch ms of the most recent heartbeat.
    pub refreshed_at: u64,
    /// Prompts waiting plus the one executing, as of the last heartbeat.
    pub queue_depth: usize,
}

impl QueueOwnerLease {
    /// Fresh lease for the current process, acquired now.
    pub fn acquire_now(session_id: impl Into<String>, socket_path: PathBuf) -> Self {
        let now = now_epoch_ms();
        Self {
            session_id: session_id.into(),
            pid: std::process::id(),
            socket_path,
            acquired_at: now,
            refreshed_at: now,
            queue_depth: 0,
        }
    }

    /// True when `refreshed_at` is older than the grace window, meaning the
    /// heartbeat has gone quiet and the pid should be re-probed.
    pub fn is_suspect(&self) -> bool {
        self.is_suspect_at(now_epoch_ms())
    }

    /// Staleness check against an explicit clock, for tests.
    pub fn is_suspect_at(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.refreshed_at) > LEASE_GRACE_MS
    }

    /// Single-line JSON form written to the lock file.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
