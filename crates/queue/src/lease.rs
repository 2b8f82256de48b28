// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease store: on-disk mutual exclusion per session.
//!
//! The lock file is the source of truth for "who owns this session". It is
//! created with an atomic exclusive create; the recorded pid is probed with
//! signal 0 to tell a live owner from an orphaned file. Heartbeat rewrites
//! go through a temp file plus rename so readers always see a whole
//! snapshot.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use acpx_core::lease::QueueOwnerLease;
use acpx_core::paths;

/// Lease store errors
#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not determine home directory")]
    NoHomeDir,
}

/// Handle to one session's lock file and socket path.
#[derive(Debug, Clone)]
pub struct LeaseStore {
    queues_dir: PathBuf,
}

impl LeaseStore {
    /// Store over an explicit directory (tests, unusual deployments).
    pub fn new(queues_dir: impl Into<PathBuf>) -> Self {
        Self {
            queues_dir: queues_dir.into(),
        }
    }

    /// Store over the default `~/.acpx/queues` layout.
    pub fn from_env() -> Result<Self, LeaseError> {
        let dir = paths::queues_dir().map_err(|_| LeaseError::NoHomeDir)?;
        Ok(Self::new(dir))
    }

    pub fn lock_path(&self, session_id: &str) -> PathBuf {
        self.queues_dir.join(format!("{session_id}.lock"))
    }

    pub fn socket_path(&self, session_id: &str) -> PathBuf {
        self.queues_dir.join(format!("{session_id}.sock"))
    }

    /// Attempt to become the owner for `session_id`.
    ///
    /// Returns `Some(lease)` on success. Returns `None` when another live
    /// process holds the lease — the caller then acts as a client, not an
    /// owner. A lock file naming a dead pid is reclaimed by unlinking it and
    /// retrying the exclusive create once; losing that race also yields
    /// `None`.
    pub fn try_acquire(&self, session_id: &str) -> Result<Option<QueueOwnerLease>, LeaseError> {
        std::fs::create_dir_all(&self.queues_dir)?;
        let lock_path = self.lock_path(session_id);

        for _ in 0..2 {
            match self.create_exclusive(session_id, &lock_path)? {
                Some(lease) => return Ok(Some(lease)),
                None => {}
            }

            // Lock exists. A readable lease with a live pid wins; anything
            // else (dead pid, empty or torn file from a crashed owner) is an
            // orphan we may reclaim.
            match self.read(session_id)? {
                Some(existing) if process_exists(existing.pid) => return Ok(None),
                _ => {
                    debug!(session_id, "reclaiming orphaned lease");
                    let _ = std::fs::remove_file(&lock_path);
                }
            }
        }

        Ok(None)
    }

    fn create_exclusive(
        &self,
        session_id: &str,
        lock_path: &Path,
    ) -> Result<Option<QueueOwnerLease>, LeaseError> {
        use std::io::Write;

        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let lease = QueueOwnerLease::acquire_now(session_id, self.socket_path(session_id));
        file.write_all(lease.to_line()?.as_bytes())?;
        file.flush()?;
        Ok(Some(lease))
    }

    /// Read the current lease, `None` when absent or unreadable.
    pub fn read(&self, session_id: &str) -> Result<Option<QueueOwnerLease>, LeaseError> {
        let content = match std::fs::read_to_string(self.lock_path(session_id)) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(content.trim()) {
            Ok(lease) => Ok(Some(lease)),
            Err(e) => {
                warn!(session_id, error = %e, "unreadable lease file");
                Ok(None)
            }
        }
    }

    /// True iff the lock file still exists, names the same pid as `lease`,
    /// and that process is alive. Guards every IPC attempt against a
    /// just-died owner.
    pub fn ensure_usable(&self, session_id: &str, lease: &QueueOwnerLease) -> bool {
        match self.read(session_id) {
            Ok(Some(current)) if current.pid == lease.pid => process_exists(current.pid),
            _ => false,
        }
    }

    /// Heartbeat: rewrite the lock file with a fresh `refreshed_at` and the
    /// current queue depth. Temp-file + rename keeps concurrent readers on
    /// whole snapshots.
    pub fn refresh(
        &self,
        lease: &mut QueueOwnerLease,
        queue_depth: usize,
    ) -> Result<(), LeaseError> {
        lease.refreshed_at = acpx_core::time::now_epoch_ms();
        lease.queue_depth = queue_depth;

        let lock_path = self.lock_path(&lease.session_id);
        let tmp = lock_path.with_extension("lock.tmp");
        std::fs::write(&tmp, lease.to_line()?)?;
        std::fs::rename(&tmp, &lock_path)?;
        Ok(())
    }

    /// Drop the lease: unlink the lock file, best-effort unlink the socket.
    pub fn release(&self, lease: &QueueOwnerLease) {
        if let Err(e) = std::fs::remove_file(self.lock_path(&lease.session_id)) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(session_id = %lease.session_id, error = %e, "failed to remove lock file");
            }
        }
        let _ = std::fs::remove_file(&lease.socket_path);
    }

    /// Terminate the owner recorded for `session_id`: TERM, bounded wait,
    /// then KILL, then file cleanup. Returns false when no owner was live.
    pub fn terminate_owner_for(&self, session_id: &str) -> Result<bool, LeaseError> {
        let Some(lease) = self.read(session_id)? else {
            return Ok(false);
        };

        let was_alive = process_exists(lease.pid);
        if was_alive {
            kill_signal("-15", lease.pid);
            if !wait_for_exit(lease.pid, Duration::from_secs(2)) {
                kill_signal("-9", lease.pid);
                wait_for_exit(lease.pid, Duration::from_secs(2));
            }
        }

        self.release(&lease);
        Ok(was_alive)
    }
}

/// Check if a process with the given PID exists (signal 0 probe).
pub fn process_exists(pid: u32) -> bool {
    kill_signal("-0", pid)
}

fn kill_signal(signal: &str, pid: u32) -> bool {
    Command::new("kill")
        .args([signal, &pid.to_string()])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Poll until a process exits, up to `timeout`.
fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !process_exists(pid) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    !process_exists(pid)
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
