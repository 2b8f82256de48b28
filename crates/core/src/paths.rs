// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk layout under the acpx base directory.
//!
//! Queue coordination files live under `<base>/queues/`, persistent session
//! records under `<base>/sessions/`. The base directory resolves as
//! `ACPX_HOME` > `$HOME/.acpx` (`%USERPROFILE%\.acpx` on Windows).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("Could not determine home directory")]
    NoHomeDir,
}

/// Resolve the acpx base directory: ACPX_HOME > ~/.acpx
pub fn base_dir() -> Result<PathBuf, PathError> {
    if let Ok(dir) = std::env::var("ACPX_HOME") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = if cfg!(windows) {
        std::env::var("USERPROFILE")
    } else {
        std::env::var("HOME")
    };
    let home = home.map_err(|_| PathError::NoHomeDir)?;
    Ok(PathBuf::from(home).join(".acpx"))
}

/// Directory holding lock files and sockets.
pub fn queues_dir() -> Result<PathBuf, PathError> {
    Ok(base_dir()?.join("queues"))
}

/// Directory holding persistent session records.
pub fn sessions_dir() -> Result<PathBuf, PathError> {
    Ok(base_dir()?.join("sessions"))
}

/// Lock file for a session digest: `<base>/queues/<digest>.lock`
pub fn lock_path(digest: &str) -> Result<PathBuf, PathError> {
    Ok(queues_dir()?.join(format!("{digest}.lock")))
}

/// Stream endpoint for a session digest.
///
/// POSIX: `<base>/queues/<digest>.sock`. On Windows the endpoint is a named
/// pipe, `\\.\pipe\acpx-<digest>`; only the naming is defined here — the
/// transport itself is Unix-domain-socket only.
pub fn socket_path(digest: &str) -> Result<PathBuf, PathError> {
    if cfg!(windows) {
        return Ok(PathBuf::from(format!(r"\\.\pipe\acpx-{digest}")));
    }
    Ok(queues_dir()?.join(format!("{digest}.sock")))
}

/// Owner log file for a session digest: `<base>/queues/<digest>.log`
pub fn owner_log_path(digest: &str) -> Result<PathBuf, PathError> {
    Ok(queues_dir()?.join(format!("{digest}.log")))
}

/// Session record for a session digest: `<base>/sessions/<digest>.json`
pub fn record_path(digest: &str) -> Result<PathBuf, PathError> {
    Ok(sessions_dir()?.join(format!("{digest}.json")))
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
