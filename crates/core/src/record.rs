// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent session records.
//!
//! A record is the durable half of a session: the agent command and working
//! directory the owner needs to start the adapter, plus whatever the adapter
//! reported back (its own session id, mode/model capabilities). The queue
//! owner reads the record when a task starts and rewrites it after each
//! prompt turn.
//!
//! Writers must go through [`SessionRecord::store`], which writes a temp
//! file and renames it so concurrent readers see a prior or next whole
//! snapshot, never a torn file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::key::SessionKey;
use crate::time::now_epoch_ms;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable description of a persistent session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Session digest, also the record's file basename.
    pub session_id: String,
    /// Agent adapter command: program followed by its arguments.
    pub agent_command: Vec<String>,
    /// Working directory the adapter runs in.
    pub cwd: PathBuf,
    /// Optional user-chosen session name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Adapter-side session id, once the adapter has created one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acp_session_id: Option<String>,
    /// Epoch ms of the last completed prompt turn.
    pub last_used_at: u64,
    /// Capability snapshot from the adapter (modes, models), when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<serde_json::Value>,
}

impl SessionRecord {
    /// Fresh record for a key that has never run a turn.
    pub fn for_key(key: &SessionKey) -> Self {
        Self {
            session_id: key.digest(),
            agent_command: key.agent_command.clone(),
            cwd: key.cwd.clone(),
            name: key.name.clone(),
            acp_session_id: None,
            last_used_at: now_epoch_ms(),
            capabilities: None,
        }
    }

    /// Read a record, returning `None` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, RecordError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Write atomically: temp file in the same directory, then rename.
    pub fn store(&self, path: &Path) -> Result<(), RecordError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Mark a completed turn: bump `last_used_at` and absorb what the
    /// adapter reported.
    pub fn touch(&mut self, acp_session_id: Option<String>, capabilities: Option<serde_json::Value>) {
        self.last_used_at = now_epoch_ms();
        if acp_session_id.is_some() {
            self.acp_session_id = acp_session_id;
        }
        if capabilities.is_some() {
            self.capabilities = capabilities;
        }
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
