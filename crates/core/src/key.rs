// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session identity.
//!
//! A [`SessionKey`] names a persistent session by the agent command that
//! serves it, the working directory it runs in, and an optional user-chosen
//! name. Its digest is the stable basename for the session's lock file,
//! socket, and record on disk.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Number of hex characters of the SHA-256 digest used for file names.
pub const DIGEST_LEN: usize = 24;

/// Identity of a persistent session: `(agent-command, working-directory,
/// optional-name)`.
///
/// Two invocations with the same key talk to the same queue owner; any
/// difference in the tuple yields a distinct owner, socket, and record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionKey {
    /// Agent adapter command: program followed by its arguments.
    pub agent_command: Vec<String>,
    /// Working directory the adapter runs in.
    pub cwd: PathBuf,
    /// Optional session name distinguishing parallel sessions in one
    /// directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl SessionKey {
    pub fn new(agent_command: Vec<String>, cwd: PathBuf, name: Option<String>) -> Self {
        Self {
            agent_command,
            cwd,
            name: name.filter(|n| !n.is_empty()),
        }
    }

    /// Stable short digest: first [`DIGEST_LEN`] hex chars of the SHA-256 of
    /// the canonical JSON form of the key.
    ///
    /// JSON canonicalization keeps the digest independent of shell quoting
    /// and unaffected by embedded separators in command arguments.
    pub fn digest(&self) -> String {
        let canonical = serde_json::json!({
            "agentCommand": self.agent_command,
            "cwd": self.cwd,
            "name": self.name,
        });
        let canonical = canonical.to_string();
        let digest = Sha256::digest(canonical.as_bytes());
        let hex = format!("{:x}", digest);
        hex[..DIGEST_LEN].to_string()
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} @ {}",
            self.agent_command.join(" "),
            self.cwd.display()
        )?;
        if let Some(name) = &self.name {
            write!(f, " ({})", name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "key_tests.rs"]
mod tests;
