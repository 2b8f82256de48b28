// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent facade errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Failed to spawn agent adapter: {0}")]
    Spawn(std::io::Error),

    #[error("Agent adapter error: {0}")]
    Acp(String),

    #[error("Agent worker stopped")]
    WorkerGone,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Collapse an ACP-level error into the facade error, keeping the
    /// adapter's message.
    pub fn acp(e: impl std::fmt::Display) -> Self {
        AgentError::Acp(e.to_string())
    }
}
