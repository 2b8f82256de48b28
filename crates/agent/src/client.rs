// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Send` handle over the worker-thread ACP connection.

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::error::AgentError;
use crate::worker;

/// How to spawn and drive the agent adapter.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Adapter command: program followed by its arguments.
    pub agent_command: Vec<String>,
    /// Working directory the adapter runs in.
    pub cwd: PathBuf,
    /// Initial permission mode for auto-resolving permission requests.
    pub permission_mode: String,
    /// Non-interactive permission policy string, passed through opaquely.
    pub non_interactive_permissions: Option<String>,
    /// Drop the adapter's stderr instead of forwarding it to the log.
    pub suppress_sdk_console_errors: bool,
}

/// One streamed event out of an in-flight prompt.
#[derive(Debug, Clone)]
pub enum AgentUpdate {
    /// An ACP `session/update` notification, as wire JSON.
    Session(serde_json::Value),
    /// A client-side side effect the facade performed for the adapter
    /// (file read/write, permission decision).
    ClientOperation(serde_json::Value),
}

/// Result of an adapter session lookup or creation.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub acp_session_id: String,
    /// Mode/model capability snapshot reported by the adapter, if any.
    pub capabilities: Option<serde_json::Value>,
}

/// Terminal state of one prompt turn.
#[derive(Debug, Clone)]
pub struct PromptOutcome {
    /// Adapter stop reason in wire spelling (`end_turn`, `cancelled`, …).
    pub stop_reason: String,
}

/// In-flight prompt: await `done` for the adapter's terminal response.
pub struct PromptTurn {
    pub done: oneshot::Receiver<Result<PromptOutcome, AgentError>>,
}

pub(crate) enum AgentCommand {
    Initialize {
        reply: oneshot::Sender<Result<(), AgentError>>,
    },
    LoadOrCreate {
        acp_session_id: Option<String>,
        cwd: PathBuf,
        reply: oneshot::Sender<Result<SessionInfo, AgentError>>,
    },
    Prompt {
        session_id: String,
        message: String,
        permission_mode: String,
        non_interactive_permissions: Option<String>,
        updates: mpsc::Sender<AgentUpdate>,
        started: oneshot::Sender<()>,
        done: oneshot::Sender<Result<PromptOutcome, AgentError>>,
    },
    Cancel {
        session_id: String,
        reply: oneshot::Sender<Result<(), AgentError>>,
    },
    SetMode {
        session_id: String,
        mode_id: String,
        reply: oneshot::Sender<Result<(), AgentError>>,
    },
    SetConfigOption {
        session_id: String,
        config_id: String,
        value: serde_json::Value,
        reply: oneshot::Sender<Result<serde_json::Value, AgentError>>,
    },
    Close,
}

/// Handle to the agent adapter. Cloneable; all clones drive the same
/// adapter process.
#[derive(Clone, Debug)]
pub struct AgentClient {
    tx: mpsc::Sender<AgentCommand>,
}

impl AgentClient {
    /// Spawn the adapter subprocess, connect, and run `initialize`.
    pub async fn start(config: AgentConfig) -> Result<Self, AgentError> {
        let (tx, rx) = mpsc::channel(32);

        // The ACP connection futures are !Send; give them their own
        // single-threaded runtime on a dedicated thread.
        let worker_config = config.clone();
        std::thread::Builder::new()
            .name("acpx-agent".to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        warn!(error = %e, "failed to build agent worker runtime");
                        return;
                    }
                };
                let local = tokio::task::LocalSet::new();
                local.block_on(&rt, worker::run_worker(worker_config, rx));
            })
            .map_err(AgentError::Io)?;

        let client = Self { tx };
        client
            .request(|reply| AgentCommand::Initialize { reply })
            .await??;
        Ok(client)
    }

    /// Load the adapter-side session when one is recorded and the adapter
    /// supports it; otherwise create a fresh session in `cwd`.
    pub async fn load_or_create(
        &self,
        acp_session_id: Option<String>,
        cwd: PathBuf,
    ) -> Result<SessionInfo, AgentError> {
        self.request(|reply| AgentCommand::LoadOrCreate {
            acp_session_id,
            cwd,
            reply,
        })
        .await?
    }

    /// Submit a prompt. Resolves once the adapter has the prompt in hand;
    /// the turn itself completes through the returned [`PromptTurn`].
    pub async fn start_prompt(
        &self,
        session_id: &str,
        message: &str,
        permission_mode: &str,
        non_interactive_permissions: Option<String>,
        updates: mpsc::Sender<AgentUpdate>,
    ) -> Result<PromptTurn, AgentError> {
        let (started_tx, started_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        self.tx
            .send(AgentCommand::Prompt {
                session_id: session_id.to_string(),
                message: message.to_string(),
                permission_mode: permission_mode.to_string(),
                non_interactive_permissions,
                updates,
                started: started_tx,
                done: done_tx,
            })
            .await
            .map_err(|_| AgentError::WorkerGone)?;

        started_rx.await.map_err(|_| AgentError::WorkerGone)?;
        Ok(PromptTurn { done: done_rx })
    }

    /// Cancel the in-flight prompt for the session.
    pub async fn cancel(&self, session_id: &str) -> Result<(), AgentError> {
        self.request(|reply| AgentCommand::Cancel {
            session_id: session_id.to_string(),
            reply,
        })
        .await?
    }

    pub async fn set_mode(&self, session_id: &str, mode_id: &str) -> Result<(), AgentError> {
        self.request(|reply| AgentCommand::SetMode {
            session_id: session_id.to_string(),
            mode_id: mode_id.to_string(),
            reply,
        })
        .await?
    }

    pub async fn set_config_option(
        &self,
        session_id: &str,
        config_id: &str,
        value: serde_json::Value,
    ) -> Result<serde_json::Value, AgentError> {
        self.request(|reply| AgentCommand::SetConfigOption {
            session_id: session_id.to_string(),
            config_id: config_id.to_string(),
            value,
            reply,
        })
        .await?
    }

    /// Shut the adapter down. Best-effort; the worker kills the subprocess.
    pub async fn close(&self) {
        let _ = self.tx.send(AgentCommand::Close).await;
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> AgentCommand,
    ) -> Result<T, AgentError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| AgentError::WorkerGone)?;
        reply_rx.await.map_err(|_| AgentError::WorkerGone)
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
