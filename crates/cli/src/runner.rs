// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ACP-backed turn execution for the queue owner.
//!
//! The owner runtime is adapter-agnostic; this module supplies the concrete
//! pieces: a lazily-started [`AgentClient`] shared by turns and fallback
//! control, the [`TurnRunner`] that drives one prompt through the adapter,
//! and the [`SessionControl`] implementations the turn controller routes
//! cancel/mode/config calls through.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use acpx_agent::{AgentClient, AgentConfig, AgentError, AgentUpdate, PromptOutcome};
use acpx_core::SessionRecord;
use acpx_queue::protocol::{ErrorOrigin, PromptResult, ResponseBody};
use acpx_queue::server::QueueTask;
use acpx_queue::{QueueError, SessionControl, TurnController, TurnRunner};

fn runtime_error(e: &AgentError) -> QueueError {
    QueueError::Runtime {
        message: e.to_string(),
        retryable: true,
        acp: None,
    }
}

fn control_error(e: &AgentError) -> QueueError {
    QueueError::Runtime {
        message: e.to_string(),
        retryable: false,
        acp: None,
    }
}

/// Shared adapter state: the agent process and its session, created on the
/// first turn (or the first fallback control call) and reused after.
pub struct Adapter {
    record_path: PathBuf,
    permission_mode: String,
    non_interactive_permissions: Option<String>,
    suppress_sdk_console_errors: bool,
    state: tokio::sync::Mutex<AdapterState>,
}

#[derive(Default)]
struct AdapterState {
    client: Option<AgentClient>,
    acp_session_id: Option<String>,
}

impl Adapter {
    pub fn new(
        record_path: PathBuf,
        permission_mode: String,
        non_interactive_permissions: Option<String>,
        suppress_sdk_console_errors: bool,
    ) -> Self {
        Self {
            record_path,
            permission_mode,
            non_interactive_permissions,
            suppress_sdk_console_errors,
            state: tokio::sync::Mutex::new(AdapterState::default()),
        }
    }

    /// Start the adapter and load-or-create its session, once.
    pub async fn ensure_session(&self) -> Result<(AgentClient, String), QueueError> {
        let mut state = self.state.lock().await;
        if let (Some(client), Some(session_id)) = (&state.client, &state.acp_session_id) {
            return Ok((client.clone(), session_id.clone()));
        }

        let mut record = SessionRecord::load(&self.record_path)
            .map_err(|e| QueueError::Runtime {
                message: format!("unreadable session record: {e}"),
                retryable: false,
                acp: None,
            })?
            .ok_or_else(|| QueueError::Runtime {
                message: "no session record for this session".to_string(),
                retryable: false,
                acp: None,
            })?;

        let client = match &state.client {
            Some(client) => client.clone(),
            None => {
                let config = AgentConfig {
                    agent_command: record.agent_command.clone(),
                    cwd: record.cwd.clone(),
                    permission_mode: self.permission_mode.clone(),
                    non_interactive_permissions: self.non_interactive_permissions.clone(),
                    suppress_sdk_console_errors: self.suppress_sdk_console_errors,
                };
                let client = AgentClient::start(config)
                    .await
                    .map_err(|e| runtime_error(&e))?;
                state.client = Some(client.clone());
                client
            }
        };

        let info = client
            .load_or_create(record.acp_session_id.clone(), record.cwd.clone())
            .await
            .map_err(|e| runtime_error(&e))?;
        state.acp_session_id = Some(info.acp_session_id.clone());

        record.touch(Some(info.acp_session_id.clone()), info.capabilities.clone());
        if let Err(e) = record.store(&self.record_path) {
            warn!(error = %e, "failed to persist session record");
        }

        Ok((client, info.acp_session_id))
    }

    /// Mark a completed turn on the persistent record.
    pub fn touch_record(&self) {
        match SessionRecord::load(&self.record_path) {
            Ok(Some(mut record)) => {
                record.touch(None, None);
                if let Err(e) = record.store(&self.record_path) {
                    warn!(error = %e, "failed to persist session record");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to reload session record"),
        }
    }

    pub async fn close(&self) {
        let state = self.state.lock().await;
        if let Some(client) = &state.client {
            client.close().await;
        }
    }
}

/// Active-prompt control handle: targets the in-flight prompt's session.
pub struct AcpSessionControl {
    client: AgentClient,
    acp_session_id: String,
}

#[async_trait]
impl SessionControl for AcpSessionControl {
    async fn cancel(&self) -> Result<(), QueueError> {
        self.client
            .cancel(&self.acp_session_id)
            .await
            .map_err(|e| control_error(&e))
    }

    async fn set_mode(&self, mode_id: &str) -> Result<(), QueueError> {
        self.client
            .set_mode(&self.acp_session_id, mode_id)
            .await
            .map_err(|e| control_error(&e))
    }

    async fn set_config_option(
        &self,
        config_id: &str,
        value: serde_json::Value,
    ) -> Result<serde_json::Value, QueueError> {
        self.client
            .set_config_option(&self.acp_session_id, config_id, value)
            .await
            .map_err(|e| control_error(&e))
    }
}

/// Between-turns control: targets the most recent default session,
/// starting the adapter if it never ran.
pub struct FallbackControl {
    adapter: Arc<Adapter>,
}

impl FallbackControl {
    pub fn new(adapter: Arc<Adapter>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl SessionControl for FallbackControl {
    async fn cancel(&self) -> Result<(), QueueError> {
        // No active prompt exists when the fallback is the target; there is
        // nothing adapter-side to cancel.
        Ok(())
    }

    async fn set_mode(&self, mode_id: &str) -> Result<(), QueueError> {
        let (client, session_id) = self.adapter.ensure_session().await?;
        client
            .set_mode(&session_id, mode_id)
            .await
            .map_err(|e| control_error(&e))
    }

    async fn set_config_option(
        &self,
        config_id: &str,
        value: serde_json::Value,
    ) -> Result<serde_json::Value, QueueError> {
        let (client, session_id) = self.adapter.ensure_session().await?;
        client
            .set_config_option(&session_id, config_id, value)
            .await
            .map_err(|e| control_error(&e))
    }
}

/// The owner's concrete turn runner.
pub struct AcpTurnRunner {
    adapter: Arc<Adapter>,
    /// Turn timeout applied when the submission carries none.
    default_timeout_ms: Option<u64>,
}

impl AcpTurnRunner {
    pub fn new(adapter: Arc<Adapter>, default_timeout_ms: Option<u64>) -> Self {
        Self {
            adapter,
            default_timeout_ms,
        }
    }
}

#[async_trait]
impl TurnRunner for AcpTurnRunner {
    async fn run_turn(&self, task: QueueTask, controller: &TurnController) {
        let started = Instant::now();

        let (client, session_id) = match self.adapter.ensure_session().await {
            Ok(pair) => pair,
            Err(e) => {
                task.sink.error(&e, ErrorOrigin::Runtime).await;
                return;
            }
        };

        let (updates_tx, mut updates_rx) = mpsc::channel::<AgentUpdate>(64);
        let turn = match client
            .start_prompt(
                &session_id,
                &task.payload.message,
                &task.payload.permission_mode,
                task.payload.non_interactive_permissions.clone(),
                updates_tx,
            )
            .await
        {
            Ok(turn) => turn,
            Err(e) => {
                task.sink.error(&runtime_error(&e), ErrorOrigin::Runtime).await;
                return;
            }
        };

        // The adapter has the prompt: install the cancel path, then flip
        // the turn to active (either step may deliver a deferred cancel).
        controller
            .set_active_controller(Arc::new(AcpSessionControl {
                client: client.clone(),
                acp_session_id: session_id.clone(),
            }))
            .await;
        controller.mark_prompt_active().await;

        let mut update_count: u64 = 0;
        let mut done = turn.done;

        let stream = async {
            loop {
                tokio::select! {
                    update = updates_rx.recv() => match update {
                        Some(update) => {
                            forward_update(&task, update, &mut update_count).await;
                        }
                        None => break (&mut done).await,
                    },
                    outcome = &mut done => break outcome,
                }
            }
        };

        let timeout_ms = task.payload.timeout_ms.or(self.default_timeout_ms);
        let outcome = match timeout_ms {
            Some(ms) => {
                let limit = Duration::from_millis(ms);
                match tokio::time::timeout(limit, stream).await {
                    Ok(outcome) => Some(outcome),
                    Err(_) => {
                        debug!(request_id = %task.request_id, "turn timed out, cancelling");
                        if let Err(e) = client.cancel(&session_id).await {
                            warn!(error = %e, "cancel after timeout failed");
                        }
                        task.sink
                            .error(&QueueError::Timeout(limit), ErrorOrigin::Runtime)
                            .await;
                        None
                    }
                }
            }
            None => Some(stream.await),
        };

        // Flush updates that were already buffered when the turn ended.
        while let Ok(update) = updates_rx.try_recv() {
            forward_update(&task, update, &mut update_count).await;
        }
        controller.clear_active_controller();

        let Some(outcome) = outcome else { return };
        match outcome {
            Ok(Ok(PromptOutcome { stop_reason })) => {
                task.sink
                    .send(ResponseBody::Done {
                        stop_reason: stop_reason.clone(),
                    })
                    .await;
                task.sink
                    .send(ResponseBody::Result {
                        result: PromptResult {
                            stop_reason,
                            duration_ms: started.elapsed().as_millis() as u64,
                            update_count,
                        },
                    })
                    .await;
                self.adapter.touch_record();
            }
            Ok(Err(e)) => {
                task.sink.error(&runtime_error(&e), ErrorOrigin::Runtime).await;
            }
            Err(_) => {
                task.sink
                    .error(&runtime_error(&AgentError::WorkerGone), ErrorOrigin::Runtime)
                    .await;
            }
        }
    }
}

async fn forward_update(task: &QueueTask, update: AgentUpdate, update_count: &mut u64) {
    *update_count += 1;
    let body = match update {
        AgentUpdate::Session(notification) => ResponseBody::SessionUpdate { notification },
        AgentUpdate::ClientOperation(operation) => ResponseBody::ClientOperation { operation },
    };
    task.sink.send(body).await;
}
