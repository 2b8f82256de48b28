// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-thread side of the facade.
//!
//! Owns the adapter subprocess and the `ClientSideConnection`, and executes
//! commands from the handle. Runs inside a `LocalSet` on a current-thread
//! runtime; prompt turns are spawned as local tasks so cancel and control
//! commands keep flowing while a turn is in flight.

use std::rc::Rc;

use agent_client_protocol as acp;
use agent_client_protocol::Agent as _;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

use crate::client::{AgentCommand, AgentConfig, PromptOutcome, SessionInfo};
use crate::error::AgentError;
use crate::handler::FacadeHandler;

pub(crate) async fn run_worker(config: AgentConfig, mut commands: mpsc::Receiver<AgentCommand>) {
    let (mut child, conn, handler) = match connect(&config) {
        Ok(parts) => parts,
        Err(e) => {
            warn!(error = %e, "agent adapter failed to start");
            // Drain commands, failing each reply, until the handle drops.
            fail_all(&mut commands, &e).await;
            return;
        }
    };
    let conn = Rc::new(conn);

    while let Some(command) = commands.recv().await {
        match command {
            AgentCommand::Initialize { reply } => {
                let _ = reply.send(initialize(&conn).await);
            }

            AgentCommand::LoadOrCreate {
                acp_session_id,
                cwd,
                reply,
            } => {
                let _ = reply.send(load_or_create(&conn, acp_session_id, cwd).await);
            }

            AgentCommand::Prompt {
                session_id,
                message,
                permission_mode,
                non_interactive_permissions,
                updates,
                started,
                done,
            } => {
                handler.begin_prompt(updates, permission_mode, non_interactive_permissions);
                let _ = started.send(());

                // Run the turn as its own local task so the command loop
                // stays responsive to Cancel while the adapter works.
                let conn = Rc::clone(&conn);
                let handler = handler.clone();
                tokio::task::spawn_local(async move {
                    let request = acp::PromptRequest::new(
                        acp::SessionId::new(session_id),
                        vec![acp::ContentBlock::Text(acp::TextContent::new(message))],
                    );
                    let result = conn
                        .prompt(request)
                        .await
                        .map(|resp| PromptOutcome {
                            stop_reason: stop_reason_str(&resp.stop_reason),
                        })
                        .map_err(AgentError::acp);
                    handler.end_prompt();
                    let _ = done.send(result);
                });
            }

            AgentCommand::Cancel { session_id, reply } => {
                let result = conn
                    .cancel(acp::CancelNotification::new(acp::SessionId::new(session_id)))
                    .await
                    .map_err(AgentError::acp);
                let _ = reply.send(result);
            }

            AgentCommand::SetMode {
                session_id,
                mode_id,
                reply,
            } => {
                let request = acp::SetSessionModeRequest::new(
                    acp::SessionId::new(session_id),
                    acp::SessionModeId::new(mode_id),
                );
                let result = conn
                    .set_session_mode(request)
                    .await
                    .map(|_| ())
                    .map_err(AgentError::acp);
                let _ = reply.send(result);
            }

            AgentCommand::SetConfigOption {
                session_id,
                config_id,
                value,
                reply,
            } => {
                let _ = reply.send(set_config_option(&conn, &session_id, &config_id, value).await);
            }

            AgentCommand::Close => break,
        }
    }

    if let Err(e) = child.kill().await {
        debug!(error = %e, "adapter already gone at shutdown");
    }
    info!("agent worker stopped");
}

fn connect(
    config: &AgentConfig,
) -> Result<(Child, acp::ClientSideConnection, FacadeHandler), AgentError> {
    let Some((program, args)) = config.agent_command.split_first() else {
        return Err(AgentError::Acp("empty agent command".to_string()));
    };

    info!(program = %program, cwd = %config.cwd.display(), "spawning agent adapter");
    let mut child = Command::new(program)
        .args(args)
        .current_dir(&config.cwd)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(AgentError::Spawn)?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AgentError::Acp("failed to capture adapter stdin".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AgentError::Acp("failed to capture adapter stdout".to_string()))?;

    // Forward adapter stderr into our log unless suppressed.
    if let Some(stderr) = child.stderr.take() {
        if config.suppress_sdk_console_errors {
            drop(stderr);
        } else {
            tokio::task::spawn_local(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(target: "acpx::adapter", "{line}");
                }
            });
        }
    }

    let handler = FacadeHandler::new(
        config.permission_mode.clone(),
        config.non_interactive_permissions.clone(),
    );
    let (conn, handle_io) = acp::ClientSideConnection::new(
        handler.clone(),
        stdin.compat_write(),
        stdout.compat(),
        |fut| {
            tokio::task::spawn_local(fut);
        },
    );
    tokio::task::spawn_local(handle_io);

    Ok((child, conn, handler))
}

async fn initialize(conn: &acp::ClientSideConnection) -> Result<(), AgentError> {
    let fs_caps = acp::FileSystemCapabilities::new()
        .read_text_file(true)
        .write_text_file(true);
    let capabilities = acp::ClientCapabilities::new().fs(fs_caps).terminal(true);

    let request = acp::InitializeRequest::new(acp::ProtocolVersion::V1)
        .client_capabilities(capabilities)
        .client_info(acp::Implementation::new("acpx", env!("CARGO_PKG_VERSION")));

    let response = conn.initialize(request).await.map_err(AgentError::acp)?;
    if let Some(agent_info) = &response.agent_info {
        info!(
            agent = %agent_info.name,
            version = %agent_info.version,
            "agent adapter initialized"
        );
    } else {
        info!("agent adapter initialized");
    }
    Ok(())
}

async fn load_or_create(
    conn: &acp::ClientSideConnection,
    acp_session_id: Option<String>,
    cwd: std::path::PathBuf,
) -> Result<SessionInfo, AgentError> {
    if let Some(id) = acp_session_id {
        let request = acp::LoadSessionRequest::new(acp::SessionId::new(id.clone()), cwd.clone());
        match conn.load_session(request).await {
            Ok(_) => {
                info!(session_id = %id, "loaded adapter session");
                return Ok(SessionInfo {
                    acp_session_id: id,
                    capabilities: None,
                });
            }
            Err(e) => {
                debug!(session_id = %id, error = %e, "load_session unsupported or failed");
            }
        }
    }

    let response = conn
        .new_session(acp::NewSessionRequest::new(cwd))
        .await
        .map_err(AgentError::acp)?;

    let capabilities = capabilities_json(&response);
    let session_id = response.session_id.to_string();
    info!(%session_id, "created adapter session");
    Ok(SessionInfo {
        acp_session_id: session_id,
        capabilities,
    })
}

/// Snapshot the mode/model surface the adapter reported, for persistence
/// in the session record.
fn capabilities_json(response: &acp::NewSessionResponse) -> Option<serde_json::Value> {
    let modes = response
        .modes
        .as_ref()
        .and_then(|m| serde_json::to_value(m).ok());
    let models = response
        .models
        .as_ref()
        .and_then(|m| serde_json::to_value(m).ok());
    if modes.is_none() && models.is_none() {
        return None;
    }
    Some(serde_json::json!({
        "modes": modes,
        "models": models,
    }))
}

async fn set_config_option(
    conn: &acp::ClientSideConnection,
    session_id: &str,
    config_id: &str,
    value: serde_json::Value,
) -> Result<serde_json::Value, AgentError> {
    // Built through its wire form: `value` arrives as wire JSON and the
    // request type deserializes it into the right id newtype.
    let request: acp::SetSessionConfigOptionRequest = serde_json::from_value(serde_json::json!({
        "sessionId": session_id,
        "configId": config_id,
        "value": value,
    }))
    .map_err(|e| AgentError::Acp(format!("invalid config option value: {e}")))?;

    let response = conn
        .set_session_config_option(request)
        .await
        .map_err(AgentError::acp)?;
    serde_json::to_value(&response).map_err(|e| AgentError::Acp(e.to_string()))
}

fn stop_reason_str(reason: &acp::StopReason) -> String {
    serde_json::to_value(reason)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{reason:?}").to_lowercase())
}

async fn fail_all(commands: &mut mpsc::Receiver<AgentCommand>, error: &AgentError) {
    while let Some(command) = commands.recv().await {
        let message = error.to_string();
        match command {
            AgentCommand::Initialize { reply } => {
                let _ = reply.send(Err(AgentError::Acp(message)));
            }
            AgentCommand::LoadOrCreate { reply, .. } => {
                let _ = reply.send(Err(AgentError::Acp(message)));
            }
            AgentCommand::Prompt { done, started, .. } => {
                let _ = started.send(());
                let _ = done.send(Err(AgentError::Acp(message)));
            }
            AgentCommand::Cancel { reply, .. } => {
                let _ = reply.send(Err(AgentError::Acp(message)));
            }
            AgentCommand::SetMode { reply, .. } => {
                let _ = reply.send(Err(AgentError::Acp(message)));
            }
            AgentCommand::SetConfigOption { reply, .. } => {
                let _ = reply.send(Err(AgentError::Acp(message)));
            }
            AgentCommand::Close => break,
        }
    }
}
