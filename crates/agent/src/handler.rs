// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side ACP handler.
//!
//! The adapter calls back into us for session updates, permission
//! decisions, and filesystem access. Everything observable is forwarded to
//! the current prompt's update channel so the owner can stream it to the
//! submitting client.

use std::sync::Arc;

use agent_client_protocol as acp;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::client::AgentUpdate;

/// What to do with an incoming permission request, derived from the
/// permission mode and the non-interactive policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    Reject,
}

/// Headless permission policy.
///
/// The full policy module lives outside this crate; the facade only needs
/// enough to keep a headless turn moving: reject when the non-interactive
/// policy says deny, otherwise allow.
pub fn permission_decision(
    permission_mode: &str,
    non_interactive_permissions: Option<&str>,
) -> PermissionDecision {
    if let Some(policy) = non_interactive_permissions {
        if policy.eq_ignore_ascii_case("deny") || policy.eq_ignore_ascii_case("reject") {
            return PermissionDecision::Reject;
        }
    }
    match permission_mode {
        "reject" | "deny" => PermissionDecision::Reject,
        _ => PermissionDecision::Allow,
    }
}

/// Per-prompt state the handler consults while a turn is in flight.
#[derive(Default)]
struct PromptContext {
    updates: Option<mpsc::Sender<AgentUpdate>>,
    permission_mode: String,
    non_interactive_permissions: Option<String>,
}

/// The `acp::Client` implementation handed to the connection.
#[derive(Clone)]
pub struct FacadeHandler {
    context: Arc<Mutex<PromptContext>>,
}

impl FacadeHandler {
    pub fn new(permission_mode: String, non_interactive_permissions: Option<String>) -> Self {
        Self {
            context: Arc::new(Mutex::new(PromptContext {
                updates: None,
                permission_mode,
                non_interactive_permissions,
            })),
        }
    }

    /// Install the update channel and permission context for a new prompt.
    pub fn begin_prompt(
        &self,
        updates: mpsc::Sender<AgentUpdate>,
        permission_mode: String,
        non_interactive_permissions: Option<String>,
    ) {
        let mut ctx = self.context.lock();
        ctx.updates = Some(updates);
        ctx.permission_mode = permission_mode;
        ctx.non_interactive_permissions = non_interactive_permissions;
    }

    pub fn end_prompt(&self) {
        self.context.lock().updates = None;
    }

    async fn emit(&self, update: AgentUpdate) {
        let tx = self.context.lock().updates.clone();
        if let Some(tx) = tx {
            if tx.send(update).await.is_err() {
                debug!("update receiver dropped mid-turn");
            }
        }
    }

    async fn report_operation(&self, operation: serde_json::Value) {
        self.emit(AgentUpdate::ClientOperation(operation)).await;
    }

    fn decision(&self) -> PermissionDecision {
        let ctx = self.context.lock();
        permission_decision(
            &ctx.permission_mode,
            ctx.non_interactive_permissions.as_deref(),
        )
    }
}

#[async_trait::async_trait(?Send)]
impl acp::Client for FacadeHandler {
    async fn request_permission(
        &self,
        args: acp::RequestPermissionRequest,
    ) -> acp::Result<acp::RequestPermissionResponse> {
        let decision = self.decision();
        let matching = args.options.iter().find(|opt| match decision {
            PermissionDecision::Allow => {
                matches!(opt.kind, acp::PermissionOptionKind::AllowOnce)
            }
            PermissionDecision::Reject => {
                matches!(opt.kind, acp::PermissionOptionKind::RejectOnce)
            }
        });
        // A reject with no reject option falls through to Cancelled; an
        // allow with no allow-once option takes whatever the adapter lists
        // first.
        let option = match decision {
            PermissionDecision::Allow => matching.or_else(|| args.options.first()),
            PermissionDecision::Reject => matching,
        };

        self.report_operation(serde_json::json!({
            "kind": "permission_request",
            "toolCallId": args.tool_call.tool_call_id.to_string(),
            "decision": match decision {
                PermissionDecision::Allow => "allow",
                PermissionDecision::Reject => "reject",
            },
        }))
        .await;

        match option {
            Some(option) => Ok(acp::RequestPermissionResponse::new(
                acp::RequestPermissionOutcome::Selected(acp::SelectedPermissionOutcome::new(
                    option.option_id.clone(),
                )),
            )),
            None => Ok(acp::RequestPermissionResponse::new(
                acp::RequestPermissionOutcome::Cancelled,
            )),
        }
    }

    async fn session_notification(&self, args: acp::SessionNotification) -> acp::Result<()> {
        match serde_json::to_value(&args) {
            Ok(notification) => self.emit(AgentUpdate::Session(notification)).await,
            Err(e) => warn!(error = %e, "unserializable session notification"),
        }
        Ok(())
    }

    async fn read_text_file(
        &self,
        args: acp::ReadTextFileRequest,
    ) -> acp::Result<acp::ReadTextFileResponse> {
        let content = tokio::fs::read_to_string(&args.path).await.map_err(|e| {
            acp::Error::internal_error()
                .data(serde_json::json!({"error": format!("failed to read file: {e}")}))
        })?;

        let content = if args.line.is_some() || args.limit.is_some() {
            let lines: Vec<&str> = content.lines().collect();
            let start = args.line.unwrap_or(0) as usize;
            let limit = args.limit.map(|l| l as usize).unwrap_or(lines.len());
            let end = (start + limit).min(lines.len());
            lines[start.min(lines.len())..end].join("\n")
        } else {
            content
        };

        self.report_operation(serde_json::json!({
            "kind": "read_text_file",
            "path": args.path,
            "bytes": content.len(),
        }))
        .await;

        Ok(acp::ReadTextFileResponse::new(content))
    }

    async fn write_text_file(
        &self,
        args: acp::WriteTextFileRequest,
    ) -> acp::Result<acp::WriteTextFileResponse> {
        if let Some(parent) = args.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                acp::Error::internal_error()
                    .data(serde_json::json!({"error": format!("failed to create dirs: {e}")}))
            })?;
        }
        tokio::fs::write(&args.path, &args.content).await.map_err(|e| {
            acp::Error::internal_error()
                .data(serde_json::json!({"error": format!("failed to write file: {e}")}))
        })?;

        self.report_operation(serde_json::json!({
            "kind": "write_text_file",
            "path": args.path,
            "bytes": args.content.len(),
        }))
        .await;

        Ok(acp::WriteTextFileResponse::new())
    }

    async fn create_terminal(
        &self,
        _args: acp::CreateTerminalRequest,
    ) -> acp::Result<acp::CreateTerminalResponse> {
        Err(acp::Error::method_not_found())
    }

    async fn terminal_output(
        &self,
        _args: acp::TerminalOutputRequest,
    ) -> acp::Result<acp::TerminalOutputResponse> {
        Err(acp::Error::method_not_found())
    }

    async fn release_terminal(
        &self,
        _args: acp::ReleaseTerminalRequest,
    ) -> acp::Result<acp::ReleaseTerminalResponse> {
        Err(acp::Error::method_not_found())
    }

    async fn wait_for_terminal_exit(
        &self,
        _args: acp::WaitForTerminalExitRequest,
    ) -> acp::Result<acp::WaitForTerminalExitResponse> {
        Err(acp::Error::method_not_found())
    }

    async fn kill_terminal(
        &self,
        _args: acp::KillTerminalRequest,
    ) -> acp::Result<acp::KillTerminalResponse> {
        Err(acp::Error::method_not_found())
    }

    async fn ext_method(&self, _args: acp::ExtRequest) -> acp::Result<acp::ExtResponse> {
        Err(acp::Error::method_not_found())
    }

    async fn ext_notification(&self, _args: acp::ExtNotification) -> acp::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
