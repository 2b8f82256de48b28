// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue client: the foreground side of the IPC socket.
//!
//! Each `try_*_on_running_owner` call reads the session's lease, verifies
//! the recorded owner is alive, connects with bounded retries, performs one
//! request/response exchange, and demultiplexes streamed updates into the
//! caller's [`UpdateSink`]. `Ok(None)` means "no live owner" — the caller
//! decides whether to spawn one (see [`crate::spawn`]).

use std::time::Duration;

use futures::StreamExt;
use tokio::net::{unix::OwnedReadHalf, UnixStream};
use tracing::debug;

use crate::env;
use crate::error::QueueError;
use crate::lease::{process_exists, LeaseStore};
use crate::protocol::{
    self, line_reader, DetailCode, LineReader, PromptResult, QueueRequest, QueueResponse,
    RequestBody, ResponseBody,
};

use acpx_core::lease::QueueOwnerLease;

/// Streamed-update callbacks supplied by the output formatter.
///
/// Methods take `&self`: one formatter instance is shared across the retry
/// loop in spawn-or-attach, so stateful formatters use interior mutability.
pub trait UpdateSink: Sync {
    fn on_session_update(&self, notification: &serde_json::Value);
    fn on_client_operation(&self, operation: &serde_json::Value);
    fn on_done(&self, _stop_reason: &str) {}
    fn on_error(&self, error: &crate::protocol::ErrorBody);
}

/// Options for one prompt submission.
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub message: String,
    pub permission_mode: String,
    pub non_interactive_permissions: Option<String>,
    pub timeout_ms: Option<u64>,
    pub suppress_sdk_console_errors: bool,
    pub wait_for_completion: bool,
}

/// How a prompt submission resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// `wait_for_completion=true`: the turn ran to its terminal.
    Completed { result: PromptResult },
    /// `wait_for_completion=false`: the owner accepted the prompt.
    Queued { request_id: String },
}

/// Submit a prompt to an already-running owner.
///
/// Returns `Ok(None)` when no live owner holds the session's lease.
pub async fn try_submit_to_running_owner(
    store: &LeaseStore,
    session_id: &str,
    request_id: String,
    opts: &SubmitOptions,
    sink: &dyn UpdateSink,
) -> Result<Option<SubmitOutcome>, QueueError> {
    let Some(conn) = Connection::open(store, session_id).await? else {
        return Ok(None);
    };

    let request = QueueRequest {
        request_id: request_id.clone(),
        body: RequestBody::SubmitPrompt {
            message: opts.message.clone(),
            permission_mode: opts.permission_mode.clone(),
            non_interactive_permissions: opts.non_interactive_permissions.clone(),
            timeout_ms: opts.timeout_ms,
            suppress_sdk_console_errors: opts.suppress_sdk_console_errors,
            wait_for_completion: opts.wait_for_completion,
        },
    };

    let exchange = read_prompt_stream(conn, request, opts.wait_for_completion, sink);
    let outcome = match opts.timeout_ms {
        Some(ms) => {
            let limit = Duration::from_millis(ms);
            tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| QueueError::Timeout(limit))??
        }
        None => exchange.await?,
    };
    Ok(Some(outcome))
}

/// Cancel the owner's in-flight prompt. `Ok(None)` when no live owner.
pub async fn try_cancel_on_running_owner(
    store: &LeaseStore,
    session_id: &str,
    request_id: String,
) -> Result<Option<bool>, QueueError> {
    let Some(mut conn) = Connection::open(store, session_id).await? else {
        return Ok(None);
    };

    conn.send(&QueueRequest {
        request_id: request_id.clone(),
        body: RequestBody::CancelPrompt,
    })
    .await?;

    let body = conn.read_control_terminal(&request_id, env::control_timeout()).await?;
    match body {
        ResponseBody::CancelResult { cancelled } => Ok(Some(cancelled)),
        other => Err(unexpected_response(&other)),
    }
}

/// Switch the session mode on the owner. `Ok(None)` when no live owner.
pub async fn try_set_mode_on_running_owner(
    store: &LeaseStore,
    session_id: &str,
    request_id: String,
    mode_id: &str,
    timeout_ms: Option<u64>,
) -> Result<Option<()>, QueueError> {
    let Some(mut conn) = Connection::open(store, session_id).await? else {
        return Ok(None);
    };

    conn.send(&QueueRequest {
        request_id: request_id.clone(),
        body: RequestBody::SetMode {
            mode_id: mode_id.to_string(),
            timeout_ms,
        },
    })
    .await?;

    let limit = control_limit(timeout_ms);
    match conn.read_control_terminal(&request_id, limit).await? {
        ResponseBody::SetModeResult => Ok(Some(())),
        other => Err(unexpected_response(&other)),
    }
}

/// Change one config option on the owner. `Ok(None)` when no live owner.
pub async fn try_set_config_option_on_running_owner(
    store: &LeaseStore,
    session_id: &str,
    request_id: String,
    config_id: &str,
    value: serde_json::Value,
    timeout_ms: Option<u64>,
) -> Result<Option<serde_json::Value>, QueueError> {
    let Some(mut conn) = Connection::open(store, session_id).await? else {
        return Ok(None);
    };

    conn.send(&QueueRequest {
        request_id: request_id.clone(),
        body: RequestBody::SetConfigOption {
            config_id: config_id.to_string(),
            value,
            timeout_ms,
        },
    })
    .await?;

    let limit = control_limit(timeout_ms);
    match conn.read_control_terminal(&request_id, limit).await? {
        ResponseBody::SetConfigOptionResult { response } => Ok(Some(response)),
        other => Err(unexpected_response(&other)),
    }
}

fn control_limit(timeout_ms: Option<u64>) -> Duration {
    // The owner wraps the adapter call in its own timeout; give the wire a
    // little slack on top so the owner's error arrives before ours fires.
    timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(env::control_timeout)
        + env::timeout_ipc()
}

fn unexpected_response(body: &ResponseBody) -> QueueError {
    QueueError::protocol(
        DetailCode::ProtocolUnexpectedResponse,
        format!("unexpected response from owner: {body:?}"),
    )
}

/// One open exchange with the owner.
struct Connection {
    frames: LineReader<OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
    acked: bool,
}

impl Connection {
    /// Gate on the lease, then connect with bounded retries.
    ///
    /// Retries only not-found / connection-refused (the owner may still be
    /// binding its socket), and aborts early when the recorded pid dies —
    /// in both exhaustion cases the error is retryable so spawn-or-attach
    /// can take over.
    async fn open(store: &LeaseStore, session_id: &str) -> Result<Option<Self>, QueueError> {
        let Some(lease) = store.read(session_id)? else {
            return Ok(None);
        };
        if !store.ensure_usable(session_id, &lease) {
            return Ok(None);
        }

        let stream = Self::connect_with_retry(&lease).await?;
        let (read_half, writer) = stream.into_split();
        Ok(Some(Self {
            frames: line_reader(read_half),
            writer,
            acked: false,
        }))
    }

    async fn connect_with_retry(lease: &QueueOwnerLease) -> Result<UnixStream, QueueError> {
        let attempts = env::connect_attempts();
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(env::connect_poll()).await;
            }
            if !process_exists(lease.pid) {
                return Err(QueueError::not_accepting(format!(
                    "queue owner (pid {}) died before accepting the connection",
                    lease.pid
                )));
            }
            match UnixStream::connect(&lease.socket_path).await {
                Ok(stream) => return Ok(stream),
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    debug!(attempt, error = %e, "owner socket not ready");
                }
                Err(e) => {
                    return Err(QueueError::connection(
                        DetailCode::NotAcceptingRequests,
                        format!("could not connect to queue owner: {e}"),
                        false,
                    ));
                }
            }
        }
        Err(QueueError::not_accepting(
            "queue owner socket did not accept within the retry budget",
        ))
    }

    async fn send(&mut self, request: &QueueRequest) -> Result<(), QueueError> {
        let limit = env::timeout_ipc();
        tokio::time::timeout(limit, protocol::write_line(&mut self.writer, request))
            .await
            .map_err(|_| QueueError::Timeout(limit))?
            .map_err(QueueError::from)
    }

    /// Classify a disconnect by whether `accepted` was already seen.
    fn disconnect_error(&self) -> QueueError {
        if self.acked {
            QueueError::connection(
                DetailCode::DisconnectedBeforeCompletion,
                "owner closed the connection before a terminal message",
                true,
            )
        } else {
            QueueError::connection(
                DetailCode::DisconnectedBeforeAck,
                "owner closed the connection before acknowledging the request",
                true,
            )
        }
    }

    async fn next(&mut self) -> Result<Option<QueueResponse>, QueueError> {
        match self.frames.next().await {
            None => Ok(None),
            Some(Err(e)) => Err(protocol::ProtocolError::from(e).into()),
            Some(Ok(line)) => {
                let response: QueueResponse = serde_json::from_str(&line).map_err(|e| {
                    QueueError::protocol(
                        DetailCode::ProtocolMalformedMessage,
                        format!("unparseable response from owner: {e}"),
                    )
                })?;
                Ok(Some(response))
            }
        }
    }

    /// Control exchange: `accepted`, then exactly one terminal.
    async fn read_control_terminal(
        &mut self,
        request_id: &str,
        limit: Duration,
    ) -> Result<ResponseBody, QueueError> {
        let read = async {
            loop {
                let Some(response) = self.next().await? else {
                    return Err(self.disconnect_error());
                };
                if response.body.is_terminal() && response.request_id != request_id {
                    return Err(QueueError::protocol(
                        DetailCode::ProtocolMalformedMessage,
                        format!(
                            "terminal response for unknown request {} (expected {})",
                            response.request_id, request_id
                        ),
                    ));
                }
                match response.body {
                    ResponseBody::Accepted => {
                        self.acked = true;
                    }
                    body if body.is_terminal() => {
                        if let ResponseBody::Error(err) = body {
                            return Err(QueueError::from_error_body(err));
                        }
                        return Ok(body);
                    }
                    body => return Err(unexpected_response(&body)),
                }
            }
        };
        tokio::time::timeout(limit, read)
            .await
            .map_err(|_| QueueError::Timeout(limit))?
    }
}

/// Prompt exchange: `accepted`, streamed updates, then `done` + `result`
/// (or a terminal `error`).
async fn read_prompt_stream(
    mut conn: Connection,
    request: QueueRequest,
    wait_for_completion: bool,
    sink: &dyn UpdateSink,
) -> Result<SubmitOutcome, QueueError> {
    let request_id = request.request_id.clone();
    conn.send(&request).await?;

    loop {
        let Some(response) = conn.next().await? else {
            return Err(conn.disconnect_error());
        };
        if response.body.is_terminal() && response.request_id != request_id {
            return Err(QueueError::protocol(
                DetailCode::ProtocolMalformedMessage,
                format!(
                    "terminal response for unknown request {} (expected {})",
                    response.request_id, request_id
                ),
            ));
        }
        if response.request_id != request_id {
            // Streamed message for another request on a shared connection;
            // not ours to interpret.
            continue;
        }

        match response.body {
            ResponseBody::Accepted => {
                conn.acked = true;
                if !wait_for_completion {
                    return Ok(SubmitOutcome::Queued { request_id });
                }
            }
            ResponseBody::SessionUpdate { notification } => {
                sink.on_session_update(&notification);
            }
            ResponseBody::ClientOperation { operation } => {
                sink.on_client_operation(&operation);
            }
            ResponseBody::Done { stop_reason } => {
                sink.on_done(&stop_reason);
            }
            ResponseBody::Result { result } => {
                return Ok(SubmitOutcome::Completed { result });
            }
            ResponseBody::Error(err) => {
                sink.on_error(&err);
                return Err(QueueError::from_error_body(err));
            }
            body @ (ResponseBody::CancelResult { .. }
            | ResponseBody::SetModeResult
            | ResponseBody::SetConfigOptionResult { .. }) => {
                return Err(unexpected_response(&body));
            }
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
