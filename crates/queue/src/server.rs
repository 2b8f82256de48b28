// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue server: the owner side of the IPC socket.
//!
//! Accepts connections on the session's Unix socket, validates incoming
//! NDJSON requests, and splits them by kind: prompt submissions enter a
//! bounded FIFO the owner runtime consumes one at a time, while control
//! requests (cancel, set-mode, set-config) dispatch straight to the turn
//! controller — they run *coincident with* the active turn, never behind
//! it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::net::{unix::OwnedWriteHalf, UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::QueueError;
use crate::protocol::{
    self, line_reader, DetailCode, ErrorOrigin, QueueRequest, QueueResponse, RequestBody,
    ResponseBody,
};
use crate::turn::TurnController;

/// Prompt tasks waiting in the FIFO before the owner applies backpressure.
pub const QUEUE_CAPACITY: usize = 16;

/// Prompts waiting plus the one currently executing. Shared between the
/// server (increments on enqueue) and the runtime (decrements on turn
/// completion); reported in every heartbeat.
#[derive(Clone, Default)]
pub struct QueueDepth(Arc<AtomicUsize>);

impl QueueDepth {
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Prompt payload carried from the wire to the turn runner.
#[derive(Debug, Clone)]
pub struct PromptPayload {
    pub message: String,
    pub permission_mode: String,
    pub non_interactive_permissions: Option<String>,
    pub timeout_ms: Option<u64>,
    pub suppress_sdk_console_errors: bool,
}

/// One enqueued prompt: payload plus the connection to stream results to.
///
/// Control requests never become tasks; they are dispatched inline by the
/// connection handler.
pub struct QueueTask {
    pub request_id: String,
    pub payload: PromptPayload,
    pub wait_for_completion: bool,
    pub sink: ResponseSink,
}

/// Per-request writer onto a connection's outbound channel.
///
/// All responses for one connection flow through a single channel drained
/// by one writer task, so per-request ordering is the send order.
#[derive(Clone)]
pub struct ResponseSink {
    request_id: String,
    tx: mpsc::Sender<QueueResponse>,
}

impl ResponseSink {
    pub fn new(request_id: impl Into<String>, tx: mpsc::Sender<QueueResponse>) -> Self {
        Self {
            request_id: request_id.into(),
            tx,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Send one response; false when the client hung up.
    pub async fn send(&self, body: ResponseBody) -> bool {
        let response = QueueResponse {
            request_id: self.request_id.clone(),
            body,
        };
        self.tx.send(response).await.is_ok()
    }

    pub async fn accepted(&self) -> bool {
        self.send(ResponseBody::Accepted).await
    }

    pub async fn error(&self, err: &QueueError, origin: ErrorOrigin) -> bool {
        self.send(ResponseBody::Error(err.to_error_body(origin))).await
    }
}

/// Owner-side socket server. Dropping the handle (or calling
/// [`QueueServer::shutdown`]) stops accepting; in-flight connection tasks
/// end when their streams close.
pub struct QueueServer {
    accept_task: JoinHandle<()>,
    depth: QueueDepth,
}

impl QueueServer {
    /// Spawn the accept loop. Returns the server handle and the prompt FIFO
    /// receiver for the owner runtime.
    pub fn spawn(
        listener: UnixListener,
        controller: Arc<TurnController>,
        depth: QueueDepth,
    ) -> (Self, mpsc::Receiver<QueueTask>) {
        let (tasks_tx, tasks_rx) = mpsc::channel(QUEUE_CAPACITY);

        let accept_depth = depth.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let controller = Arc::clone(&controller);
                        let tasks_tx = tasks_tx.clone();
                        let depth = accept_depth.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, controller, tasks_tx, depth).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept error");
                    }
                }
            }
        });

        (
            Self {
                accept_task,
                depth,
            },
            tasks_rx,
        )
    }

    pub fn queue_depth(&self) -> usize {
        self.depth.get()
    }

    /// Stop accepting connections and close the listening socket.
    pub fn shutdown(&self) {
        self.accept_task.abort();
    }
}

impl Drop for QueueServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Read requests off one connection until EOF or a protocol violation.
async fn handle_connection(
    stream: UnixStream,
    controller: Arc<TurnController>,
    tasks_tx: mpsc::Sender<QueueTask>,
    depth: QueueDepth,
) {
    let (read_half, write_half) = stream.into_split();
    let (response_tx, response_rx) = mpsc::channel::<QueueResponse>(64);
    let writer = tokio::spawn(write_loop(write_half, response_rx));

    let mut frames = line_reader(read_half);
    loop {
        let line = match frames.next().await {
            None => break,
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                let err = QueueError::from(protocol::ProtocolError::from(e));
                let sink = ResponseSink::new("", response_tx.clone());
                sink.error(&err, ErrorOrigin::Queue).await;
                break;
            }
        };

        match serde_json::from_str::<QueueRequest>(&line) {
            Ok(request) => {
                if !dispatch_request(request, &controller, &tasks_tx, &depth, &response_tx).await {
                    break;
                }
            }
            Err(_) => {
                // Distinguish non-JSON from a JSON object of the wrong
                // shape; echo the request id when one is recoverable.
                let (detail, request_id) = match serde_json::from_str::<serde_json::Value>(&line) {
                    Err(_) => (DetailCode::ProtocolInvalidJson, String::new()),
                    Ok(value) => (
                        DetailCode::ProtocolMalformedMessage,
                        value
                            .get("requestId")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                    ),
                };
                warn!(detail = detail_str(detail), "rejecting malformed request");
                let err = QueueError::protocol(detail, "request failed validation");
                let sink = ResponseSink::new(request_id, response_tx.clone());
                sink.error(&err, ErrorOrigin::Queue).await;
                break;
            }
        }
    }

    drop(response_tx);
    let _ = writer.await;
    debug!("connection closed");
}

fn detail_str(detail: DetailCode) -> &'static str {
    match detail {
        DetailCode::ProtocolInvalidJson => "QUEUE_PROTOCOL_INVALID_JSON",
        _ => "QUEUE_PROTOCOL_MALFORMED_MESSAGE",
    }
}

/// Route one validated request. Returns false when the connection should
/// close.
async fn dispatch_request(
    request: QueueRequest,
    controller: &Arc<TurnController>,
    tasks_tx: &mpsc::Sender<QueueTask>,
    depth: &QueueDepth,
    response_tx: &mpsc::Sender<QueueResponse>,
) -> bool {
    let sink = ResponseSink::new(request.request_id.clone(), response_tx.clone());

    match request.body {
        RequestBody::SubmitPrompt {
            message,
            permission_mode,
            non_interactive_permissions,
            timeout_ms,
            suppress_sdk_console_errors,
            wait_for_completion,
        } => {
            if controller.is_closing() {
                sink.error(
                    &QueueError::not_accepting("queue owner is closing"),
                    ErrorOrigin::Queue,
                )
                .await;
                return false;
            }

            depth.increment();
            // Ack before enqueue: the runtime streams results through the
            // same per-connection channel, so sending first guarantees the
            // client never sees an update ahead of `accepted`.
            sink.accepted().await;

            let task = QueueTask {
                request_id: request.request_id,
                payload: PromptPayload {
                    message,
                    permission_mode,
                    non_interactive_permissions,
                    timeout_ms,
                    suppress_sdk_console_errors,
                },
                wait_for_completion,
                sink: sink.clone(),
            };
            if tasks_tx.send(task).await.is_err() {
                depth.decrement();
                sink.error(&QueueError::OwnerClosing, ErrorOrigin::Queue).await;
                return false;
            }
            true
        }

        RequestBody::CancelPrompt => {
            let controller = Arc::clone(controller);
            tokio::spawn(async move {
                sink.accepted().await;
                let cancelled = controller.request_cancel(sink.request_id()).await;
                sink.send(ResponseBody::CancelResult { cancelled }).await;
            });
            true
        }

        RequestBody::SetMode { mode_id, timeout_ms } => {
            let controller = Arc::clone(controller);
            tokio::spawn(async move {
                sink.accepted().await;
                match controller.set_session_mode(&mode_id, timeout_ms).await {
                    Ok(()) => {
                        sink.send(ResponseBody::SetModeResult).await;
                    }
                    Err(e) => {
                        sink.error(&e, control_origin(&e)).await;
                    }
                }
            });
            true
        }

        RequestBody::SetConfigOption {
            config_id,
            value,
            timeout_ms,
        } => {
            let controller = Arc::clone(controller);
            tokio::spawn(async move {
                sink.accepted().await;
                match controller
                    .set_session_config_option(&config_id, value, timeout_ms)
                    .await
                {
                    Ok(response) => {
                        sink.send(ResponseBody::SetConfigOptionResult { response }).await;
                    }
                    Err(e) => {
                        sink.error(&e, control_origin(&e)).await;
                    }
                }
            });
            true
        }
    }
}

fn control_origin(err: &QueueError) -> ErrorOrigin {
    match err {
        QueueError::Runtime { acp: Some(_), .. } => ErrorOrigin::Agent,
        QueueError::Runtime { .. } => ErrorOrigin::Runtime,
        _ => ErrorOrigin::Queue,
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<QueueResponse>) {
    while let Some(response) = rx.recv().await {
        if let Err(e) = protocol::write_line(&mut writer, &response).await {
            debug!(error = %e, "client write failed, dropping connection");
            break;
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
