// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol between queue clients and the queue owner.
//!
//! Wire format: one JSON object per line, UTF-8, `\n`-terminated (NDJSON).
//! Every request carries a `type` tag and a caller-chosen `requestId`; every
//! owner response echoes the same `requestId`.
//!
//! Message sequences per request:
//! - control (`cancel_prompt`, `set_mode`, `set_config_option`):
//!   `accepted` then exactly one terminal (`*_result` or `error`)
//! - prompt (`submit_prompt`):
//!   `accepted`, zero or more `session_update`/`client_operation`, then
//!   `done` followed by `result` — or a terminal `error`, which may arrive
//!   before or after `accepted`.

use futures::StreamExt;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

/// Maximum accepted line length: 1 MiB. Generous for a 200 KiB prompt body
/// after JSON escaping, while bounding allocation for a malformed peer.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Line too long: exceeded {MAX_LINE_BYTES} bytes")]
    LineTooLong,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout")]
    Timeout,
}

impl From<LinesCodecError> for ProtocolError {
    fn from(e: LinesCodecError) -> Self {
        match e {
            LinesCodecError::MaxLineLengthExceeded => ProtocolError::LineTooLong,
            LinesCodecError::Io(io) => ProtocolError::Io(io),
        }
    }
}

/// Request from a queue client to the owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueRequest {
    /// Caller-chosen id echoed on every response.
    pub request_id: String,
    #[serde(flatten)]
    pub body: RequestBody,
}

/// Request kinds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestBody {
    /// Enqueue a prompt turn.
    #[serde(rename_all = "camelCase")]
    SubmitPrompt {
        message: String,
        permission_mode: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        non_interactive_permissions: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        #[serde(default)]
        suppress_sdk_console_errors: bool,
        wait_for_completion: bool,
    },

    /// Cancel the in-flight (or about-to-start) prompt turn.
    CancelPrompt,

    /// Switch the adapter session mode.
    #[serde(rename_all = "camelCase")]
    SetMode {
        mode_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },

    /// Change one adapter session config option.
    #[serde(rename_all = "camelCase")]
    SetConfigOption {
        config_id: String,
        value: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
}

/// Response from the owner to a queue client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueResponse {
    /// Id of the request this message answers.
    pub request_id: String,
    #[serde(flatten)]
    pub body: ResponseBody,
}

/// Response kinds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Task enqueued; further messages may follow.
    Accepted,

    /// One streamed ACP session update (prompt only).
    SessionUpdate { notification: serde_json::Value },

    /// One client-side side-effect report (prompt only).
    ClientOperation { operation: serde_json::Value },

    /// Terminal turn marker (prompt only); `result` follows.
    #[serde(rename_all = "camelCase")]
    Done { stop_reason: String },

    /// Final result payload with turn stats (prompt only).
    Result { result: PromptResult },

    /// Terminal for `cancel_prompt`.
    CancelResult { cancelled: bool },

    /// Terminal for `set_mode`.
    SetModeResult,

    /// Terminal for `set_config_option`.
    SetConfigOptionResult { response: serde_json::Value },

    /// Terminal failure; may occur before or after `accepted`.
    Error(ErrorBody),
}

impl ResponseBody {
    /// True for messages that end the request's message sequence.
    ///
    /// `done` is not terminal: the grammar requires a `result` after it.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResponseBody::Result { .. }
                | ResponseBody::CancelResult { .. }
                | ResponseBody::SetModeResult
                | ResponseBody::SetConfigOptionResult { .. }
                | ResponseBody::Error(_)
        )
    }
}

/// Final stats for a completed prompt turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptResult {
    pub stop_reason: String,
    pub duration_ms: u64,
    pub update_count: u64,
}

/// Coarse error kind, mirrored from the client-side error enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Connection,
    Protocol,
    Timeout,
    Interrupted,
    Runtime,
}

/// Where a failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOrigin {
    /// Queue coordination itself (lease, socket, framing).
    Queue,
    /// The owner runtime driving the turn.
    Runtime,
    /// The agent adapter, carried through the `acp` envelope.
    Agent,
}

/// Specific failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetailCode {
    #[serde(rename = "QUEUE_PROTOCOL_INVALID_JSON")]
    ProtocolInvalidJson,
    #[serde(rename = "QUEUE_PROTOCOL_MALFORMED_MESSAGE")]
    ProtocolMalformedMessage,
    #[serde(rename = "QUEUE_PROTOCOL_UNEXPECTED_RESPONSE")]
    ProtocolUnexpectedResponse,
    #[serde(rename = "QUEUE_DISCONNECTED_BEFORE_ACK")]
    DisconnectedBeforeAck,
    #[serde(rename = "QUEUE_DISCONNECTED_BEFORE_COMPLETION")]
    DisconnectedBeforeCompletion,
    #[serde(rename = "QUEUE_NOT_ACCEPTING_REQUESTS")]
    NotAcceptingRequests,
    #[serde(rename = "QUEUE_OWNER_CLOSING")]
    OwnerClosing,
    #[serde(rename = "QUEUE_REQUEST_TIMEOUT")]
    RequestTimeout,
    #[serde(rename = "QUEUE_REQUEST_INTERRUPTED")]
    RequestInterrupted,
    #[serde(rename = "QUEUE_RUNTIME_PROMPT_FAILED")]
    RuntimePromptFailed,
}

/// Wire form of a terminal failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub detail_code: DetailCode,
    pub origin: ErrorOrigin,
    pub message: String,
    pub retryable: bool,
    /// Adapter-side ACP error payload, when the failure came from the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acp: Option<serde_json::Value>,
}

/// Line reader over one direction of a stream socket.
pub type LineReader<R> = FramedRead<R, LinesCodec>;

/// Wrap a read half in a max-length NDJSON line reader.
pub fn line_reader<R: AsyncRead + Unpin>(reader: R) -> LineReader<R> {
    FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_BYTES))
}

/// Read the next message, `Ok(None)` on a clean EOF.
pub async fn next_message<T, R>(frames: &mut LineReader<R>) -> Result<Option<T>, ProtocolError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    match frames.next().await {
        None => Ok(None),
        Some(Err(e)) => Err(e.into()),
        Some(Ok(line)) => Ok(Some(serde_json::from_str(&line)?)),
    }
}

/// Serialize a message to its single-line wire form (newline included).
pub fn encode<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(msg)?;
    if line.len() > MAX_LINE_BYTES {
        return Err(ProtocolError::LineTooLong);
    }
    line.push('\n');
    Ok(line)
}

/// Write one message as an NDJSON line and flush.
pub async fn write_line<W, T>(writer: &mut W, msg: &T) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let line = encode(msg)?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
