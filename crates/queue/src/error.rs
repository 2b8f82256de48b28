// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue error model.
//!
//! One enum spans both sides of the socket: the owner converts a
//! [`QueueError`] into a wire [`ErrorBody`] for the task's connection, and
//! the client reconstructs a `QueueError` from a received `ErrorBody` before
//! rejecting its local call. Retryable errors re-enter spawn-or-attach until
//! its deadline.

use std::time::Duration;
use thiserror::Error;

use crate::protocol::{DetailCode, ErrorBody, ErrorCode, ErrorOrigin, ProtocolError};

#[derive(Debug, Error)]
pub enum QueueError {
    /// Transport-level failure: refused, missing ack, disconnect.
    #[error("{message}")]
    Connection {
        detail: DetailCode,
        message: String,
        retryable: bool,
    },

    /// The peer spoke the protocol wrong: bad JSON, bad shape, wrong id.
    #[error("{message}")]
    Protocol { detail: DetailCode, message: String },

    /// A timeout bounded the call.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The caller was interrupted (SIGINT).
    #[error("Interrupted")]
    Interrupted,

    /// The owner is shutting down and rejects new work.
    #[error("queue owner is closing")]
    OwnerClosing,

    /// The owner runtime or the adapter failed mid-turn.
    #[error("{message}")]
    Runtime {
        message: String,
        retryable: bool,
        acp: Option<serde_json::Value>,
    },

    #[error("Lease error: {0}")]
    Lease(#[from] crate::lease::LeaseError),
}

impl QueueError {
    pub fn connection(detail: DetailCode, message: impl Into<String>, retryable: bool) -> Self {
        QueueError::Connection {
            detail,
            message: message.into(),
            retryable,
        }
    }

    pub fn protocol(detail: DetailCode, message: impl Into<String>) -> Self {
        QueueError::Protocol {
            detail,
            message: message.into(),
        }
    }

    /// Owner is not reachable or not accepting; spawn-or-attach may retry.
    pub fn not_accepting(message: impl Into<String>) -> Self {
        Self::connection(DetailCode::NotAcceptingRequests, message, true)
    }

    /// Whether spawn-or-attach should keep trying within its deadline.
    pub fn is_retryable(&self) -> bool {
        match self {
            QueueError::Connection { retryable, .. } => *retryable,
            QueueError::Runtime { retryable, .. } => *retryable,
            QueueError::Protocol { .. }
            | QueueError::Timeout(_)
            | QueueError::Interrupted
            | QueueError::OwnerClosing
            | QueueError::Lease(_) => false,
        }
    }

    pub fn detail_code(&self) -> DetailCode {
        match self {
            QueueError::Connection { detail, .. } => *detail,
            QueueError::Protocol { detail, .. } => *detail,
            QueueError::Timeout(_) => DetailCode::RequestTimeout,
            QueueError::Interrupted => DetailCode::RequestInterrupted,
            QueueError::OwnerClosing => DetailCode::OwnerClosing,
            QueueError::Runtime { .. } => DetailCode::RuntimePromptFailed,
            QueueError::Lease(_) => DetailCode::NotAcceptingRequests,
        }
    }

    fn code(&self) -> ErrorCode {
        match self {
            QueueError::Connection { .. } | QueueError::Lease(_) => ErrorCode::Connection,
            QueueError::Protocol { .. } => ErrorCode::Protocol,
            QueueError::Timeout(_) => ErrorCode::Timeout,
            QueueError::Interrupted => ErrorCode::Interrupted,
            QueueError::OwnerClosing | QueueError::Runtime { .. } => ErrorCode::Runtime,
        }
    }

    /// Wire form for the owner side of the socket.
    pub fn to_error_body(&self, origin: ErrorOrigin) -> ErrorBody {
        let acp = match self {
            QueueError::Runtime { acp, .. } => acp.clone(),
            _ => None,
        };
        ErrorBody {
            code: self.code(),
            detail_code: self.detail_code(),
            origin,
            message: self.to_string(),
            retryable: self.is_retryable(),
            acp,
        }
    }

    /// Client-side reconstruction of a received terminal error.
    pub fn from_error_body(body: ErrorBody) -> Self {
        match body.detail_code {
            DetailCode::RequestTimeout => QueueError::Timeout(Duration::ZERO),
            DetailCode::RequestInterrupted => QueueError::Interrupted,
            DetailCode::OwnerClosing => QueueError::OwnerClosing,
            DetailCode::RuntimePromptFailed => QueueError::Runtime {
                message: body.message,
                retryable: body.retryable,
                acp: body.acp,
            },
            DetailCode::ProtocolInvalidJson
            | DetailCode::ProtocolMalformedMessage
            | DetailCode::ProtocolUnexpectedResponse => QueueError::Protocol {
                detail: body.detail_code,
                message: body.message,
            },
            DetailCode::DisconnectedBeforeAck
            | DetailCode::DisconnectedBeforeCompletion
            | DetailCode::NotAcceptingRequests => QueueError::Connection {
                detail: body.detail_code,
                message: body.message,
                retryable: body.retryable,
            },
        }
    }
}

impl From<ProtocolError> for QueueError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Json(err) => QueueError::protocol(
                DetailCode::ProtocolInvalidJson,
                format!("invalid JSON from peer: {err}"),
            ),
            ProtocolError::LineTooLong => QueueError::protocol(
                DetailCode::ProtocolMalformedMessage,
                "message exceeded the maximum line length",
            ),
            ProtocolError::ConnectionClosed => QueueError::connection(
                DetailCode::DisconnectedBeforeCompletion,
                "connection closed by peer",
                true,
            ),
            ProtocolError::Timeout => QueueError::Timeout(crate::env::timeout_ipc()),
            ProtocolError::Io(err) => QueueError::connection(
                DetailCode::DisconnectedBeforeCompletion,
                format!("socket error: {err}"),
                true,
            ),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
