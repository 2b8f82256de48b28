// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request-id generation.
//!
//! Every queue request carries a caller-chosen id that the owner echoes on
//! each response, so one connection can demultiplex streams and terminals.
//! Ids only need to be unique per client invocation; a v4 UUID keeps them
//! collision-free across concurrent invocations without any coordination.

/// Mint a fresh wire request id.
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
