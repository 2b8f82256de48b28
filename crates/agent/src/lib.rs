// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ACP client facade.
//!
//! A thin, `Send` handle over an `agent-client-protocol` connection to a
//! spawned agent adapter. The protocol connection itself is `!Send`, so it
//! lives on a dedicated worker thread with a current-thread runtime and a
//! `LocalSet`; the rest of the process talks to it through a command
//! channel. The facade exposes only what the queue owner needs: start,
//! load-or-create, prompt, cancel, set-mode, set-config-option, close.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod client;
pub mod error;
pub mod handler;
mod worker;

pub use client::{
    AgentClient, AgentConfig, AgentUpdate, PromptOutcome, PromptTurn, SessionInfo,
};
pub use error::AgentError;
