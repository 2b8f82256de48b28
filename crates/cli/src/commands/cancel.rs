// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `acpx cancel` — cancel the session's in-flight prompt.
//!
//! Never spawns an owner: with no owner there is nothing to cancel.

use anyhow::Result;
use clap::Args;

use acpx_core::{exit, new_request_id};
use acpx_queue::client::try_cancel_on_running_owner;
use acpx_queue::LeaseStore;

use crate::commands::prompt::queue_error_to_exit;
use crate::output::OutputFormat;
use crate::SessionArgs;

#[derive(Args, Debug)]
pub struct CancelArgs {
    #[command(flatten)]
    session: SessionArgs,
}

pub async fn run(args: CancelArgs, format: OutputFormat) -> Result<i32> {
    let digest = args.session.session_key()?.digest();
    let store = LeaseStore::from_env()?;
    let request_id = new_request_id();

    let cancelled = match try_cancel_on_running_owner(&store, &digest, request_id).await {
        Ok(Some(cancelled)) => Some(cancelled),
        Ok(None) => None,
        Err(e) => return Err(queue_error_to_exit(e, false)),
    };

    match format {
        OutputFormat::Text => match cancelled {
            Some(true) => eprintln!("cancelled"),
            Some(false) => eprintln!("nothing to cancel"),
            None => eprintln!("no running queue owner for this session"),
        },
        OutputFormat::Ndjson => println!(
            "{}",
            serde_json::json!({
                "event": "cancel_result",
                "ownerRunning": cancelled.is_some(),
                "cancelled": cancelled.unwrap_or(false),
            })
        ),
        OutputFormat::Quiet => {}
    }

    Ok(exit::EXIT_OK)
}
