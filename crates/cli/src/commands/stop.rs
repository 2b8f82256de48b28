// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `acpx stop` — terminate a session's queue owner.

use anyhow::Result;
use clap::Args;

use acpx_core::exit;
use acpx_queue::LeaseStore;

use crate::output::OutputFormat;
use crate::SessionArgs;

#[derive(Args, Debug)]
pub struct StopArgs {
    #[command(flatten)]
    session: SessionArgs,
}

pub async fn run(args: StopArgs, format: OutputFormat) -> Result<i32> {
    let digest = args.session.session_key()?.digest();
    let store = LeaseStore::from_env()?;

    // TERM/KILL with file cleanup is blocking (signal-0 polling); keep it
    // off the async runtime.
    let stopped =
        tokio::task::spawn_blocking(move || store.terminate_owner_for(&digest)).await??;

    match format {
        OutputFormat::Text => {
            if stopped {
                eprintln!("queue owner stopped");
            } else {
                eprintln!("no running queue owner");
            }
        }
        OutputFormat::Ndjson => {
            println!("{}", serde_json::json!({"event": "stopped", "wasRunning": stopped}));
        }
        OutputFormat::Quiet => {}
    }

    Ok(exit::EXIT_OK)
}
