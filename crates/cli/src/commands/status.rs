// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `acpx status` — inspect a session's lease without connecting.

use anyhow::Result;
use clap::Args;

use acpx_core::{exit, time::now_epoch_ms};
use acpx_queue::lease::process_exists;
use acpx_queue::LeaseStore;

use crate::output::OutputFormat;
use crate::SessionArgs;

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    session: SessionArgs,
}

pub async fn run(args: StatusArgs, format: OutputFormat) -> Result<i32> {
    let digest = args.session.session_key()?.digest();
    let store = LeaseStore::from_env()?;

    let lease = store.read(&digest)?;
    let alive = lease.as_ref().map(|l| process_exists(l.pid)).unwrap_or(false);

    match format {
        OutputFormat::Text => match &lease {
            Some(lease) => {
                let age_ms = now_epoch_ms().saturating_sub(lease.refreshed_at);
                println!("session:      {digest}");
                println!("owner pid:    {} ({})", lease.pid, if alive { "alive" } else { "dead" });
                println!("socket:       {}", lease.socket_path.display());
                println!("queue depth:  {}", lease.queue_depth);
                println!("heartbeat:    {}ms ago{}", age_ms, if lease.is_suspect() { " (stale)" } else { "" });
            }
            None => println!("session {digest}: no queue owner"),
        },
        OutputFormat::Ndjson => println!(
            "{}",
            serde_json::json!({
                "event": "status",
                "sessionId": digest,
                "owner": lease.as_ref().map(|l| serde_json::json!({
                    "pid": l.pid,
                    "alive": alive,
                    "socketPath": l.socket_path,
                    "queueDepth": l.queue_depth,
                    "refreshedAt": l.refreshed_at,
                })),
            })
        ),
        OutputFormat::Quiet => {}
    }

    Ok(exit::EXIT_OK)
}
