// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `acpx set-mode` / `acpx set-config` — session-control mutations.
//!
//! Both spawn an owner when none is live: the mutation applies to the
//! adapter session, which only the owner can reach.

use anyhow::Result;
use clap::Args;

use acpx_core::{exit, new_request_id};
use acpx_queue::client::{try_set_config_option_on_running_owner, try_set_mode_on_running_owner};
use acpx_queue::spawn::{attach_with_spawn, OwnerSpawnOptions};
use acpx_queue::LeaseStore;

use crate::commands::prompt::queue_error_to_exit;
use crate::output::OutputFormat;
use crate::SessionArgs;

#[derive(Args, Debug)]
pub struct SetModeArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Mode id to switch to (e.g. "code", "plan")
    mode_id: String,

    /// Bound the adapter call to this many milliseconds
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,
}

#[derive(Args, Debug)]
pub struct SetConfigArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Config option id (e.g. "model", "reasoning_effort")
    config_id: String,

    /// New value (parsed as JSON when possible, else taken as a string)
    value: String,

    /// Bound the adapter call to this many milliseconds
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,
}

fn spawn_opts(session_id: String, timeout_ms: Option<u64>) -> OwnerSpawnOptions {
    OwnerSpawnOptions {
        session_id,
        ttl_ms: None,
        permission_mode: "default".to_string(),
        non_interactive_permissions: None,
        auth_policy: None,
        timeout_ms,
        verbose: false,
        suppress_sdk_console_errors: false,
    }
}

pub async fn set_mode(args: SetModeArgs, format: OutputFormat) -> Result<i32> {
    let digest = args.session.session_key()?.digest();
    let store = LeaseStore::from_env()?;
    let request_id = new_request_id();

    let opts = spawn_opts(digest.clone(), args.timeout_ms);
    let result = attach_with_spawn(&opts, || {
        let request_id = request_id.clone();
        try_set_mode_on_running_owner(&store, &digest, request_id, &args.mode_id, args.timeout_ms)
    })
    .await;

    match result {
        Ok(()) => {
            match format {
                OutputFormat::Text => eprintln!("mode set to {}", args.mode_id),
                OutputFormat::Ndjson => println!(
                    "{}",
                    serde_json::json!({"event": "set_mode_result", "modeId": args.mode_id})
                ),
                OutputFormat::Quiet => {}
            }
            Ok(exit::EXIT_OK)
        }
        Err(e) => Err(queue_error_to_exit(e, false)),
    }
}

pub async fn set_config(args: SetConfigArgs, format: OutputFormat) -> Result<i32> {
    let digest = args.session.session_key()?.digest();
    let store = LeaseStore::from_env()?;
    let request_id = new_request_id();

    let value: serde_json::Value = serde_json::from_str(&args.value)
        .unwrap_or_else(|_| serde_json::Value::String(args.value.clone()));

    let opts = spawn_opts(digest.clone(), args.timeout_ms);
    let result = attach_with_spawn(&opts, || {
        let request_id = request_id.clone();
        let value = value.clone();
        try_set_config_option_on_running_owner(
            &store,
            &digest,
            request_id,
            &args.config_id,
            value,
            args.timeout_ms,
        )
    })
    .await;

    match result {
        Ok(response) => {
            match format {
                OutputFormat::Text => eprintln!("config {} updated", args.config_id),
                OutputFormat::Ndjson => println!(
                    "{}",
                    serde_json::json!({
                        "event": "set_config_option_result",
                        "configId": args.config_id,
                        "response": response,
                    })
                ),
                OutputFormat::Quiet => {}
            }
            Ok(exit::EXIT_OK)
        }
        Err(e) => Err(queue_error_to_exit(e, false)),
    }
}
