// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `acpx prompt` — submit a prompt turn, spawning an owner when needed.

use anyhow::Result;
use clap::Args;
use std::io::Read;

use acpx_core::{exit, new_request_id, paths, SessionRecord};
use acpx_queue::client::{try_cancel_on_running_owner, try_submit_to_running_owner};
use acpx_queue::protocol::PromptResult;
use acpx_queue::spawn::{attach_with_spawn, OwnerSpawnOptions};
use acpx_queue::{LeaseStore, QueueError, SubmitOptions, SubmitOutcome};

use crate::exit_error::ExitError;
use crate::output::{Formatter, OutputFormat};
use crate::SessionArgs;

#[derive(Args, Debug)]
pub struct PromptArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Prompt text ("-" reads stdin)
    message: String,

    /// Owner idle TTL in ms (0 keeps the owner alive until stopped)
    #[arg(long = "ttl-ms", allow_hyphen_values = true)]
    ttl_ms: Option<i64>,

    /// Permission mode forwarded to the agent
    #[arg(long = "permission-mode", default_value = "default")]
    permission_mode: String,

    /// Non-interactive permission policy
    #[arg(long = "non-interactive-permissions")]
    non_interactive_permissions: Option<String>,

    /// Abort the turn after this many milliseconds
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Resolve as soon as the owner accepts the prompt
    #[arg(long = "no-wait")]
    no_wait: bool,

    /// Verbose owner logging
    #[arg(long)]
    verbose: bool,

    /// Drop the adapter's stderr instead of logging it
    #[arg(long = "suppress-sdk-console-errors")]
    suppress_sdk_console_errors: bool,
}

pub async fn run(args: PromptArgs, format: OutputFormat) -> Result<i32> {
    let key = args.session.session_key()?;
    let digest = key.digest();

    // Upsert the session record so a freshly spawned owner knows which
    // adapter to start and where.
    let record_path = paths::record_path(&digest)?;
    let mut record =
        SessionRecord::load(&record_path)?.unwrap_or_else(|| SessionRecord::for_key(&key));
    record.agent_command = key.agent_command.clone();
    record.cwd = key.cwd.clone();
    record.name = key.name.clone();
    record.store(&record_path)?;

    let message = read_message(&args.message)?;
    let store = LeaseStore::from_env()?;
    let formatter = Formatter::new(format);
    let request_id = new_request_id();

    let opts = SubmitOptions {
        message,
        permission_mode: args.permission_mode.clone(),
        non_interactive_permissions: args.non_interactive_permissions.clone(),
        timeout_ms: args.timeout_ms,
        suppress_sdk_console_errors: args.suppress_sdk_console_errors,
        wait_for_completion: !args.no_wait,
    };
    let spawn_opts = OwnerSpawnOptions {
        session_id: digest.clone(),
        ttl_ms: args.ttl_ms,
        permission_mode: args.permission_mode.clone(),
        non_interactive_permissions: args.non_interactive_permissions.clone(),
        auth_policy: None,
        timeout_ms: args.timeout_ms,
        verbose: args.verbose,
        suppress_sdk_console_errors: args.suppress_sdk_console_errors,
    };

    let submit = attach_with_spawn(&spawn_opts, || {
        let request_id = request_id.clone();
        try_submit_to_running_owner(&store, &digest, request_id, &opts, &formatter)
    });
    tokio::pin!(submit);

    // SIGINT cancels the in-flight prompt on the owner; the adapter stays
    // up and the stream ends with `done cancelled`.
    let mut interrupted = false;
    let outcome = loop {
        tokio::select! {
            result = &mut submit => break result,
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                let cancel_id = new_request_id();
                match try_cancel_on_running_owner(&store, &digest, cancel_id).await {
                    Ok(Some(true)) => {}
                    _ => {
                        // No owner to cancel on: nothing is running, leave.
                        return Err(ExitError::new(exit::EXIT_INTERRUPTED, "interrupted").into());
                    }
                }
            }
        }
    };

    match outcome {
        Ok(SubmitOutcome::Completed { result }) => {
            emit_result(format, &result);
            Ok(completion_code(&result, interrupted))
        }
        Ok(SubmitOutcome::Queued { request_id }) => {
            match format {
                OutputFormat::Text => eprintln!("queued request {request_id}"),
                OutputFormat::Ndjson => println!(
                    "{}",
                    serde_json::json!({"event": "queued", "requestId": request_id})
                ),
                OutputFormat::Quiet => {}
            }
            Ok(exit::EXIT_OK)
        }
        Err(e) => Err(queue_error_to_exit(e, interrupted)),
    }
}

fn read_message(arg: &str) -> Result<String> {
    if arg != "-" {
        return Ok(arg.to_string());
    }
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn emit_result(format: OutputFormat, result: &PromptResult) {
    if let OutputFormat::Ndjson = format {
        println!(
            "{}",
            serde_json::json!({"event": "result", "result": result})
        );
    }
}

fn completion_code(result: &PromptResult, interrupted: bool) -> i32 {
    match result.stop_reason.as_str() {
        "refusal" => exit::EXIT_PERMISSION_DENIED,
        "cancelled" => exit::EXIT_INTERRUPTED,
        _ if interrupted => exit::EXIT_INTERRUPTED,
        _ => exit::EXIT_OK,
    }
}

pub(crate) fn queue_error_to_exit(e: QueueError, interrupted: bool) -> anyhow::Error {
    match e {
        QueueError::Timeout(d) => {
            ExitError::new(exit::EXIT_TIMEOUT, format!("timed out after {d:?}")).into()
        }
        QueueError::Interrupted => ExitError::new(exit::EXIT_INTERRUPTED, "interrupted").into(),
        e if interrupted => {
            ExitError::new(exit::EXIT_INTERRUPTED, format!("interrupted: {e}")).into()
        }
        e => anyhow::Error::new(e),
    }
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
