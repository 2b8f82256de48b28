// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! acpx - headless CLI client for stdio Agent Client Protocol agents

mod commands;
mod exit_error;
mod output;
mod runner;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use acpx_core::exit;
use output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "acpx",
    version,
    about = "Headless client for Agent Client Protocol agents"
)]
struct Cli {
    /// Output format
    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        default_value_t,
        global = true
    )]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Arguments that identify a persistent session.
#[derive(Args, Clone, Debug)]
pub struct SessionArgs {
    /// Agent adapter command (program and arguments, whitespace-separated)
    #[arg(long, default_value = "claude-code-acp")]
    agent: String,

    /// Working directory for the session (defaults to the current dir)
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Session name, for parallel sessions in one directory
    #[arg(long)]
    name: Option<String>,
}

impl SessionArgs {
    pub fn session_key(&self) -> Result<acpx_core::SessionKey> {
        let agent_command: Vec<String> =
            self.agent.split_whitespace().map(String::from).collect();
        if agent_command.is_empty() {
            anyhow::bail!("--agent must name a command");
        }
        let cwd = match &self.cwd {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        Ok(acpx_core::SessionKey::new(
            agent_command,
            cwd,
            self.name.clone(),
        ))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a prompt to the session's queue owner
    Prompt(commands::prompt::PromptArgs),
    /// Cancel the session's in-flight prompt
    Cancel(commands::cancel::CancelArgs),
    /// Switch the session's mode
    SetMode(commands::control::SetModeArgs),
    /// Change one session config option
    SetConfig(commands::control::SetConfigArgs),
    /// Show the session's queue owner status
    Status(commands::status::StatusArgs),
    /// Terminate the session's queue owner
    Stop(commands::stop::StopArgs),
    /// Internal: run as the session's queue owner
    #[command(name = "__queue-owner", hide = true)]
    QueueOwner(commands::owner::OwnerArgs),
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // clap renders help/version through the error path too; those
            // are not usage errors.
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp
                | clap::error::ErrorKind::DisplayVersion => exit::EXIT_OK,
                _ => exit::EXIT_USAGE,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            let code = e
                .downcast_ref::<exit_error::ExitError>()
                .map_or(exit::EXIT_ERROR, |c| c.code);
            let msg = format_error(&e);
            if !msg.is_empty() {
                eprintln!("Error: {}", msg);
            }
            std::process::exit(code);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let format = cli.output;

    match cli.command {
        Commands::Prompt(args) => commands::prompt::run(args, format).await,
        Commands::Cancel(args) => commands::cancel::run(args, format).await,
        Commands::SetMode(args) => commands::control::set_mode(args, format).await,
        Commands::SetConfig(args) => commands::control::set_config(args, format).await,
        Commands::Status(args) => commands::status::run(args, format).await,
        Commands::Stop(args) => commands::stop::run(args, format).await,
        Commands::QueueOwner(args) => commands::owner::run(args).await,
    }
}

/// Format an anyhow error, deduplicating the chain.
///
/// If the top-level Display already contains the source error text, skip
/// the "Caused by" chain to avoid noisy duplicate output.
fn format_error(err: &anyhow::Error) -> String {
    let top = err.to_string();

    let chain_redundant = err
        .chain()
        .skip(1)
        .all(|cause| top.contains(&cause.to_string()));

    if chain_redundant {
        return top;
    }

    let mut buf = top;
    for (i, cause) in err.chain().skip(1).enumerate() {
        buf.push_str(&format!("\n\nCaused by:\n    {}: {}", i, cause));
    }
    buf
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
