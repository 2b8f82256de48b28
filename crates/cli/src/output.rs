// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output formatters for streamed session updates.
//!
//! Text mode renders agent message chunks as plain text and tool calls as
//! one-liners; ndjson mode emits one JSON event per line for machine
//! consumers; quiet mode suppresses everything including errors (the exit
//! code is the interface).

use clap::ValueEnum;
use std::io::Write;

use acpx_queue::protocol::ErrorBody;
use acpx_queue::UpdateSink;

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Ndjson,
    Quiet,
}

/// Formatter implementing the queue client's update callbacks.
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn emit_event(&self, event: serde_json::Value) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{event}");
    }
}

impl UpdateSink for Formatter {
    fn on_session_update(&self, notification: &serde_json::Value) {
        match self.format {
            OutputFormat::Text => {
                if let Some(text) = message_chunk_text(notification) {
                    let mut stdout = std::io::stdout().lock();
                    let _ = write!(stdout, "{text}");
                    let _ = stdout.flush();
                } else if let Some(title) = tool_call_title(notification) {
                    eprintln!("* {title}");
                }
            }
            OutputFormat::Ndjson => self.emit_event(serde_json::json!({
                "event": "session_update",
                "notification": notification,
            })),
            OutputFormat::Quiet => {}
        }
    }

    fn on_client_operation(&self, operation: &serde_json::Value) {
        match self.format {
            OutputFormat::Text => {
                if let (Some(kind), Some(path)) =
                    (operation.get("kind").and_then(|v| v.as_str()), operation.get("path"))
                {
                    eprintln!("* {kind} {}", path.as_str().unwrap_or_default());
                }
            }
            OutputFormat::Ndjson => self.emit_event(serde_json::json!({
                "event": "client_operation",
                "operation": operation,
            })),
            OutputFormat::Quiet => {}
        }
    }

    fn on_done(&self, stop_reason: &str) {
        match self.format {
            OutputFormat::Text => {
                // Message chunks are printed unterminated; close the line.
                println!();
                if stop_reason != "end_turn" {
                    eprintln!("({stop_reason})");
                }
            }
            OutputFormat::Ndjson => self.emit_event(serde_json::json!({
                "event": "done",
                "stopReason": stop_reason,
            })),
            OutputFormat::Quiet => {}
        }
    }

    fn on_error(&self, error: &ErrorBody) {
        match self.format {
            OutputFormat::Text => {
                eprintln!("error: {}", error.message);
            }
            OutputFormat::Ndjson => self.emit_event(serde_json::json!({
                "event": "error",
                "error": error,
            })),
            OutputFormat::Quiet => {}
        }
    }
}

/// Extract the text of an `agent_message_chunk` session update.
pub fn message_chunk_text(notification: &serde_json::Value) -> Option<&str> {
    let update = notification.get("update")?;
    if update.get("sessionUpdate")?.as_str()? != "agent_message_chunk" {
        return None;
    }
    update.get("content")?.get("text")?.as_str()
}

/// Extract a display title for a `tool_call` session update.
pub fn tool_call_title(notification: &serde_json::Value) -> Option<&str> {
    let update = notification.get("update")?;
    if update.get("sessionUpdate")?.as_str()? != "tool_call" {
        return None;
    }
    update.get("title")?.as_str()
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
