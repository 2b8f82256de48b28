// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt command unit tests (exit-code mapping)

use super::*;
use std::time::Duration;

fn result(stop_reason: &str) -> PromptResult {
    PromptResult {
        stop_reason: stop_reason.to_string(),
        duration_ms: 10,
        update_count: 0,
    }
}

#[test]
fn normal_completion_exits_zero() {
    assert_eq!(completion_code(&result("end_turn"), false), exit::EXIT_OK);
    assert_eq!(completion_code(&result("max_tokens"), false), exit::EXIT_OK);
}

#[test]
fn refusal_maps_to_permission_denied() {
    assert_eq!(
        completion_code(&result("refusal"), false),
        exit::EXIT_PERMISSION_DENIED
    );
}

#[test]
fn cancelled_turn_maps_to_interrupted() {
    assert_eq!(
        completion_code(&result("cancelled"), false),
        exit::EXIT_INTERRUPTED
    );
    assert_eq!(
        completion_code(&result("end_turn"), true),
        exit::EXIT_INTERRUPTED
    );
}

#[test]
fn timeout_error_carries_exit_124() {
    let err = queue_error_to_exit(QueueError::Timeout(Duration::from_secs(5)), false);
    let exit_err = err.downcast_ref::<ExitError>().expect("not an ExitError");
    assert_eq!(exit_err.code, exit::EXIT_TIMEOUT);
}

#[test]
fn retryable_connection_error_stays_generic() {
    let err = queue_error_to_exit(
        acpx_queue::QueueError::not_accepting("owner never came up"),
        false,
    );
    assert!(err.downcast_ref::<ExitError>().is_none());
}

#[test]
fn read_message_passes_plain_text_through() {
    assert_eq!(read_message("hello world").unwrap(), "hello world");
}
