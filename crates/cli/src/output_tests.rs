// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output formatter unit tests

use super::*;

fn chunk(text: &str) -> serde_json::Value {
    serde_json::json!({
        "sessionId": "sess_01",
        "update": {
            "sessionUpdate": "agent_message_chunk",
            "content": {"type": "text", "text": text},
        },
    })
}

#[test]
fn extracts_message_chunk_text() {
    assert_eq!(message_chunk_text(&chunk("hello")), Some("hello"));
}

#[test]
fn ignores_non_chunk_updates() {
    let thought = serde_json::json!({
        "sessionId": "sess_01",
        "update": {
            "sessionUpdate": "agent_thought_chunk",
            "content": {"type": "text", "text": "thinking"},
        },
    });
    assert_eq!(message_chunk_text(&thought), None);

    let empty = serde_json::json!({});
    assert_eq!(message_chunk_text(&empty), None);
}

#[test]
fn extracts_tool_call_title() {
    let tool = serde_json::json!({
        "sessionId": "sess_01",
        "update": {
            "sessionUpdate": "tool_call",
            "toolCallId": "tc_1",
            "title": "Read main.rs",
        },
    });
    assert_eq!(tool_call_title(&tool), Some("Read main.rs"));
    assert_eq!(tool_call_title(&chunk("hi")), None);
}
