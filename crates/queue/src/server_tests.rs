// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue server tests over a real Unix socket.

use super::*;
use crate::test_support::null_control;
use crate::turn::TurnController;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::mpsc;

struct Harness {
    _dir: tempfile::TempDir,
    socket_path: std::path::PathBuf,
    controller: Arc<TurnController>,
    server: QueueServer,
    tasks_rx: mpsc::Receiver<QueueTask>,
}

fn start_server() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let socket_path = dir.path().join("owner.sock");
    let listener = UnixListener::bind(&socket_path).expect("bind failed");

    let controller = Arc::new(TurnController::new(null_control()));
    let (server, tasks_rx) = QueueServer::spawn(listener, Arc::clone(&controller), QueueDepth::default());

    Harness {
        _dir: dir,
        socket_path,
        controller,
        server,
        tasks_rx,
    }
}

async fn connect(harness: &Harness) -> (BufReader<tokio::net::unix::OwnedReadHalf>, tokio::net::unix::OwnedWriteHalf) {
    let stream = UnixStream::connect(&harness.socket_path).await.expect("connect failed");
    let (read, write) = stream.into_split();
    (BufReader::new(read), write)
}

async fn read_json(reader: &mut BufReader<tokio::net::unix::OwnedReadHalf>) -> serde_json::Value {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await.expect("read failed");
    assert!(n > 0, "connection closed while expecting a response");
    serde_json::from_str(line.trim()).expect("response was not JSON")
}

fn submit_line(request_id: &str, wait: bool) -> String {
    serde_json::json!({
        "type": "submit_prompt",
        "requestId": request_id,
        "message": "hi",
        "permissionMode": "default",
        "waitForCompletion": wait,
    })
    .to_string()
        + "\n"
}

#[tokio::test]
async fn submit_is_acked_and_enqueued() {
    let mut harness = start_server();
    let (mut reader, mut writer) = connect(&harness).await;

    writer.write_all(submit_line("req-1", true).as_bytes()).await.unwrap();

    let ack = read_json(&mut reader).await;
    assert_eq!(ack["type"], "accepted");
    assert_eq!(ack["requestId"], "req-1");

    let task = harness.tasks_rx.recv().await.expect("no task enqueued");
    assert_eq!(task.request_id, "req-1");
    assert_eq!(task.payload.message, "hi");
    assert!(task.wait_for_completion);
    assert_eq!(harness.server.queue_depth(), 1);
}

#[tokio::test]
async fn runtime_stream_arrives_after_ack_in_order() {
    let mut harness = start_server();
    let (mut reader, mut writer) = connect(&harness).await;

    writer.write_all(submit_line("req-1", true).as_bytes()).await.unwrap();
    let task = harness.tasks_rx.recv().await.expect("no task");

    // Simulate the runtime streaming a turn through the task's sink.
    task.sink
        .send(ResponseBody::SessionUpdate {
            notification: serde_json::json!({"sessionUpdate": "agent_message_chunk"}),
        })
        .await;
    task.sink
        .send(ResponseBody::Done {
            stop_reason: "end_turn".to_string(),
        })
        .await;
    task.sink
        .send(ResponseBody::Result {
            result: crate::protocol::PromptResult {
                stop_reason: "end_turn".to_string(),
                duration_ms: 10,
                update_count: 1,
            },
        })
        .await;

    let kinds: Vec<String> = [
        read_json(&mut reader).await,
        read_json(&mut reader).await,
        read_json(&mut reader).await,
        read_json(&mut reader).await,
    ]
    .iter()
    .map(|v| v["type"].as_str().unwrap().to_string())
    .collect();

    assert_eq!(kinds, ["accepted", "session_update", "done", "result"]);
}

#[tokio::test]
async fn invalid_json_yields_terminal_error_and_close() {
    let harness = start_server();
    let (mut reader, mut writer) = connect(&harness).await;

    writer.write_all(b"{definitely not json\n").await.unwrap();

    let err = read_json(&mut reader).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["detailCode"], "QUEUE_PROTOCOL_INVALID_JSON");

    let mut rest = String::new();
    let n = reader.read_line(&mut rest).await.expect("read failed");
    assert_eq!(n, 0, "server should close after a protocol violation");
}

#[tokio::test]
async fn malformed_message_echoes_request_id() {
    let harness = start_server();
    let (mut reader, mut writer) = connect(&harness).await;

    writer
        .write_all(b"{\"type\":\"bogus_kind\",\"requestId\":\"req-9\"}\n")
        .await
        .unwrap();

    let err = read_json(&mut reader).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["detailCode"], "QUEUE_PROTOCOL_MALFORMED_MESSAGE");
    assert_eq!(err["requestId"], "req-9");
}

#[tokio::test]
async fn cancel_is_accepted_then_terminal() {
    let harness = start_server();
    let (mut reader, mut writer) = connect(&harness).await;

    writer
        .write_all(b"{\"type\":\"cancel_prompt\",\"requestId\":\"req-c\"}\n")
        .await
        .unwrap();

    let ack = read_json(&mut reader).await;
    assert_eq!(ack["type"], "accepted");

    let terminal = read_json(&mut reader).await;
    assert_eq!(terminal["type"], "cancel_result");
    assert_eq!(terminal["cancelled"], true);
    assert_eq!(terminal["requestId"], "req-c");
}

#[tokio::test]
async fn set_mode_roundtrip() {
    let harness = start_server();
    let (mut reader, mut writer) = connect(&harness).await;

    writer
        .write_all(b"{\"type\":\"set_mode\",\"requestId\":\"req-m\",\"modeId\":\"plan\"}\n")
        .await
        .unwrap();

    let ack = read_json(&mut reader).await;
    assert_eq!(ack["type"], "accepted");

    let terminal = read_json(&mut reader).await;
    assert_eq!(terminal["type"], "set_mode_result");
}

#[tokio::test]
async fn set_config_option_returns_adapter_response() {
    let harness = start_server();
    let (mut reader, mut writer) = connect(&harness).await;

    writer
        .write_all(
            b"{\"type\":\"set_config_option\",\"requestId\":\"req-o\",\"configId\":\"effort\",\"value\":\"high\"}\n",
        )
        .await
        .unwrap();

    let ack = read_json(&mut reader).await;
    assert_eq!(ack["type"], "accepted");

    let terminal = read_json(&mut reader).await;
    assert_eq!(terminal["type"], "set_config_option_result");
    assert_eq!(terminal["response"]["configId"], "effort");
}

#[tokio::test]
async fn closing_owner_rejects_prompt_as_transient() {
    let harness = start_server();
    harness.controller.begin_closing();
    let (mut reader, mut writer) = connect(&harness).await;

    writer.write_all(submit_line("req-1", true).as_bytes()).await.unwrap();

    let err = read_json(&mut reader).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["detailCode"], "QUEUE_NOT_ACCEPTING_REQUESTS");
    assert_eq!(err["retryable"], true);
}

#[tokio::test]
async fn closing_owner_rejects_set_mode_with_closing_error() {
    let harness = start_server();
    harness.controller.begin_closing();
    let (mut reader, mut writer) = connect(&harness).await;

    writer
        .write_all(b"{\"type\":\"set_mode\",\"requestId\":\"req-m\",\"modeId\":\"plan\"}\n")
        .await
        .unwrap();

    let ack = read_json(&mut reader).await;
    assert_eq!(ack["type"], "accepted");

    let err = read_json(&mut reader).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["detailCode"], "QUEUE_OWNER_CLOSING");
    assert!(err["message"].as_str().unwrap().contains("closing"));
}

#[tokio::test]
async fn cancel_while_closing_reports_not_cancelled() {
    let harness = start_server();
    harness.controller.begin_closing();
    let (mut reader, mut writer) = connect(&harness).await;

    writer
        .write_all(b"{\"type\":\"cancel_prompt\",\"requestId\":\"req-c\"}\n")
        .await
        .unwrap();

    let _ack = read_json(&mut reader).await;
    let terminal = read_json(&mut reader).await;
    assert_eq!(terminal["type"], "cancel_result");
    assert_eq!(terminal["cancelled"], false);
}

#[tokio::test]
async fn shutdown_stops_accepting() {
    let harness = start_server();
    harness.server.shutdown();
    // Give the abort a beat to land.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let result = UnixStream::connect(&harness.socket_path).await;
    match result {
        Ok(stream) => {
            // The listener task is gone; an accepted-but-orphaned connection
            // must at least never answer.
            let (read, mut write) = stream.into_split();
            write.write_all(submit_line("req-1", true).as_bytes()).await.ok();
            let mut reader = BufReader::new(read);
            let mut line = String::new();
            let read_result = tokio::time::timeout(
                std::time::Duration::from_millis(200),
                reader.read_line(&mut line),
            )
            .await;
            match read_result {
                Ok(Ok(0)) | Err(_) => {} // closed or silent: both acceptable
                Ok(Ok(_)) => panic!("aborted server answered a request"),
                Ok(Err(_)) => {}
            }
        }
        Err(_) => {} // socket already torn down
    }
}
