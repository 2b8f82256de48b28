// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue error unit tests

use super::*;

#[test]
fn retryable_classification() {
    assert!(QueueError::not_accepting("owner gone").is_retryable());
    assert!(QueueError::connection(DetailCode::DisconnectedBeforeAck, "eof", true).is_retryable());
    assert!(QueueError::Runtime {
        message: "adapter died".into(),
        retryable: true,
        acp: None,
    }
    .is_retryable());

    assert!(!QueueError::protocol(DetailCode::ProtocolMalformedMessage, "bad").is_retryable());
    assert!(!QueueError::Timeout(Duration::from_secs(5)).is_retryable());
    assert!(!QueueError::Interrupted.is_retryable());
    assert!(!QueueError::OwnerClosing.is_retryable());
}

#[test]
fn wire_roundtrip_preserves_classification() {
    let original = QueueError::Runtime {
        message: "adapter exited with code 1".into(),
        retryable: true,
        acp: Some(serde_json::json!({"code": -32603})),
    };

    let body = original.to_error_body(ErrorOrigin::Runtime);
    assert_eq!(body.detail_code, DetailCode::RuntimePromptFailed);
    assert_eq!(body.origin, ErrorOrigin::Runtime);
    assert!(body.retryable);
    assert!(body.acp.is_some());

    let back = QueueError::from_error_body(body);
    match back {
        QueueError::Runtime { retryable, acp, .. } => {
            assert!(retryable);
            assert!(acp.is_some());
        }
        other => panic!("expected Runtime, got {other:?}"),
    }
}

#[test]
fn owner_closing_maps_to_closing_message() {
    let body = QueueError::OwnerClosing.to_error_body(ErrorOrigin::Queue);

    assert_eq!(body.detail_code, DetailCode::OwnerClosing);
    assert!(body.message.contains("closing"));
    assert!(!body.retryable);

    assert!(matches!(
        QueueError::from_error_body(body),
        QueueError::OwnerClosing
    ));
}

#[test]
fn protocol_error_conversion() {
    let parse_err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
    let converted: QueueError = ProtocolError::Json(parse_err).into();
    assert_eq!(converted.detail_code(), DetailCode::ProtocolInvalidJson);

    let converted: QueueError = ProtocolError::LineTooLong.into();
    assert_eq!(converted.detail_code(), DetailCode::ProtocolMalformedMessage);

    let converted: QueueError = ProtocolError::ConnectionClosed.into();
    assert_eq!(converted.detail_code(), DetailCode::DisconnectedBeforeCompletion);
    assert!(converted.is_retryable());
}
