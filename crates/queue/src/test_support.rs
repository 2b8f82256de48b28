// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fakes for queue crate tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::client::UpdateSink;
use crate::error::QueueError;
use crate::protocol::ErrorBody;
use crate::turn::SessionControl;

/// SessionControl that accepts everything and counts cancels.
#[derive(Default)]
pub(crate) struct NullControl {
    pub cancels: AtomicUsize,
}

impl NullControl {
    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionControl for NullControl {
    async fn cancel(&self) -> Result<(), QueueError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_mode(&self, _mode_id: &str) -> Result<(), QueueError> {
        Ok(())
    }

    async fn set_config_option(
        &self,
        config_id: &str,
        value: serde_json::Value,
    ) -> Result<serde_json::Value, QueueError> {
        Ok(serde_json::json!({"configId": config_id, "value": value}))
    }
}

pub(crate) fn null_control() -> Arc<NullControl> {
    Arc::new(NullControl::default())
}

/// Recorded client-side stream event.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SinkEvent {
    Update(serde_json::Value),
    ClientOp(serde_json::Value),
    Done(String),
    Error(String),
}

/// UpdateSink that records everything it sees.
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: parking_lot::Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }
}

impl UpdateSink for RecordingSink {
    fn on_session_update(&self, notification: &serde_json::Value) {
        self.events.lock().push(SinkEvent::Update(notification.clone()));
    }

    fn on_client_operation(&self, operation: &serde_json::Value) {
        self.events.lock().push(SinkEvent::ClientOp(operation.clone()));
    }

    fn on_done(&self, stop_reason: &str) {
        self.events.lock().push(SinkEvent::Done(stop_reason.to_string()));
    }

    fn on_error(&self, error: &ErrorBody) {
        self.events.lock().push(SinkEvent::Error(error.message.clone()));
    }
}
