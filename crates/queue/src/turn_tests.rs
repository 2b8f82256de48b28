// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Turn controller unit tests

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fake adapter handle recording control calls.
#[derive(Default)]
struct FakeControl {
    cancels: AtomicUsize,
    mode_calls: parking_lot::Mutex<Vec<String>>,
    config_calls: parking_lot::Mutex<Vec<(String, serde_json::Value)>>,
    hang_on_mode: bool,
}

impl FakeControl {
    fn hanging() -> Self {
        Self {
            hang_on_mode: true,
            ..Default::default()
        }
    }

    fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionControl for FakeControl {
    async fn cancel(&self) -> Result<(), QueueError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_mode(&self, mode_id: &str) -> Result<(), QueueError> {
        if self.hang_on_mode {
            std::future::pending::<()>().await;
        }
        self.mode_calls.lock().push(mode_id.to_string());
        Ok(())
    }

    async fn set_config_option(
        &self,
        config_id: &str,
        value: serde_json::Value,
    ) -> Result<serde_json::Value, QueueError> {
        self.config_calls.lock().push((config_id.to_string(), value.clone()));
        Ok(serde_json::json!({"configId": config_id, "value": value}))
    }
}

fn controller_with_fallback() -> (TurnController, Arc<FakeControl>) {
    let fallback = Arc::new(FakeControl::default());
    (TurnController::new(fallback.clone()), fallback)
}

#[test]
fn begins_idle() {
    let (controller, _) = controller_with_fallback();
    assert_eq!(controller.state(), TurnState::Idle);
    assert!(!controller.has_active_prompt());
}

#[tokio::test]
async fn turn_walks_idle_starting_active_idle() {
    let (controller, _) = controller_with_fallback();

    controller.begin_turn();
    assert_eq!(controller.state(), TurnState::Starting);

    controller.mark_prompt_active().await;
    assert_eq!(controller.state(), TurnState::Active);

    controller.end_turn();
    assert_eq!(controller.state(), TurnState::Idle);
}

#[tokio::test]
async fn cancel_with_active_controller_reaches_adapter() {
    let (controller, _) = controller_with_fallback();
    let active = Arc::new(FakeControl::default());

    controller.begin_turn();
    controller.set_active_controller(active.clone()).await;
    controller.mark_prompt_active().await;

    assert!(controller.request_cancel("req-c").await);
    assert_eq!(active.cancel_count(), 1);
}

#[tokio::test]
async fn cancel_during_starting_is_deferred_until_controller_installed() {
    let (controller, _) = controller_with_fallback();
    let active = Arc::new(FakeControl::default());

    controller.begin_turn();
    // The user hit cancel before the adapter acknowledged the prompt.
    assert!(controller.request_cancel("req-c").await);
    assert_eq!(active.cancel_count(), 0);

    controller.set_active_controller(active.clone()).await;
    assert_eq!(active.cancel_count(), 1);
}

#[tokio::test]
async fn cancel_recorded_while_idle_applies_to_next_turn() {
    let (controller, _) = controller_with_fallback();
    let active = Arc::new(FakeControl::default());

    assert!(controller.request_cancel("req-early").await);

    controller.begin_turn();
    controller.set_active_controller(active.clone()).await;

    assert_eq!(active.cancel_count(), 1);
}

#[tokio::test]
async fn idle_cancel_after_a_cancelled_turn_is_recorded_again() {
    let (controller, _) = controller_with_fallback();
    let first = Arc::new(FakeControl::default());
    let second = Arc::new(FakeControl::default());

    // Turn 1 consumes its cancel budget.
    controller.begin_turn();
    controller.set_active_controller(first.clone()).await;
    controller.mark_prompt_active().await;
    assert!(controller.request_cancel("req-1").await);
    assert_eq!(first.cancel_count(), 1);
    controller.end_turn();

    // A standalone cancel in the idle gap must be accepted and recorded,
    // not dropped against the finished turn's spent budget.
    assert!(controller.request_cancel("req-2").await);

    controller.begin_turn();
    controller.set_active_controller(second.clone()).await;

    assert_eq!(second.cancel_count(), 1);
    assert_eq!(first.cancel_count(), 1);
}

#[tokio::test]
async fn pending_cancel_discarded_when_turn_ends_first() {
    let (controller, _) = controller_with_fallback();
    let active = Arc::new(FakeControl::default());

    controller.begin_turn();
    assert!(controller.request_cancel("req-c").await);
    controller.end_turn();

    // Next turn must not inherit the stale cancel.
    controller.begin_turn();
    controller.set_active_controller(active.clone()).await;
    assert_eq!(active.cancel_count(), 0);
}

#[tokio::test]
async fn repeated_cancels_deliver_at_most_one_adapter_cancel() {
    let (controller, _) = controller_with_fallback();
    let active = Arc::new(FakeControl::default());

    controller.begin_turn();
    controller.set_active_controller(active.clone()).await;
    controller.mark_prompt_active().await;

    assert!(controller.request_cancel("req-1").await);
    assert!(controller.request_cancel("req-2").await);
    assert!(controller.request_cancel("req-3").await);

    assert_eq!(active.cancel_count(), 1);
}

#[tokio::test]
async fn deferred_then_direct_cancel_is_still_single_delivery() {
    let (controller, _) = controller_with_fallback();
    let active = Arc::new(FakeControl::default());

    controller.begin_turn();
    assert!(controller.request_cancel("req-1").await); // deferred
    controller.set_active_controller(active.clone()).await; // delivered here
    assert!(controller.request_cancel("req-2").await); // reports success only

    assert_eq!(active.cancel_count(), 1);
}

#[tokio::test]
async fn apply_pending_cancel_reports_delivery() {
    let (controller, _) = controller_with_fallback();
    let active = Arc::new(FakeControl::default());

    controller.begin_turn();

    // Nothing pending, nothing to do.
    assert!(!controller.apply_pending_cancel().await);

    assert!(controller.request_cancel("req-c").await);
    // Still no controller: recorded, not deliverable.
    assert!(!controller.apply_pending_cancel().await);

    {
        // Install without triggering delivery so the on-demand path is the
        // one that fires.
        let mut inner = controller.inner.lock();
        inner.active = Some(active.clone());
    }
    assert!(controller.apply_pending_cancel().await);
    assert!(!controller.apply_pending_cancel().await);
    assert_eq!(active.cancel_count(), 1);
}

#[tokio::test]
async fn closing_rejects_cancel() {
    let (controller, _) = controller_with_fallback();

    controller.begin_closing();

    assert!(!controller.request_cancel("req-c").await);
    assert_eq!(controller.state(), TurnState::Closing);
}

#[tokio::test]
async fn closing_rejects_mode_and_config_calls() {
    let (controller, fallback) = controller_with_fallback();

    controller.begin_closing();

    let err = controller.set_session_mode("plan", None).await.unwrap_err();
    assert!(err.to_string().contains("closing"), "got: {err}");

    let err = controller
        .set_session_config_option("effort", serde_json::json!("high"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::OwnerClosing));
    assert!(fallback.mode_calls.lock().is_empty());
}

#[tokio::test]
async fn mode_routes_through_active_controller_when_installed() {
    let (controller, fallback) = controller_with_fallback();
    let active = Arc::new(FakeControl::default());

    controller.begin_turn();
    controller.set_active_controller(active.clone()).await;

    controller.set_session_mode("plan", None).await.expect("set_mode failed");

    assert_eq!(active.mode_calls.lock().as_slice(), ["plan"]);
    assert!(fallback.mode_calls.lock().is_empty());
}

#[tokio::test]
async fn mode_falls_back_to_default_session_between_turns() {
    let (controller, fallback) = controller_with_fallback();

    controller.set_session_mode("code", None).await.expect("set_mode failed");

    assert_eq!(fallback.mode_calls.lock().as_slice(), ["code"]);
}

#[tokio::test]
async fn config_option_returns_adapter_response() {
    let (controller, fallback) = controller_with_fallback();

    let response = controller
        .set_session_config_option("effort", serde_json::json!("high"), None)
        .await
        .expect("set_config failed");

    assert_eq!(response["configId"], "effort");
    assert_eq!(fallback.config_calls.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn control_calls_are_bounded_by_timeout() {
    let fallback = Arc::new(FakeControl::hanging());
    let controller = TurnController::new(fallback);

    let err = controller
        .set_session_mode("plan", Some(100))
        .await
        .unwrap_err();

    assert!(matches!(err, QueueError::Timeout(d) if d == Duration::from_millis(100)));
}

#[tokio::test]
async fn end_turn_clears_active_controller() {
    let (controller, fallback) = controller_with_fallback();
    let active = Arc::new(FakeControl::default());

    controller.begin_turn();
    controller.set_active_controller(active.clone()).await;
    controller.end_turn();

    // Control now targets the fallback again.
    controller.set_session_mode("code", None).await.expect("set_mode failed");
    assert!(active.mode_calls.lock().is_empty());
    assert_eq!(fallback.mode_calls.lock().as_slice(), ["code"]);
}
