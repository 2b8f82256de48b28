// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Turn controller: serializes prompt turns, merges coincident control.
//!
//! The owner runs one prompt turn at a time, but cancel and mode/config
//! requests arrive on their own connections and must not wait for the turn
//! to finish. This controller is the meeting point: the runtime drives the
//! turn through `begin_turn`/`mark_prompt_active`/`end_turn`, while control
//! connections call `request_cancel`/`set_session_mode`/
//! `set_session_config_option` concurrently.
//!
//! The `Starting` state exists because a user can cancel between submitting
//! a prompt over IPC and the adapter acknowledging it. Such a cancel is
//! *accepted* (the client sees `cancelled: true`) and recorded as pending;
//! it is delivered as soon as an active controller exists, or discarded if
//! the turn ends first.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::env;
use crate::error::QueueError;

/// Adapter-level handle for the session: cancel the in-flight prompt,
/// switch modes, change config options.
///
/// The runtime installs one per turn (the *active controller*) once the
/// adapter has accepted the prompt; a long-lived fallback instance targets
/// the most recent default session for control calls between turns.
#[async_trait]
pub trait SessionControl: Send + Sync {
    async fn cancel(&self) -> Result<(), QueueError>;
    async fn set_mode(&self, mode_id: &str) -> Result<(), QueueError>;
    async fn set_config_option(
        &self,
        config_id: &str,
        value: serde_json::Value,
    ) -> Result<serde_json::Value, QueueError>;
}

/// Turn lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// No prompt in flight.
    Idle,
    /// A prompt was dequeued but the adapter has not acknowledged it yet.
    Starting,
    /// The adapter is working on the prompt.
    Active,
    /// The owner is shutting down; all control is rejected.
    Closing,
}

/// A cancel accepted while no active prompt existed.
#[derive(Debug, Clone)]
struct PendingCancel {
    request_id: String,
    recorded_at: Instant,
}

struct TurnInner {
    state: TurnState,
    pending: Option<PendingCancel>,
    active: Option<Arc<dyn SessionControl>>,
    /// At most one adapter-level cancel is delivered per turn.
    cancel_delivered: bool,
}

/// See module docs. Cheap to clone via `Arc`.
pub struct TurnController {
    inner: Mutex<TurnInner>,
    fallback: Arc<dyn SessionControl>,
}

impl TurnController {
    pub fn new(fallback: Arc<dyn SessionControl>) -> Self {
        Self {
            inner: Mutex::new(TurnInner {
                state: TurnState::Idle,
                pending: None,
                active: None,
                cancel_delivered: false,
            }),
            fallback,
        }
    }

    pub fn state(&self) -> TurnState {
        self.inner.lock().state
    }

    pub fn is_closing(&self) -> bool {
        self.state() == TurnState::Closing
    }

    /// True while an adapter-side prompt can be cancelled directly.
    pub fn has_active_prompt(&self) -> bool {
        self.inner.lock().active.is_some()
    }

    /// Idle → Starting. A pending cancel recorded while idle survives into
    /// the new turn; the per-turn delivery budget resets.
    pub fn begin_turn(&self) {
        let mut inner = self.inner.lock();
        if inner.state == TurnState::Idle {
            inner.state = TurnState::Starting;
            inner.cancel_delivered = false;
        }
    }

    /// Starting/Active → Idle. Clears the active controller and discards
    /// any undelivered pending cancel — it never outlives the turn. The
    /// delivery budget is also re-armed here: a cancel arriving in the
    /// idle gap after this turn must be accepted and recorded, not
    /// swallowed by the finished turn's spent budget.
    pub fn end_turn(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.state, TurnState::Starting | TurnState::Active) {
            inner.state = TurnState::Idle;
        }
        inner.active = None;
        inner.cancel_delivered = false;
        if let Some(pending) = inner.pending.take() {
            debug!(
                request_id = %pending.request_id,
                "discarding pending cancel at turn end"
            );
        }
    }

    /// Any state → Closing. Subsequent cancels and control calls are
    /// rejected.
    pub fn begin_closing(&self) {
        let mut inner = self.inner.lock();
        inner.state = TurnState::Closing;
        inner.active = None;
        inner.pending = None;
    }

    /// The adapter acknowledged the prompt: Starting → Active, then try to
    /// deliver a recorded cancel.
    pub async fn mark_prompt_active(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state == TurnState::Starting {
                inner.state = TurnState::Active;
            }
        }
        self.apply_pending_cancel().await;
    }

    /// Install the adapter-level handle for the in-flight prompt, then try
    /// to deliver a recorded cancel.
    pub async fn set_active_controller(&self, controller: Arc<dyn SessionControl>) {
        {
            let mut inner = self.inner.lock();
            if inner.state == TurnState::Closing {
                return;
            }
            inner.active = Some(controller);
        }
        self.apply_pending_cancel().await;
    }

    pub fn clear_active_controller(&self) {
        self.inner.lock().active = None;
    }

    /// Accept a cancel request. Returns false only while closing.
    ///
    /// With an active prompt the cancel is delivered to the adapter right
    /// here; otherwise it is recorded as pending and delivered by
    /// [`Self::apply_pending_cancel`] when a controller appears. Within one
    /// turn only the first cancel reaches the adapter; later ones still
    /// report success.
    pub async fn request_cancel(&self, request_id: &str) -> bool {
        let deliver_now = {
            let mut inner = self.inner.lock();
            match inner.state {
                TurnState::Closing => return false,
                _ if inner.cancel_delivered => None,
                _ => match inner.active.clone() {
                    Some(controller) => {
                        inner.cancel_delivered = true;
                        Some(controller)
                    }
                    None => {
                        if inner.pending.is_none() {
                            inner.pending = Some(PendingCancel {
                                request_id: request_id.to_string(),
                                recorded_at: Instant::now(),
                            });
                        }
                        None
                    }
                },
            }
        };

        if let Some(controller) = deliver_now {
            if let Err(e) = controller.cancel().await {
                warn!(request_id, error = %e, "adapter cancel failed");
            }
        } else {
            // A controller may have been installed between the lock drop and
            // now; opportunistically deliver.
            self.apply_pending_cancel().await;
        }
        true
    }

    /// Deliver a recorded cancel if an active prompt exists. Returns true
    /// iff the adapter-level cancel was actually invoked.
    pub async fn apply_pending_cancel(&self) -> bool {
        let (controller, pending) = {
            let mut inner = self.inner.lock();
            if inner.state == TurnState::Closing || inner.pending.is_none() {
                return false;
            }
            let Some(controller) = inner.active.clone() else {
                return false;
            };
            let Some(pending) = inner.pending.take() else {
                return false;
            };
            if inner.cancel_delivered {
                // The turn already consumed its one cancel; drop the record.
                return false;
            }
            inner.cancel_delivered = true;
            (controller, pending)
        };

        debug!(
            request_id = %pending.request_id,
            deferred_for_ms = pending.recorded_at.elapsed().as_millis() as u64,
            "delivering deferred cancel"
        );
        if let Err(e) = controller.cancel().await {
            warn!(request_id = %pending.request_id, error = %e, "deferred cancel failed");
        }
        true
    }

    /// Route a mode switch through the active controller when one is
    /// installed, else through the fallback session. Wrapped in a timeout.
    pub async fn set_session_mode(
        &self,
        mode_id: &str,
        timeout_ms: Option<u64>,
    ) -> Result<(), QueueError> {
        let target = self.control_target()?;
        with_timeout(timeout_ms, target.set_mode(mode_id)).await?
    }

    /// Route a config-option change like [`Self::set_session_mode`].
    pub async fn set_session_config_option(
        &self,
        config_id: &str,
        value: serde_json::Value,
        timeout_ms: Option<u64>,
    ) -> Result<serde_json::Value, QueueError> {
        let target = self.control_target()?;
        with_timeout(timeout_ms, target.set_config_option(config_id, value)).await?
    }

    fn control_target(&self) -> Result<Arc<dyn SessionControl>, QueueError> {
        let inner = self.inner.lock();
        if inner.state == TurnState::Closing {
            return Err(QueueError::OwnerClosing);
        }
        Ok(inner
            .active
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.fallback)))
    }
}

async fn with_timeout<T>(
    timeout_ms: Option<u64>,
    fut: impl std::future::Future<Output = T>,
) -> Result<T, QueueError> {
    let limit = timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(env::control_timeout);
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| QueueError::Timeout(limit))
}

#[cfg(test)]
#[path = "turn_tests.rs"]
mod tests;
