// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Owner runtime: the queue owner's main loop.
//!
//! Acquire the lease (or exit quietly — someone else owns the session),
//! bind the socket, start the heartbeat, then pop prompt tasks one at a
//! time and run them through the turn controller. An empty queue for longer
//! than the idle TTL ends the process; so do SIGINT/SIGTERM, which drain
//! queued tasks with errors before the lease is released.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use async_trait::async_trait;

use crate::env;
use crate::error::QueueError;
use crate::lease::{LeaseError, LeaseStore};
use crate::protocol::ErrorOrigin;
use crate::server::{QueueDepth, QueueServer, QueueTask};
use crate::turn::TurnController;

use acpx_core::lease::QueueOwnerLease;

/// Idle TTL applied when the caller passes nothing usable.
pub const DEFAULT_TTL_MS: u64 = 300_000;

/// Normalize a raw `--ttl-ms` argument.
///
/// Missing or negative values fall back to the default; `0` disables the
/// TTL entirely (the owner lives until signaled).
pub fn normalize_ttl(raw: Option<i64>) -> Option<Duration> {
    match raw {
        Some(0) => None,
        Some(ms) if ms > 0 => Some(Duration::from_millis(ms as u64)),
        _ => Some(Duration::from_millis(DEFAULT_TTL_MS)),
    }
}

/// Drives one prompt turn end to end: talk to the adapter, stream updates
/// through the task's sink, and finish the sequence with `done`+`result`
/// or a terminal `error`. The runtime brackets each call with
/// `begin_turn`/`end_turn`.
#[async_trait]
pub trait TurnRunner: Send + Sync {
    async fn run_turn(&self, task: QueueTask, controller: &TurnController);
}

/// Why the owner runtime returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerExit {
    /// Ran and shut down (TTL, signal, or queue closed).
    Completed,
    /// Another live process already owns the session.
    AlreadyOwned,
}

/// Owner startup/shutdown errors.
#[derive(Debug, Error)]
pub enum OwnerError {
    #[error("Lease error: {0}")]
    Lease(#[from] LeaseError),

    #[error("Failed to bind socket at {path}: {source}")]
    BindFailed {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the queue owner for `session_id` until TTL expiry or a signal.
pub async fn run_owner(
    store: LeaseStore,
    session_id: &str,
    ttl: Option<Duration>,
    controller: Arc<TurnController>,
    runner: Arc<dyn TurnRunner>,
) -> Result<OwnerExit, OwnerError> {
    // Lease first: losing here means a live owner exists and we exit 0.
    let Some(lease) = store.try_acquire(session_id)? else {
        info!(session_id, "session already has a live queue owner");
        return Ok(OwnerExit::AlreadyOwned);
    };

    // Bind last among the startup steps; a stale socket file from a crashed
    // owner is ours to remove now that we hold the lease.
    let socket_path = lease.socket_path.clone();
    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
    }
    let listener = match UnixListener::bind(&socket_path) {
        Ok(l) => l,
        Err(e) => {
            store.release(&lease);
            return Err(OwnerError::BindFailed {
                path: socket_path,
                source: e,
            });
        }
    };

    let depth = QueueDepth::default();
    let (server, mut tasks_rx) = QueueServer::spawn(listener, Arc::clone(&controller), depth.clone());

    let lease = Arc::new(Mutex::new(lease));
    let heartbeat = spawn_heartbeat(store.clone(), Arc::clone(&lease), depth.clone());

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(
        session_id,
        socket = %socket_path.display(),
        ttl_ms = ttl.map(|d| d.as_millis() as u64),
        "queue owner ready"
    );

    loop {
        tokio::select! {
            next = next_task(&mut tasks_rx, ttl) => match next {
                Next::Task(task) => {
                    // A signal mid-turn abandons the turn: dropping its
                    // future closes the task's connection, which the client
                    // observes as a disconnect-before-completion.
                    let turn = run_prompt_turn(task, &controller, runner.as_ref(), &depth);
                    tokio::pin!(turn);
                    let finished = tokio::select! {
                        _ = &mut turn => true,
                        _ = sigterm.recv() => false,
                        _ = sigint.recv() => false,
                    };
                    if !finished {
                        info!(session_id, "signal during turn, shutting down");
                        break;
                    }
                    refresh_lease(&store, &lease, &depth);
                }
                Next::IdleExpired => {
                    info!(session_id, "idle TTL expired");
                    break;
                }
                Next::Closed => break,
            },

            _ = sigterm.recv() => {
                info!(session_id, "received SIGTERM, shutting down");
                break;
            }

            _ = sigint.recv() => {
                info!(session_id, "received SIGINT, shutting down");
                break;
            }
        }
    }

    // Shutdown order: reject new control first, then stop the heartbeat and
    // the accept loop, then drain what never ran, then give up the lease.
    controller.begin_closing();
    heartbeat.abort();
    server.shutdown();

    while let Ok(task) = tasks_rx.try_recv() {
        depth.decrement();
        task.sink.error(&QueueError::OwnerClosing, ErrorOrigin::Queue).await;
    }

    store.release(&lease.lock());
    info!(session_id, "queue owner stopped");
    Ok(OwnerExit::Completed)
}

enum Next {
    Task(QueueTask),
    IdleExpired,
    Closed,
}

async fn next_task(rx: &mut mpsc::Receiver<QueueTask>, ttl: Option<Duration>) -> Next {
    match ttl {
        None => match rx.recv().await {
            Some(task) => Next::Task(task),
            None => Next::Closed,
        },
        Some(idle_wait) => match tokio::time::timeout(idle_wait, rx.recv()).await {
            Err(_) => Next::IdleExpired,
            Ok(Some(task)) => Next::Task(task),
            Ok(None) => Next::Closed,
        },
    }
}

async fn run_prompt_turn(
    task: QueueTask,
    controller: &TurnController,
    runner: &dyn TurnRunner,
    depth: &QueueDepth,
) {
    let request_id = task.request_id.clone();
    info!(request_id, "starting prompt turn");

    controller.begin_turn();
    runner.run_turn(task, controller).await;
    controller.end_turn();
    depth.decrement();

    info!(request_id, "prompt turn finished");
}

fn refresh_lease(store: &LeaseStore, lease: &Arc<Mutex<QueueOwnerLease>>, depth: &QueueDepth) {
    let mut lease = lease.lock();
    if let Err(e) = store.refresh(&mut lease, depth.get()) {
        warn!(error = %e, "lease refresh failed");
    }
}

fn spawn_heartbeat(
    store: LeaseStore,
    lease: Arc<Mutex<QueueOwnerLease>>,
    depth: QueueDepth,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(env::heartbeat_interval());
        // First tick fires immediately; skip it, acquisition just wrote.
        interval.tick().await;
        loop {
            interval.tick().await;
            refresh_lease(&store, &lease, &depth);
        }
    })
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
