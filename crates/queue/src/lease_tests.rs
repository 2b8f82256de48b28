// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease store unit tests

use super::*;
use acpx_core::lease::QueueOwnerLease;

fn store() -> (tempfile::TempDir, LeaseStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = LeaseStore::new(dir.path().join("queues"));
    (dir, store)
}

#[test]
fn acquire_records_current_process() {
    let (_dir, store) = store();

    let lease = store.try_acquire("sess01").expect("acquire failed").expect("no lease");

    assert_eq!(lease.pid, std::process::id());
    assert_eq!(lease.session_id, "sess01");
    assert_eq!(lease.socket_path, store.socket_path("sess01"));
    assert!(store.lock_path("sess01").exists());
}

#[test]
fn second_acquire_against_live_owner_fails() {
    let (_dir, store) = store();

    let _lease = store.try_acquire("sess01").expect("acquire failed").expect("no lease");
    // Our own pid is alive, so a second attempt must observe the live lease.
    let second = store.try_acquire("sess01").expect("acquire failed");

    assert!(second.is_none());
}

#[test]
fn orphaned_lease_with_dead_pid_is_reclaimed() {
    let (_dir, store) = store();
    std::fs::create_dir_all(store.lock_path("sess01").parent().unwrap()).unwrap();

    let orphan = QueueOwnerLease {
        session_id: "sess01".to_string(),
        pid: 999_999,
        socket_path: store.socket_path("sess01"),
        acquired_at: 0,
        refreshed_at: 0,
        queue_depth: 0,
    };
    std::fs::write(store.lock_path("sess01"), orphan.to_line().unwrap()).unwrap();

    let lease = store.try_acquire("sess01").expect("acquire failed").expect("should reclaim");
    assert_eq!(lease.pid, std::process::id());
}

#[test]
fn unreadable_lock_file_is_reclaimed() {
    let (_dir, store) = store();
    std::fs::create_dir_all(store.lock_path("sess01").parent().unwrap()).unwrap();
    // Crash between exclusive-create and the lease write leaves an empty file.
    std::fs::write(store.lock_path("sess01"), "").unwrap();

    let lease = store.try_acquire("sess01").expect("acquire failed");
    assert!(lease.is_some());
}

#[test]
fn read_missing_returns_none() {
    let (_dir, store) = store();
    assert!(store.read("nope").expect("read failed").is_none());
}

#[test]
fn refresh_advances_heartbeat_and_depth() {
    let (_dir, store) = store();
    let mut lease = store.try_acquire("sess01").expect("acquire").expect("no lease");
    let before = lease.refreshed_at;

    std::thread::sleep(Duration::from_millis(5));
    store.refresh(&mut lease, 3).expect("refresh failed");

    let on_disk = store.read("sess01").expect("read").expect("missing");
    assert!(on_disk.refreshed_at > before);
    assert_eq!(on_disk.queue_depth, 3);
    // temp file must not linger
    assert!(!store.lock_path("sess01").with_extension("lock.tmp").exists());
}

#[test]
fn release_unlinks_lock_and_socket() {
    let (_dir, store) = store();
    let lease = store.try_acquire("sess01").expect("acquire").expect("no lease");
    std::fs::write(&lease.socket_path, "").unwrap();

    store.release(&lease);

    assert!(!store.lock_path("sess01").exists());
    assert!(!lease.socket_path.exists());
}

#[test]
fn ensure_usable_tracks_lease_lifecycle() {
    let (_dir, store) = store();
    let lease = store.try_acquire("sess01").expect("acquire").expect("no lease");

    assert!(store.ensure_usable("sess01", &lease));

    store.release(&lease);
    assert!(!store.ensure_usable("sess01", &lease));
}

#[test]
fn ensure_usable_rejects_replaced_owner() {
    let (_dir, store) = store();
    let lease = store.try_acquire("sess01").expect("acquire").expect("no lease");

    // Another process took over and rewrote the lock file.
    let mut other = lease.clone();
    other.pid = 999_999;
    std::fs::write(store.lock_path("sess01"), other.to_line().unwrap()).unwrap();

    assert!(!store.ensure_usable("sess01", &lease));
}

#[test]
fn process_probe_distinguishes_live_and_dead() {
    assert!(process_exists(std::process::id()));
    assert!(!process_exists(999_999));
}

#[test]
fn terminate_owner_for_missing_session_is_noop() {
    let (_dir, store) = store();
    assert!(!store.terminate_owner_for("nope").expect("terminate failed"));
}

#[test]
fn terminate_owner_kills_recorded_pid_and_cleans_up() {
    let (_dir, store) = store();
    std::fs::create_dir_all(store.lock_path("sess01").parent().unwrap()).unwrap();

    let mut child = std::process::Command::new("sleep")
        .arg("30")
        .spawn()
        .expect("spawn sleep");
    let pid = child.id();
    // Reap concurrently so the signal-0 probe sees the process disappear
    // instead of lingering as a zombie.
    let reaper = std::thread::spawn(move || {
        let _ = child.wait();
    });

    let lease = QueueOwnerLease {
        session_id: "sess01".to_string(),
        pid,
        socket_path: store.socket_path("sess01"),
        acquired_at: 0,
        refreshed_at: acpx_core::time::now_epoch_ms(),
        queue_depth: 0,
    };
    std::fs::write(store.lock_path("sess01"), lease.to_line().unwrap()).unwrap();

    assert!(store.terminate_owner_for("sess01").expect("terminate failed"));
    assert!(!store.lock_path("sess01").exists());
    assert!(!process_exists(pid));

    reaper.join().expect("reaper thread");
}
