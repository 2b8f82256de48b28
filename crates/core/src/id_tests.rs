// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request-id unit tests

use super::*;

#[test]
fn request_ids_are_unique() {
    let a = new_request_id();
    let b = new_request_id();

    assert_ne!(a, b);
}

#[test]
fn request_ids_are_hyphenated_uuids() {
    let id = new_request_id();

    assert_eq!(id.len(), 36);
    assert_eq!(id.matches('-').count(), 4);
    assert!(id
        .chars()
        .all(|c| c.is_ascii_hexdigit() || c == '-'));
}
