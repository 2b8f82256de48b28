// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session key unit tests

use super::*;

fn key(cmd: &[&str], cwd: &str, name: Option<&str>) -> SessionKey {
    SessionKey::new(
        cmd.iter().map(|s| s.to_string()).collect(),
        PathBuf::from(cwd),
        name.map(String::from),
    )
}

#[test]
fn digest_is_24_lowercase_hex_chars() {
    let digest = key(&["claude-code-acp"], "/work/project", None).digest();

    assert_eq!(digest.len(), DIGEST_LEN);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[test]
fn digest_is_deterministic() {
    let a = key(&["claude-code-acp", "--verbose"], "/work/project", Some("review"));
    let b = key(&["claude-code-acp", "--verbose"], "/work/project", Some("review"));

    assert_eq!(a.digest(), b.digest());
}

#[test]
fn digest_changes_with_each_component() {
    let base = key(&["agent"], "/work", None);

    assert_ne!(base.digest(), key(&["other-agent"], "/work", None).digest());
    assert_ne!(base.digest(), key(&["agent"], "/elsewhere", None).digest());
    assert_ne!(base.digest(), key(&["agent"], "/work", Some("named")).digest());
}

#[test]
fn digest_distinguishes_argument_boundaries() {
    // "a b" as one argument vs. two arguments must not collide
    let joined = key(&["agent", "a b"], "/work", None);
    let split = key(&["agent", "a", "b"], "/work", None);

    assert_ne!(joined.digest(), split.digest());
}

#[test]
fn empty_name_normalizes_to_none() {
    let named = SessionKey::new(vec!["agent".into()], PathBuf::from("/w"), Some(String::new()));

    assert_eq!(named.name, None);
    assert_eq!(named.digest(), key(&["agent"], "/w", None).digest());
}

#[test]
fn display_includes_command_and_cwd() {
    let k = key(&["agent", "--flag"], "/work", Some("review"));
    let shown = k.to_string();

    assert!(shown.contains("agent --flag"));
    assert!(shown.contains("/work"));
    assert!(shown.contains("review"));
}
