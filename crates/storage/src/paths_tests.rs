// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gyoshu_core::{ReportTitle, RunId, SessionId};
use tempfile::TempDir;

fn title() -> ReportTitle {
    ReportTitle::new("wine").unwrap()
}

#[test]
fn short_hash_is_12_hex() {
    let h = short_hash("session-abc");
    assert_eq!(h.len(), 12);
    assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn short_hash_is_stable_and_distinct() {
    assert_eq!(short_hash("a"), short_hash("a"));
    assert_ne!(short_hash("a"), short_hash("b"));
}

#[test]
fn durable_layout_matches_contract() {
    let p = ProjectPaths::new("/project");
    let t = title();
    let run = RunId::new("run-001").unwrap();

    assert_eq!(
        p.loop_state_path(&t),
        PathBuf::from("/project/reports/wine/auto/loop-state.json")
    );
    assert_eq!(p.queue_path(&t, &run), PathBuf::from("/project/reports/wine/queue/run-001.json"));
    assert_eq!(
        p.candidate_path(&t, 3, "2"),
        PathBuf::from("/project/reports/wine/staging/cycle-03/worker-2/candidate.json")
    );
    assert_eq!(
        p.verification_path(&t, 3, "2"),
        PathBuf::from("/project/reports/wine/staging/cycle-03/worker-2/baksa.json")
    );
    assert_eq!(p.report_file(&t), PathBuf::from("/project/reports/wine/README.md"));
}

#[test]
fn runtime_layout_matches_contract() {
    let tmp = TempDir::new().unwrap();
    let runtime = RuntimeRoot::at(tmp.path().to_path_buf()).unwrap();
    let session = SessionId::new("sess-1");

    let lock = runtime.lock_path(LockCategory::Queue, "wine/run-001");
    assert!(lock.starts_with(tmp.path().join("locks/queue")));
    assert!(lock.to_string_lossy().ends_with(".lock"));

    let meta = runtime.bridge_meta_path(&session);
    assert_eq!(meta.file_name().unwrap(), "bridge_meta.json");
    assert_eq!(meta.parent().unwrap().file_name().unwrap().len(), 12);

    assert_eq!(runtime.socket_path(&session).file_name().unwrap(), "bridge.sock");
}

#[test]
fn runtime_root_is_user_only() {
    use std::os::unix::fs::PermissionsExt;
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("runtime");
    RuntimeRoot::at(root.clone()).unwrap();

    let mode = std::fs::metadata(&root).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o700);
}

#[test]
#[serial_test::serial]
fn env_override_wins() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("override");
    std::env::set_var("GYOSHU_RUNTIME_DIR", &dir);
    let resolved = RuntimeRoot::resolve().unwrap();
    std::env::remove_var("GYOSHU_RUNTIME_DIR");

    assert_eq!(resolved.path(), dir);
}

#[test]
fn lock_keys_differ_per_category() {
    let tmp = TempDir::new().unwrap();
    let runtime = RuntimeRoot::at(tmp.path().to_path_buf()).unwrap();
    let q = runtime.lock_path(LockCategory::Queue, "k");
    let n = runtime.lock_path(LockCategory::Notebook, "k");
    let r = runtime.lock_path(LockCategory::Report, "k");
    assert_ne!(q, n);
    assert_ne!(n, r);
}
