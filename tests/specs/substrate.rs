// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-substrate specs: containment, crash atomicity, lock ordering,
//! and session identity verification.

use super::prelude::*;
use gyoshu_core::SessionId;
use gyoshu_storage::{
    fs as safe_fs, BridgeMeta, BridgeRegistry, LockCategory, LockManager, StorageError,
    DEFAULT_LOCK_TIMEOUT,
};
use std::path::{Path, PathBuf};

/// Every write the core performs lands inside its declared root, under
/// attempted traversal, absolute paths, and a symlinked parent.
#[test]
fn path_containment_holds_under_attack() {
    let sandbox = Sandbox::new();
    let root = sandbox.project.root().to_path_buf();
    std::fs::create_dir_all(&root).unwrap();

    for hostile in ["../outside.json", "/etc/gyoshu.json", "a/../../outside.json"] {
        let err = safe_fs::validate_rel_path(&root, Path::new(hostile)).unwrap_err();
        assert!(matches!(err, StorageError::PathSafety(_)), "{hostile}: {err:?}");
    }

    // Symlink in a parent component: creation refuses to traverse it.
    let outside = sandbox.tmp.path().join("outside");
    std::fs::create_dir_all(&outside).unwrap();
    let link = root.join("reports");
    std::os::unix::fs::symlink(&outside, &link).unwrap();
    let err =
        safe_fs::atomic_write_json(&link.join("doc.json"), &serde_json::json!({})).unwrap_err();
    assert!(matches!(err, StorageError::PathSafety(_)), "got {err:?}");
    assert!(std::fs::read_dir(&outside).unwrap().next().is_none(), "nothing escaped");
}

/// Crash atomicity: a leftover temp file (the kill-before-rename shape)
/// never corrupts the target, and the writer ignores it.
#[test]
fn interrupted_write_leaves_previous_content() {
    let sandbox = Sandbox::new();
    let target = sandbox.project.root().join("state.json");
    safe_fs::atomic_write_json(&target, &serde_json::json!({"generation": 1})).unwrap();

    // Simulated crash: a torn temp file next to the target.
    std::fs::write(
        target.parent().unwrap().join(".state.json.crashed1.tmp"),
        b"{\"generation\": 2, \"torn\":",
    )
    .unwrap();

    let doc: serde_json::Value = safe_fs::read_json(&target).unwrap();
    assert_eq!(doc["generation"], 1);

    // The next writer replaces the content wholesale.
    safe_fs::atomic_write_json(&target, &serde_json::json!({"generation": 3})).unwrap();
    let doc: serde_json::Value = safe_fs::read_json(&target).unwrap();
    assert_eq!(doc["generation"], 3);
}

/// Lock acquisitions respect the global QUEUE < NOTEBOOK < REPORT order.
#[test]
fn lock_order_is_enforced() {
    let sandbox = Sandbox::new();
    let mgr = LockManager::new(sandbox.runtime.clone()).with_order_enforcement(true);

    // Ascending is fine.
    {
        let _q = mgr.acquire(LockCategory::Queue, "wine/run-001", DEFAULT_LOCK_TIMEOUT).unwrap();
        let _n = mgr.acquire(LockCategory::Notebook, "sess-1", DEFAULT_LOCK_TIMEOUT).unwrap();
        let _r = mgr.acquire(LockCategory::Report, "wine", DEFAULT_LOCK_TIMEOUT).unwrap();
    }

    // Holding REPORT while requesting QUEUE is refused outright.
    let _r = mgr.acquire(LockCategory::Report, "wine", DEFAULT_LOCK_TIMEOUT).unwrap();
    let err = mgr.acquire(LockCategory::Queue, "wine/run-001", DEFAULT_LOCK_TIMEOUT).unwrap_err();
    assert!(matches!(err, StorageError::LockOrder { .. }), "got {err:?}");
}

/// Identity verification: a recorded start time that disagrees with the
/// live process means reap-only, never a signal.
#[test]
fn identity_mismatch_reaps_without_signal() {
    let sandbox = Sandbox::new();
    let registry = BridgeRegistry::new(sandbox.runtime.clone(), sandbox.locks.clone());
    let session = SessionId::new("sess-spec");

    let meta = BridgeMeta {
        session_id: session.clone(),
        pid: std::process::id() as i32,
        // Bogus start time: the pid is alive but it is "someone else".
        process_start_time: Some(1),
        socket_path: PathBuf::from("/tmp/nonexistent/bridge.sock"),
        bridge_started: Some("2026-08-01T09:00:00Z".into()),
        started_at: None,
        notebook_path: PathBuf::from("/project/notebook.ipynb"),
        report_title: "wine".into(),
        python_env: None,
        verification: None,
        extra: serde_json::Map::new(),
    };
    registry.save(&meta).unwrap();

    let err = registry.terminate(&session).unwrap_err();
    assert!(matches!(err, StorageError::IdentityMismatch { .. }), "got {err:?}");
    // We are still running (no SIGTERM arrived), and the meta is gone.
    assert!(registry.load(&session).unwrap().is_none());
}

/// Durable JSON is pretty-printed, 2-space indented UTF-8.
#[test]
fn on_disk_format_is_stable() {
    let sandbox = Sandbox::new();
    let target = sandbox.project.root().join("pretty.json");
    safe_fs::atomic_write_json(&target, &serde_json::json!({"a": {"b": [1, 2]}})).unwrap();

    let text = std::fs::read_to_string(&target).unwrap();
    assert!(text.starts_with("{\n  \"a\""));
    assert!(text.ends_with("\n"));
}
