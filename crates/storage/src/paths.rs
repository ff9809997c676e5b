// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path layout for the two storage regions.
//!
//! Durable state lives in the project under `reports/{title}/…`; ephemeral
//! runtime state (locks, bridge metadata, sockets) lives in an OS runtime
//! directory resolved once at startup:
//! `GYOSHU_RUNTIME_DIR` > `$XDG_RUNTIME_DIR/gyoshu` > user cache dir >
//! system temp dir. The chosen directory is created user-only (0o700).

use crate::error::StorageError;
use crate::fs::ensure_dir_no_symlink;
use crate::lock::LockCategory;
use gyoshu_core::{ReportTitle, RunId, SessionId};
use sha2::{Digest, Sha256};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Hash a logical name to the 12-hex short form used for on-disk names.
pub fn short_hash(s: &str) -> String {
    let digest = Sha256::digest(s.as_bytes());
    let mut out = String::with_capacity(12);
    for byte in digest.iter().take(6) {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// The ephemeral runtime region.
#[derive(Debug, Clone)]
pub struct RuntimeRoot {
    root: PathBuf,
}

impl RuntimeRoot {
    /// Resolve and create the runtime directory with user-only permissions.
    pub fn resolve() -> Result<Self, StorageError> {
        let root = runtime_dir_candidate();
        Self::at(root)
    }

    /// Use an explicit directory (tests point this at a tempdir).
    pub fn at(root: PathBuf) -> Result<Self, StorageError> {
        ensure_dir_no_symlink(&root)?;
        fs::set_permissions(&root, fs::Permissions::from_mode(0o700))?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// `<runtime-root>/locks/{queue|notebook|report}/{12hex}.lock`
    pub fn lock_path(&self, category: LockCategory, key: &str) -> PathBuf {
        self.root.join("locks").join(category.dir_name()).join(format!("{}.lock", short_hash(key)))
    }

    /// `<runtime-root>/{12hex-session}/`
    pub fn session_dir(&self, session: &SessionId) -> PathBuf {
        self.root.join(short_hash(session.as_str()))
    }

    pub fn bridge_meta_path(&self, session: &SessionId) -> PathBuf {
        self.session_dir(session).join("bridge_meta.json")
    }

    pub fn socket_path(&self, session: &SessionId) -> PathBuf {
        self.session_dir(session).join("bridge.sock")
    }

    /// List sessions that currently have a metadata file on disk.
    ///
    /// Directory names are hashes, so the metadata file itself is read to
    /// recover the session id; unreadable entries are skipped.
    pub fn list_sessions(&self) -> Vec<SessionId> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut sessions = Vec::new();
        for entry in entries.flatten() {
            let meta_path = entry.path().join("bridge_meta.json");
            if let Ok(Some(value)) =
                crate::fs::read_json_opt::<serde_json::Value>(&meta_path)
            {
                if let Some(id) = value.get("sessionId").and_then(|v| v.as_str()) {
                    sessions.push(SessionId::new(id));
                }
            }
        }
        sessions
    }
}

/// Env override first, then XDG, then user cache, then the system tmpdir.
fn runtime_dir_candidate() -> PathBuf {
    if let Ok(dir) = std::env::var("GYOSHU_RUNTIME_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(xdg).join("gyoshu");
    }
    if let Some(cache) = dirs::cache_dir() {
        return cache.join("gyoshu").join("runtime");
    }
    std::env::temp_dir().join("gyoshu-runtime")
}

/// The durable region of one project.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    root: PathBuf,
}

impl ProjectPaths {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self { root: project_root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    /// `reports/{reportTitle}/`
    pub fn report_dir(&self, title: &ReportTitle) -> PathBuf {
        self.reports_dir().join(title.as_str())
    }

    /// `reports/{reportTitle}/auto/loop-state.json`
    pub fn loop_state_path(&self, title: &ReportTitle) -> PathBuf {
        self.report_dir(title).join("auto").join("loop-state.json")
    }

    /// `reports/{reportTitle}/queue/{runId}.json`
    pub fn queue_path(&self, title: &ReportTitle, run: &RunId) -> PathBuf {
        self.report_dir(title).join("queue").join(format!("{}.json", run.as_str()))
    }

    /// `reports/{reportTitle}/staging/cycle-{NN}/worker-{K}/`
    pub fn staging_dir(&self, title: &ReportTitle, cycle: u32, worker: &str) -> PathBuf {
        self.report_dir(title)
            .join("staging")
            .join(format!("cycle-{:02}", cycle))
            .join(format!("worker-{}", worker))
    }

    pub fn candidate_path(&self, title: &ReportTitle, cycle: u32, worker: &str) -> PathBuf {
        self.staging_dir(title, cycle, worker).join("candidate.json")
    }

    /// The adversarial verification verdict artifact.
    pub fn verification_path(&self, title: &ReportTitle, cycle: u32, worker: &str) -> PathBuf {
        self.staging_dir(title, cycle, worker).join("baksa.json")
    }

    /// `reports/{reportTitle}/README.md`, the report-gate target.
    pub fn report_file(&self, title: &ReportTitle) -> PathBuf {
        self.report_dir(title).join("README.md")
    }

    /// The QUEUE lock key for one queue document.
    pub fn queue_lock_key(title: &ReportTitle, run: &RunId) -> String {
        format!("{}/{}", title.as_str(), run.as_str())
    }

    /// The REPORT lock key for a report's durable state.
    pub fn report_lock_key(title: &ReportTitle) -> String {
        title.as_str().to_string()
    }
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
