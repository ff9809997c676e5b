// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bridge session registry.
//!
//! Each REPL bridge process owns a small metadata file under the runtime
//! root. Anything that wants to kill or adopt a bridge must first prove
//! identity: the recorded pid is alive AND its start time matches what the
//! metadata captured. A recycled pid fails the start-time check, so no
//! signal is ever sent to an unrelated process; the stale metadata is
//! reaped instead.

use crate::error::StorageError;
use crate::fs::{atomic_write_json, read_json_opt};
use crate::lock::{pid_alive, LockCategory, LockManager, DEFAULT_LOCK_TIMEOUT};
use crate::paths::RuntimeRoot;
use gyoshu_core::SessionId;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Python environment description recorded by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PythonEnv {
    #[serde(rename = "type")]
    pub env_type: String,
    pub python_path: String,
}

/// Per-session bridge metadata (ephemeral, runtime region).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeMeta {
    pub session_id: SessionId,
    pub pid: i32,
    /// Process start time in kernel clock ticks, captured at bridge start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_start_time: Option<u64>,
    pub socket_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_started: Option<String>,
    /// Legacy name for `bridgeStarted`; either may be present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    pub notebook_path: PathBuf,
    pub report_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_env: Option<PythonEnv>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<serde_json::Value>,
    /// Unknown fields from newer writers, preserved across read-modify-write.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl BridgeMeta {
    /// Refuse poisoned metadata before anything acts on it.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.pid <= 0 {
            return Err(StorageError::PoisonedMeta(format!("non-positive pid {}", self.pid)));
        }
        if !self.socket_path.is_absolute() {
            return Err(StorageError::PoisonedMeta(format!(
                "socket path not absolute: {}",
                self.socket_path.display()
            )));
        }
        if self.notebook_path.as_os_str().is_empty() {
            return Err(StorageError::PoisonedMeta("notebook path not set".into()));
        }
        if let Some(st) = self.process_start_time {
            if st == 0 {
                return Err(StorageError::PoisonedMeta("zero process start time".into()));
            }
        }
        let started = self
            .bridge_started
            .as_deref()
            .or(self.started_at.as_deref())
            .unwrap_or("");
        if started.is_empty() {
            return Err(StorageError::PoisonedMeta(
                "neither bridgeStarted nor startedAt is set".into(),
            ));
        }
        Ok(())
    }

    /// Prove the recorded (pid, start time) still refer to a live process.
    ///
    /// With no recorded start time the check degrades to liveness only.
    pub fn verify_identity(&self) -> Result<(), StorageError> {
        if !pid_alive(self.pid) {
            return Err(StorageError::IdentityMismatch {
                pid: self.pid,
                reason: "process is not running".into(),
            });
        }
        if let Some(recorded) = self.process_start_time {
            match process_start_time(self.pid) {
                Some(actual) if actual == recorded => {}
                Some(actual) => {
                    return Err(StorageError::IdentityMismatch {
                        pid: self.pid,
                        reason: format!(
                            "start time {} does not match recorded {} (pid recycled)",
                            actual, recorded
                        ),
                    });
                }
                None => {
                    return Err(StorageError::IdentityMismatch {
                        pid: self.pid,
                        reason: "start time unavailable".into(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Read a process start time (in clock ticks) from `/proc/<pid>/stat`.
///
/// The comm field may contain spaces and parentheses, so fields are
/// counted after the last `)`. Start time is field 22 of the stat line,
/// i.e. the 20th token after comm.
fn process_start_time(pid: i32) -> Option<u64> {
    let stat = fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    let after_comm = &stat[stat.rfind(')')? + 1..];
    after_comm.split_whitespace().nth(19)?.parse().ok()
}

/// Registry over every bridge session in a runtime root.
#[derive(Debug, Clone)]
pub struct BridgeRegistry {
    runtime: RuntimeRoot,
    locks: LockManager,
}

impl BridgeRegistry {
    pub fn new(runtime: RuntimeRoot, locks: LockManager) -> Self {
        Self { runtime, locks }
    }

    /// Load and validate a session's metadata.
    ///
    /// Returns `Ok(None)` when no metadata exists. Validation failures and
    /// unparseable documents surface as [`StorageError::PoisonedMeta`];
    /// the caller should reap and continue.
    pub fn load(&self, session: &SessionId) -> Result<Option<BridgeMeta>, StorageError> {
        let path = self.runtime.bridge_meta_path(session);
        let meta: Option<BridgeMeta> = match read_json_opt(&path) {
            Ok(m) => m,
            Err(StorageError::Json(e)) => {
                return Err(StorageError::PoisonedMeta(format!("unparseable metadata: {}", e)));
            }
            Err(e) => return Err(e),
        };
        match meta {
            Some(meta) => {
                meta.validate()?;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    /// Persist a session's metadata under its NOTEBOOK-category lock.
    pub fn save(&self, meta: &BridgeMeta) -> Result<(), StorageError> {
        meta.validate()?;
        let _guard = self.locks.acquire(
            LockCategory::Notebook,
            meta.session_id.as_str(),
            DEFAULT_LOCK_TIMEOUT,
        )?;
        atomic_write_json(&self.runtime.bridge_meta_path(&meta.session_id), meta)
    }

    /// Remove a session's metadata and socket. Never signals the process.
    pub fn reap(&self, session: &SessionId) -> Result<(), StorageError> {
        let _guard =
            self.locks.acquire(LockCategory::Notebook, session.as_str(), DEFAULT_LOCK_TIMEOUT)?;
        let meta_path = self.runtime.bridge_meta_path(session);

        // Best-effort socket cleanup first, while the metadata still names it.
        if let Ok(Some(meta)) = read_json_opt::<BridgeMeta>(&meta_path) {
            self.cleanup_socket(&meta);
        }

        match fs::remove_file(&meta_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!(session = session.as_str(), "reaped bridge metadata");
        Ok(())
    }

    /// Delete the bridge socket, but only if `lstat` confirms it is a
    /// socket and it lives inside the owning session's runtime directory.
    pub fn cleanup_socket(&self, meta: &BridgeMeta) {
        let session_dir = self.runtime.session_dir(&meta.session_id);
        if !socket_is_removable(&meta.socket_path, &session_dir) {
            tracing::debug!(
                socket = %meta.socket_path.display(),
                "skipping socket cleanup: not a contained socket"
            );
            return;
        }
        if let Err(e) = fs::remove_file(&meta.socket_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(socket = %meta.socket_path.display(), error = %e, "socket cleanup failed; continuing");
            }
        }
    }

    /// Terminate a bridge: verify identity, send SIGTERM, reap metadata.
    ///
    /// On identity mismatch the metadata is reaped and the mismatch is
    /// returned; no signal is sent.
    pub fn terminate(&self, session: &SessionId) -> Result<(), StorageError> {
        let meta = match self.load(session) {
            Ok(Some(meta)) => meta,
            Ok(None) => return Ok(()),
            Err(e @ StorageError::PoisonedMeta(_)) => {
                self.reap(session)?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        if let Err(mismatch) = meta.verify_identity() {
            self.reap(session)?;
            return Err(mismatch);
        }

        if let Err(e) = kill(Pid::from_raw(meta.pid), Signal::SIGTERM) {
            tracing::warn!(pid = meta.pid, error = %e, "SIGTERM failed; reaping metadata anyway");
        }
        self.reap(session)
    }

    /// Last observed activity for a session, from the metadata file mtime.
    ///
    /// Bridges rewrite their metadata on activity, so the mtime is the
    /// idle-reaper's staleness signal.
    pub fn last_activity(&self, session: &SessionId) -> Option<SystemTime> {
        fs::metadata(self.runtime.bridge_meta_path(session)).and_then(|m| m.modified()).ok()
    }

    /// Session ids with metadata currently on disk.
    pub fn sessions(&self) -> Vec<SessionId> {
        self.runtime.list_sessions()
    }
}

fn socket_is_removable(socket: &Path, session_dir: &Path) -> bool {
    if !socket.starts_with(session_dir) {
        return false;
    }
    match fs::symlink_metadata(socket) {
        Ok(meta) => {
            use std::os::unix::fs::FileTypeExt;
            meta.file_type().is_socket()
        }
        Err(_) => false,
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
