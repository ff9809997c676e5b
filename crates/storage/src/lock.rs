// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Advisory file locks with a fixed global acquisition order.
//!
//! Three categories, ordered QUEUE (1) < NOTEBOOK (2) < REPORT (3). A
//! caller needing several categories acquires in ascending order and
//! releases in reverse; holding a later lock while requesting an earlier
//! one is a deadlock precondition, refused outright when `GYOSHU_DEBUG`
//! is set. Lock files live only under the runtime root and record their
//! owner so a stale lock (owner dead, or twice its timeout old) can be
//! reclaimed.

use crate::error::StorageError;
use crate::fs::ensure_dir_no_symlink;
use crate::paths::RuntimeRoot;
use fs2::FileExt;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default bound on lock acquisition.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Base poll interval while contending; doubles up to [`MAX_POLL_MS`].
const BASE_POLL_MS: u64 = 10;
const MAX_POLL_MS: u64 = 200;

/// Lock categories in their global acquisition order.
///
/// QUEUE serializes the dispatch plane (widest scope), NOTEBOOK serializes
/// notebook and session-metadata writes that may happen under it, REPORT
/// serializes the narrow final report state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockCategory {
    Queue = 1,
    Notebook = 2,
    Report = 3,
}

impl LockCategory {
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    pub fn dir_name(&self) -> &'static str {
        match self {
            LockCategory::Queue => "queue",
            LockCategory::Notebook => "notebook",
            LockCategory::Report => "report",
        }
    }
}

gyoshu_core::simple_display! {
    LockCategory {
        Queue => "QUEUE",
        Notebook => "NOTEBOOK",
        Report => "REPORT",
    }
}

/// Owner record stored in the lock file body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerRecord {
    pid: i32,
    acquired_at_ms: u64,
    timeout_ms: u64,
}

thread_local! {
    /// Ranks of locks held by this thread, in acquisition order.
    static HELD_RANKS: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
}

/// Category-ordered lock manager over the runtime root.
#[derive(Debug, Clone)]
pub struct LockManager {
    runtime: RuntimeRoot,
    enforce_order: bool,
}

impl LockManager {
    pub fn new(runtime: RuntimeRoot) -> Self {
        let enforce_order = std::env::var("GYOSHU_DEBUG").is_ok_and(|v| !v.is_empty());
        Self { runtime, enforce_order }
    }

    /// Force order enforcement on or off (tests use this instead of env).
    pub fn with_order_enforcement(mut self, on: bool) -> Self {
        self.enforce_order = on;
        self
    }

    /// Acquire a lock, waiting at most `timeout`.
    ///
    /// The returned guard releases on drop, on every exit path including
    /// unwind. Acquisition never blocks indefinitely: expiry surfaces as
    /// [`StorageError::LockTimeout`].
    pub fn acquire(
        &self,
        category: LockCategory,
        key: &str,
        timeout: Duration,
    ) -> Result<LockGuard, StorageError> {
        if self.enforce_order {
            let violation = HELD_RANKS.with(|held| {
                held.borrow().iter().find(|&&rank| rank >= category.rank()).copied()
            });
            if let Some(rank) = violation {
                return Err(StorageError::LockOrder {
                    requested: category,
                    held: rank_to_category(rank),
                });
            }
        }

        let lock_path = self.runtime.lock_path(category, key);
        if let Some(parent) = lock_path.parent() {
            ensure_dir_no_symlink(parent)?;
        }

        let timeout_ms = timeout.as_millis() as u64;
        let deadline = SystemTime::now() + timeout;
        let mut poll_ms = BASE_POLL_MS;

        loop {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)?;

            if file.try_lock_exclusive().is_ok() {
                let record = OwnerRecord {
                    pid: std::process::id() as i32,
                    acquired_at_ms: epoch_ms(),
                    timeout_ms,
                };
                file.set_len(0)?;
                file.seek(SeekFrom::Start(0))?;
                file.write_all(serde_json::to_string(&record)?.as_bytes())?;
                file.flush()?;

                HELD_RANKS.with(|held| held.borrow_mut().push(category.rank()));
                tracing::debug!(%category, key, "acquired lock");
                return Ok(LockGuard {
                    file: Some(file),
                    path: lock_path,
                    category,
                    key: key.to_string(),
                });
            }

            // Contended. A dead owner's flock is already released by the
            // OS, so reaching here with a stale record means the owner is
            // alive but wedged; reclaim by unlinking once the record is
            // past twice its own timeout (or unreadable and old).
            if let Some(reason) = stale_reason(&mut file) {
                tracing::warn!(%category, key, reason, "reclaiming stale lock file");
                drop(file);
                let _ = fs::remove_file(&lock_path);
                continue;
            }
            drop(file);

            if SystemTime::now() >= deadline {
                return Err(StorageError::LockTimeout {
                    category,
                    key: key.to_string(),
                    timeout_ms,
                });
            }
            std::thread::sleep(Duration::from_millis(poll_ms));
            poll_ms = (poll_ms * 2).min(MAX_POLL_MS);
        }
    }

    /// Acquire with the default 30s timeout.
    pub fn acquire_default(
        &self,
        category: LockCategory,
        key: &str,
    ) -> Result<LockGuard, StorageError> {
        self.acquire(category, key, DEFAULT_LOCK_TIMEOUT)
    }
}

/// Why a contended lock file may be reclaimed, if it may.
fn stale_reason(file: &mut fs::File) -> Option<&'static str> {
    let mut body = String::new();
    if file.read_to_string(&mut body).is_err() {
        return None;
    }
    let Ok(record) = serde_json::from_str::<OwnerRecord>(&body) else {
        return None;
    };
    if !pid_alive(record.pid) {
        return Some("owner process is dead");
    }
    let age = epoch_ms().saturating_sub(record.acquired_at_ms);
    if age > record.timeout_ms.saturating_mul(2) {
        return Some("lock held past twice its timeout");
    }
    None
}

fn rank_to_category(rank: u8) -> LockCategory {
    match rank {
        1 => LockCategory::Queue,
        2 => LockCategory::Notebook,
        _ => LockCategory::Report,
    }
}

/// Signal-0 probe: ESRCH means gone, anything else means some process
/// owns the pid.
pub(crate) fn pid_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(_) => true,
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// RAII guard for one held lock.
#[derive(Debug)]
pub struct LockGuard {
    file: Option<fs::File>,
    path: PathBuf,
    category: LockCategory,
    key: String,
}

impl LockGuard {
    pub fn category(&self) -> LockCategory {
        self.category
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
        HELD_RANKS.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|&r| r == self.category.rank()) {
                held.remove(pos);
            }
        });
        tracing::debug!(category = %self.category, key = %self.key, path = %self.path.display(), "released lock");
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
