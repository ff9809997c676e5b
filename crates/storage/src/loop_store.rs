// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable auto-loop state persistence.
//!
//! One document per report at `reports/{title}/auto/loop-state.json`,
//! written under the REPORT lock. A document that fails invariant
//! validation is rotated to `.bak` and reported as poisoned rather than
//! half-trusted. A terminal state (active = false) is never overwritten by
//! an active one except through `create_new`.

use crate::error::StorageError;
use crate::fs::{atomic_write_json, read_json_opt};
use crate::lock::{LockCategory, LockManager, DEFAULT_LOCK_TIMEOUT};
use crate::paths::ProjectPaths;
use gyoshu_core::{AutoLoopState, LoopStateError, ReportTitle};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const MAX_BAK_FILES: u32 = 3;

/// Errors from the loop-state store.
#[derive(Debug, Error)]
pub enum LoopStoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("loop state violates invariants: {0}")]
    Invalid(#[from] LoopStateError),

    /// Attempt to overwrite a terminal state with an active one.
    #[error("loop for '{0}' is terminal; start a new loop explicitly")]
    Revived(String),

    /// `create_new` against a live loop.
    #[error("loop for '{0}' already active")]
    AlreadyActive(String),
}

/// Store for one project's auto-loop documents.
#[derive(Debug, Clone)]
pub struct LoopStore {
    project: ProjectPaths,
    locks: LockManager,
}

impl LoopStore {
    pub fn new(project: ProjectPaths, locks: LockManager) -> Self {
        Self { project, locks }
    }

    /// Load a report's loop state, if any.
    ///
    /// A document that fails validation is rotated to `.bak` and surfaced
    /// as poisoned so a later `create_new` can start clean.
    pub fn load(&self, title: &ReportTitle) -> Result<Option<AutoLoopState>, LoopStoreError> {
        let _guard = self.locks.acquire(
            LockCategory::Report,
            &ProjectPaths::report_lock_key(title),
            DEFAULT_LOCK_TIMEOUT,
        )?;
        self.load_locked(title)
    }

    fn load_locked(&self, title: &ReportTitle) -> Result<Option<AutoLoopState>, LoopStoreError> {
        let path = self.project.loop_state_path(title);
        let state: Option<AutoLoopState> = match read_json_opt(&path) {
            Ok(s) => s,
            Err(StorageError::Json(e)) => {
                self.quarantine(&path, &format!("unparseable: {}", e))?;
                return Err(StorageError::PoisonedMeta(format!(
                    "loop state for '{}' unparseable: {}",
                    title, e
                ))
                .into());
            }
            Err(e) => return Err(e.into()),
        };
        match state {
            Some(state) => {
                if let Err(violation) = state.validate() {
                    self.quarantine(&path, &violation.to_string())?;
                    return Err(LoopStoreError::Invalid(violation));
                }
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Persist loop state, refusing to revive a terminal loop.
    pub fn save(&self, state: &AutoLoopState) -> Result<(), LoopStoreError> {
        state.validate()?;
        let _guard = self.locks.acquire(
            LockCategory::Report,
            &ProjectPaths::report_lock_key(&state.report_title),
            DEFAULT_LOCK_TIMEOUT,
        )?;

        if state.active {
            if let Ok(Some(existing)) = self.load_locked(&state.report_title) {
                if !existing.active {
                    return Err(LoopStoreError::Revived(state.report_title.to_string()));
                }
            }
        }

        let path = self.project.loop_state_path(&state.report_title);
        atomic_write_json(&path, state)?;
        Ok(())
    }

    /// Start a new loop for a title, failing if one is already active.
    ///
    /// This is the only path that may replace a terminal document.
    pub fn create_new(&self, state: &AutoLoopState) -> Result<(), LoopStoreError> {
        state.validate()?;
        let _guard = self.locks.acquire(
            LockCategory::Report,
            &ProjectPaths::report_lock_key(&state.report_title),
            DEFAULT_LOCK_TIMEOUT,
        )?;

        match self.load_locked(&state.report_title) {
            Ok(Some(existing)) if existing.active => {
                return Err(LoopStoreError::AlreadyActive(state.report_title.to_string()));
            }
            // Poisoned documents were already quarantined by load_locked.
            Ok(_) | Err(LoopStoreError::Invalid(_)) | Err(LoopStoreError::Storage(StorageError::PoisonedMeta(_))) => {}
            Err(e) => return Err(e),
        }

        let path = self.project.loop_state_path(&state.report_title);
        atomic_write_json(&path, state)?;
        Ok(())
    }

    /// Archive a loop document out of the way (explicit destroy).
    pub fn archive(&self, title: &ReportTitle) -> Result<(), LoopStoreError> {
        let _guard = self.locks.acquire(
            LockCategory::Report,
            &ProjectPaths::report_lock_key(title),
            DEFAULT_LOCK_TIMEOUT,
        )?;
        let path = self.project.loop_state_path(title);
        if path.exists() {
            let bak = rotate_bak_path(&path);
            fs::rename(&path, &bak).map_err(StorageError::from)?;
        }
        Ok(())
    }

    fn quarantine(&self, path: &Path, reason: &str) -> Result<(), StorageError> {
        let bak = rotate_bak_path(path);
        tracing::warn!(
            path = %path.display(),
            bak = %bak.display(),
            reason,
            "quarantining poisoned loop state",
        );
        match fs::rename(path, &bak) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`.
/// The oldest backup is removed when the limit is reached.
pub(crate) fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    // Remove the oldest if at capacity
    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    // Shift existing backups up by one
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
#[path = "loop_store_tests.rs"]
mod tests;
