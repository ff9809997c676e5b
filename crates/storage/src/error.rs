// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage error taxonomy.
//!
//! Path-safety rejections are a dedicated kind so callers can distinguish
//! containment violations from transient I/O. Raw I/O errors never leave
//! this crate unclassified.

use crate::lock::LockCategory;
use thiserror::Error;

/// Errors raised by the file substrate, lock manager, and bridge registry.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Traversal, root escape, symlink in path, or non-regular file.
    /// Never retried.
    #[error("path safety violation: {0}")]
    PathSafety(String),

    #[error("timed out acquiring {category} lock for '{key}' after {timeout_ms}ms")]
    LockTimeout { category: LockCategory, key: String, timeout_ms: u64 },

    /// Out-of-order acquisition detected while `GYOSHU_DEBUG` is set.
    #[error("lock ordering violation: acquiring {requested} while holding {held}")]
    LockOrder { requested: LockCategory, held: LockCategory },

    /// Metadata failed validation; the caller should reap it and continue.
    #[error("poisoned metadata: {0}")]
    PoisonedMeta(String),

    /// The recorded (pid, start time) no longer refer to a live process.
    #[error("identity mismatch for pid {pid}: {reason}")]
    IdentityMismatch { pid: i32, reason: String },

    /// A rename race or EAGAIN that survived the single retry.
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    /// Whether a caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::LockTimeout { .. } | StorageError::TransientIo(_))
    }
}

/// Route a non-fatal background error to the log and drop it.
///
/// Background sweeps (idle reap, cleanup-all) must not die on individual
/// failures, but the failure stays visible in the log.
pub fn logged_and_ignored(err: &StorageError, context: &str) {
    tracing::warn!(error = %err, context, "background operation failed; continuing");
}
