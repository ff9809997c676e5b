// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue error taxonomy.
//!
//! The typed API makes some of the wire-level errors unrepresentable: a
//! claim always carries a worker id, so "missing workerId" cannot occur.

use gyoshu_core::ReportTitleError;
use gyoshu_storage::StorageError;
use thiserror::Error;

/// Errors raised by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue '{0}' not found")]
    NotFound(String),

    #[error("queue '{0}' already exists")]
    AlreadyExists(String),

    #[error("job '{0}' not found")]
    JobNotFound(String),

    /// Transition requested from a state that does not allow it,
    /// e.g. `complete` on a job that is not CLAIMED.
    #[error("job '{job_id}' is {actual}, expected {expected}")]
    WrongState { job_id: String, expected: &'static str, actual: String },

    #[error("enqueue requires at least one job")]
    EmptyJobs,

    #[error("fail requires a non-empty error message")]
    MissingError,

    /// Report title or run id failed single-segment validation.
    #[error("invalid identifier: {0}")]
    InvalidSegment(#[from] ReportTitleError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl QueueError {
    /// Stable kind tag for the host-facing error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            QueueError::NotFound(_) | QueueError::JobNotFound(_) => "not_found",
            QueueError::AlreadyExists(_) => "already_exists",
            QueueError::WrongState { .. } => "wrong_state",
            QueueError::EmptyJobs => "empty_jobs",
            QueueError::MissingError => "missing_error",
            QueueError::InvalidSegment(_) => "invalid_segment",
            QueueError::Storage(StorageError::PathSafety(_)) => "path_safety",
            QueueError::Storage(StorageError::LockTimeout { .. }) => "lock_timeout",
            QueueError::Storage(_) => "storage",
        }
    }
}
