// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error taxonomy.

use gyoshu_core::BudgetExceeded;
use gyoshu_queue::QueueError;
use gyoshu_storage::{LoopStoreError, StorageError};
use thiserror::Error;

/// Errors raised by the decision engine and auto-loop controller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A loop budget tripped; the loop transitions to BUDGET_EXHAUSTED.
    #[error("budget exceeded: {0}")]
    Budget(BudgetExceeded),

    #[error("no loop tracked for report '{0}'")]
    UnknownLoop(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    LoopStore(#[from] LoopStoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),
}
