// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gyoshu-queue: the parallel job dispatch plane.
//!
//! One JSON document per (report, run), protected by a QUEUE-category file
//! lock. Every mutating operation is a strict read-validate-mutate-write
//! cycle under that lock, so concurrent claimers from independent
//! processes are guaranteed distinct jobs and no partial state ever
//! reaches disk. Semantics are at-least-once: stages must be idempotent.

pub mod error;
pub mod ops;
pub mod state;

pub use error::QueueError;
pub use ops::{
    action_envelope, BarrierSnapshot, ClaimOutcome, CompleteReceipt, EnqueueReceipt, FailReceipt,
    HeartbeatReceipt, InitReceipt, ParallelQueue, ReapSummary, StatusSummary, WorkerStatus,
};
pub use state::{JobCounts, ParallelQueueState, QueueConfig, QueueConfigPatch, QueueRunStatus};
