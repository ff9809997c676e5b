// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gyoshu-storage: the durable file substrate.
//!
//! Atomic writes, symlink-safe reads, path containment, category-ordered
//! advisory file locks, the bridge session registry, and the auto-loop
//! state store. Everything here is synchronous `std::fs`; correctness
//! across processes comes from file locks and atomic renames, not from an
//! async runtime.

pub mod bridge;
pub mod error;
pub mod fs;
pub mod lock;
pub mod loop_store;
pub mod paths;

pub use bridge::{BridgeMeta, BridgeRegistry, PythonEnv};
pub use error::StorageError;
pub use lock::{LockCategory, LockGuard, LockManager, DEFAULT_LOCK_TIMEOUT};
pub use loop_store::{LoopStore, LoopStoreError};
pub use paths::{short_hash, ProjectPaths, RuntimeRoot};
