// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker identity and registration record.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// A worker is considered active while `now − heartbeatAt` stays under
/// `heartbeat_interval · ACTIVE_HEARTBEAT_FACTOR`.
pub const ACTIVE_HEARTBEAT_FACTOR: u64 = 3;

/// Unique identifier for a worker instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub String);

impl WorkerId {
    /// Create a new WorkerId from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string value of this WorkerId.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for WorkerId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for WorkerId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for WorkerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Registration record for a worker participating in a queue run.
///
/// Created or refreshed on every claim and heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecord {
    pub worker_id: WorkerId,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub registered_at: u64,
    pub heartbeat_at: u64,
    /// Unknown fields from newer writers, preserved across read-modify-write.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl WorkerRecord {
    pub fn new(worker_id: WorkerId, capabilities: Vec<String>, now_ms: u64) -> Self {
        Self {
            worker_id,
            capabilities,
            registered_at: now_ms,
            heartbeat_at: now_ms,
            extra: serde_json::Map::new(),
        }
    }

    /// Refresh the heartbeat, merging any newly-advertised capabilities.
    pub fn refresh(&mut self, capabilities: &[String], now_ms: u64) {
        self.heartbeat_at = now_ms;
        for cap in capabilities {
            if !self.capabilities.iter().any(|c| c == cap) {
                self.capabilities.push(cap.clone());
            }
        }
    }

    /// Whether this worker has heartbeated recently enough to count as alive.
    pub fn is_active(&self, now_ms: u64, heartbeat_interval_ms: u64) -> bool {
        now_ms.saturating_sub(self.heartbeat_at)
            < heartbeat_interval_ms.saturating_mul(ACTIVE_HEARTBEAT_FACTOR)
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
