// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage candidates: what a worker produced and how far it got.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A worker's stage output, eligible for verification and selection.
///
/// The body is open (a stage may record anything), but the fields the
/// decision engine ranks on are typed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub worker_id: String,
    pub stage_id: String,
    /// Named metrics the stage measured.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,
    /// Fraction of the research goal this candidate achieves, 0.0–1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_progress: Option<f64>,
    /// Headline metric used as the selection tie-breaker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_metric: Option<f64>,
    /// Unknown fields from newer writers, preserved across read-modify-write.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Candidate {
    pub fn new(worker_id: impl Into<String>, stage_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            stage_id: stage_id.into(),
            metrics: BTreeMap::new(),
            goal_progress: None,
            primary_metric: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Look up a metric by name.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

crate::builder! {
    pub struct CandidateBuilder => Candidate {
        into {
            worker_id: String = "worker-0",
            stage_id: String = "stage-A",
        }
        set {
            metrics: BTreeMap<String, f64> = BTreeMap::new(),
        }
        option {
            goal_progress: f64 = None,
            primary_metric: f64 = None,
        }
        computed {
            extra: serde_json::Map<String, serde_json::Value> = serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
#[path = "candidate_tests.rs"]
mod tests;
