// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The queue document: config, jobs, workers, run status.

use chrono::{DateTime, Utc};
use gyoshu_core::{Job, JobStatus, ReportTitle, RunId, WorkerRecord};
use serde::{Deserialize, Serialize};

/// Default attempt cap per job.
pub const DEFAULT_MAX_JOB_ATTEMPTS: u32 = 3;

/// Default stale-claim threshold. A CLAIMED job whose last sign of life is
/// older than this is reclaimed by `reap`.
pub const DEFAULT_STALE_CLAIM_MS: u64 = 120_000;

/// Default worker heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Effective queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    pub max_job_attempts: u32,
    pub stale_claim_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_job_attempts: DEFAULT_MAX_JOB_ATTEMPTS,
            stale_claim_ms: DEFAULT_STALE_CLAIM_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
        }
    }
}

/// Partial config supplied at `init`; unset fields take defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_job_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_claim_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_ms: Option<u64>,
}

impl QueueConfigPatch {
    /// Merge over the defaults.
    pub fn merged(&self) -> QueueConfig {
        let defaults = QueueConfig::default();
        QueueConfig {
            max_job_attempts: self.max_job_attempts.unwrap_or(defaults.max_job_attempts),
            stale_claim_ms: self.stale_claim_ms.unwrap_or(defaults.stale_claim_ms),
            heartbeat_interval_ms: self
                .heartbeat_interval_ms
                .unwrap_or(defaults.heartbeat_interval_ms),
        }
    }

    gyoshu_core::setters! {
        option {
            max_job_attempts: u32,
            stale_claim_ms: u64,
            heartbeat_interval_ms: u64,
        }
    }
}

/// Whether the run still has live work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueRunStatus {
    Active,
    Complete,
}

gyoshu_core::simple_display! {
    QueueRunStatus {
        Active => "active",
        Complete => "complete",
    }
}

/// Per-status job counts, keyed by the wire status names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    #[serde(rename = "PENDING")]
    pub pending: usize,
    #[serde(rename = "CLAIMED")]
    pub claimed: usize,
    #[serde(rename = "DONE")]
    pub done: usize,
    #[serde(rename = "FAILED")]
    pub failed: usize,
}

impl JobCounts {
    pub fn total(&self) -> usize {
        self.pending + self.claimed + self.done + self.failed
    }
}

/// The whole queue document for one (report, run).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelQueueState {
    pub report_title: ReportTitle,
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub config: QueueConfig,
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub workers: Vec<WorkerRecord>,
    pub status: QueueRunStatus,
    /// Unknown fields from newer writers, preserved across read-modify-write.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ParallelQueueState {
    pub fn new(report_title: ReportTitle, run_id: RunId, config: QueueConfig) -> Self {
        let now = Utc::now();
        Self {
            report_title,
            run_id,
            created_at: now,
            updated_at: now,
            config,
            jobs: Vec::new(),
            workers: Vec::new(),
            status: QueueRunStatus::Active,
            extra: serde_json::Map::new(),
        }
    }

    /// Count jobs by status, optionally restricted to one stage.
    pub fn counts(&self, stage_id: Option<&str>) -> JobCounts {
        let mut counts = JobCounts::default();
        for job in &self.jobs {
            if let Some(stage) = stage_id {
                if job.stage_id != stage {
                    continue;
                }
            }
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Claimed => counts.claimed += 1,
                JobStatus::Done => counts.done += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn find_job(&self, job_id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.job_id == job_id)
    }

    pub fn find_job_mut(&mut self, job_id: &str) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.job_id == job_id)
    }

    pub fn find_worker_mut(&mut self, worker_id: &str) -> Option<&mut WorkerRecord> {
        self.workers.iter_mut().find(|w| w.worker_id == worker_id)
    }

    /// Recompute the run status and bump `updatedAt` after a mutation.
    pub fn touch(&mut self) {
        let counts = self.counts(None);
        self.status = if counts.total() > 0 && counts.pending + counts.claimed == 0 {
            QueueRunStatus::Complete
        } else {
            QueueRunStatus::Active
        };
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
