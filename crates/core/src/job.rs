// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue job entity and state machine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::fmt;

/// Unique identifier for a job within a queue document.
///
/// Assigned at enqueue time as `job-` plus 19 random characters; opaque
/// to callers, who only hand it back to `complete`/`fail`/`heartbeat`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub const PREFIX: &'static str = "job-";

    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(format!("{}{}", Self::PREFIX, nanoid::nanoid!(19)))
    }

    /// Wrap an existing id (deserialization, fixtures).
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Suffix truncated to at most `n` characters, for log lines.
    pub fn short(&self, n: usize) -> &str {
        let suffix = self.0.strip_prefix(Self::PREFIX).unwrap_or(&self.0);
        &suffix[..suffix.len().min(n)]
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for JobId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for JobId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Status of a queue job.
///
/// ```text
/// PENDING ──claim──▶ CLAIMED ──complete──▶ DONE
///    ▲                  │
///    └──fail/reap(retry)┤
///                       └──fail/reap(terminal)──▶ FAILED
/// ```
///
/// PENDING and CLAIMED are the only states with outgoing transitions;
/// DONE and FAILED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Claimed,
    Done,
    Failed,
}

impl JobStatus {
    /// Only PENDING jobs are eligible for claim.
    pub fn can_claim(&self) -> bool {
        matches!(self, JobStatus::Pending)
    }

    /// DONE and FAILED never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

crate::simple_display! {
    JobStatus {
        Pending => "PENDING",
        Claimed => "CLAIMED",
        Done => "DONE",
        Failed => "FAILED",
    }
}

/// Typed payload per job kind.
///
/// The kind tag and payload body travel together so an `execute_stage` job
/// can never carry a verifier payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum JobPayload {
    /// Run one research stage and write a candidate artifact.
    ExecuteStage {
        /// Instructions handed to the stage worker.
        instructions: String,
        /// Where the worker must write its candidate.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        candidate_path: Option<String>,
    },
    /// Adversarially verify a candidate and write a verdict artifact.
    VerifyStage {
        /// Candidate artifact under review.
        candidate_path: String,
        /// Where the verifier must write its verdict.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        verdict_path: Option<String>,
    },
}

impl JobPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            JobPayload::ExecuteStage { .. } => "execute_stage",
            JobPayload::VerifyStage { .. } => "verify_stage",
        }
    }
}

/// Caller-side description of a job to enqueue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub stage_id: String,
    #[serde(flatten)]
    pub payload: JobPayload,
    /// Per-job override of the queue's `maxJobAttempts`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_capabilities: Vec<String>,
}

impl JobSpec {
    pub fn new(stage_id: impl Into<String>, payload: JobPayload) -> Self {
        Self {
            stage_id: stage_id.into(),
            payload,
            max_attempts: None,
            required_capabilities: Vec::new(),
        }
    }

    crate::setters! {
        set {
            required_capabilities: Vec<String>,
        }
        option {
            max_attempts: u32,
        }
    }
}

/// A job stored in a queue document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: JobId,
    pub stage_id: String,
    #[serde(flatten)]
    pub payload: JobPayload,
    pub status: JobStatus,
    /// Number of times this job has been claimed.
    pub attempts: u32,
    /// Per-job override; the queue config value applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unknown fields from newer writers, preserved across read-modify-write.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// What a failure (explicit or stale-reclaim) did to the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailDisposition {
    /// Attempts remained; job is PENDING again.
    Retried,
    /// Attempt cap reached; job is FAILED permanently.
    Terminal,
}

impl Job {
    /// Materialize a spec into a stored job.
    pub fn from_spec(spec: JobSpec) -> Self {
        Self {
            job_id: JobId::new(),
            stage_id: spec.stage_id,
            payload: spec.payload,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: spec.max_attempts,
            required_capabilities: spec.required_capabilities,
            claimed_by: None,
            claimed_at: None,
            heartbeat_at: None,
            completed_at: None,
            result: None,
            error: None,
            extra: serde_json::Map::new(),
        }
    }

    /// The attempt cap for this job: per-job override wins, else queue config.
    pub fn effective_max_attempts(&self, config_max: u32) -> u32 {
        self.max_attempts.unwrap_or(config_max)
    }

    /// Whether a worker with these capabilities may run this job.
    ///
    /// Capability matching is set-inclusion: required ⊆ worker capabilities.
    pub fn matches_capabilities(&self, capabilities: &[String]) -> bool {
        self.required_capabilities.iter().all(|req| capabilities.iter().any(|c| c == req))
    }

    /// PENDING → CLAIMED. Caller must have checked `status.can_claim()`.
    pub fn claim(&mut self, worker_id: &str, now_ms: u64) {
        self.status = JobStatus::Claimed;
        self.claimed_by = Some(worker_id.to_string());
        self.claimed_at = Some(now_ms);
        self.heartbeat_at = Some(now_ms);
        self.attempts += 1;
    }

    /// CLAIMED → DONE with a result payload.
    pub fn complete(&mut self, result: Value, now_ms: u64) {
        self.status = JobStatus::Done;
        self.result = Some(result);
        self.completed_at = Some(now_ms);
    }

    /// CLAIMED → PENDING (attempts left) or FAILED (cap reached).
    ///
    /// Retry clears the claim fields so the next claimer starts clean; the
    /// terminal path records the last error.
    pub fn fail(&mut self, error: &str, config_max: u32) -> FailDisposition {
        if self.attempts < self.effective_max_attempts(config_max) {
            self.status = JobStatus::Pending;
            self.claimed_by = None;
            self.claimed_at = None;
            self.heartbeat_at = None;
            self.error = Some(error.to_string());
            FailDisposition::Retried
        } else {
            self.status = JobStatus::Failed;
            self.error = Some(error.to_string());
            FailDisposition::Terminal
        }
    }

    /// Whether a CLAIMED job's worker has gone quiet.
    ///
    /// Stale means the more recent of `heartbeatAt` and `claimedAt` is older
    /// than `stale_claim_ms`. Non-CLAIMED jobs are never stale.
    pub fn is_stale(&self, now_ms: u64, stale_claim_ms: u64) -> bool {
        if self.status != JobStatus::Claimed {
            return false;
        }
        let last_sign_of_life =
            self.heartbeat_at.unwrap_or(0).max(self.claimed_at.unwrap_or(0));
        now_ms.saturating_sub(last_sign_of_life) > stale_claim_ms
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            stage_id: String = "stage-A",
        }
        set {
            job_id: JobId = JobId::new(),
            payload: JobPayload = JobPayload::ExecuteStage {
                instructions: "run".to_string(),
                candidate_path: None,
            },
            status: JobStatus = JobStatus::Pending,
            attempts: u32 = 0,
            required_capabilities: Vec<String> = Vec::new(),
        }
        option {
            max_attempts: u32 = None,
            claimed_by: String = None,
            claimed_at: u64 = None,
            heartbeat_at: u64 = None,
            completed_at: u64 = None,
            result: Value = None,
            error: String = None,
        }
        computed {
            extra: serde_json::Map<String, Value> = serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
