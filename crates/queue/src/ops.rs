// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue operations.
//!
//! Every mutator acquires the QUEUE lock for its (report, run), reads the
//! whole document, validates, edits, and atomically writes it back. Two
//! concurrent claimers therefore observe each other's transitions in some
//! sequential order and can never take the same job. Read-only snapshots
//! (`status`, `barrier_wait`) go lock-free: atomic renames guarantee they
//! see a complete document.

use crate::error::QueueError;
use crate::state::{JobCounts, ParallelQueueState, QueueConfig, QueueConfigPatch, QueueRunStatus};
use gyoshu_core::{
    Clock, FailDisposition, Job, JobId, JobSpec, JobStatus, ReportTitle, RunId, SystemClock,
    WorkerId, WorkerRecord,
};
use gyoshu_storage::{
    fs::{atomic_write_json, read_json_opt},
    LockCategory, LockGuard, LockManager, ProjectPaths, DEFAULT_LOCK_TIMEOUT,
};
use serde::Serialize;
use std::path::PathBuf;

/// Handle to one queue document.
#[derive(Debug)]
pub struct ParallelQueue<C: Clock = SystemClock> {
    project: ProjectPaths,
    locks: LockManager,
    title: ReportTitle,
    run: RunId,
    clock: C,
}

/// Receipt for `init`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitReceipt {
    pub report_title: ReportTitle,
    pub run_id: RunId,
    pub config: QueueConfig,
}

/// Receipt for `enqueue`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueReceipt {
    pub job_ids: Vec<JobId>,
    pub enqueued: usize,
    pub total_jobs: usize,
}

/// Result of a claim: a job, or an explicit empty-handed outcome.
///
/// "Nothing eligible" is not an error; workers poll until the barrier
/// clears.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ClaimOutcome {
    Claimed { success: bool, job: Job },
    NoJobs { success: bool, reason: &'static str },
}

impl ClaimOutcome {
    fn claimed(job: Job) -> Self {
        ClaimOutcome::Claimed { success: true, job }
    }

    fn no_jobs() -> Self {
        ClaimOutcome::NoJobs { success: false, reason: "no_jobs" }
    }

    pub fn job(&self) -> Option<&Job> {
        match self {
            ClaimOutcome::Claimed { job, .. } => Some(job),
            ClaimOutcome::NoJobs { .. } => None,
        }
    }

    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed { .. })
    }
}

/// Receipt for `heartbeat`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatReceipt {
    pub worker_id: WorkerId,
    /// Whether a job heartbeat was also refreshed.
    pub job_refreshed: bool,
}

/// Receipt for `complete`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteReceipt {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Receipt for `fail`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailReceipt {
    pub job_id: JobId,
    pub status: JobStatus,
    pub attempts: u32,
    /// True when the job went back to PENDING for another try.
    pub will_retry: bool,
}

/// One worker's view in `status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub worker_id: WorkerId,
    pub capabilities: Vec<String>,
    pub heartbeat_at: u64,
    pub active: bool,
}

/// Full queue status snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub run_status: QueueRunStatus,
    pub job_counts: JobCounts,
    pub total_jobs: usize,
    pub workers: Vec<WorkerStatus>,
    pub is_complete: bool,
    pub has_failed: bool,
}

/// Receipt for `reap`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReapSummary {
    pub reaped_count: usize,
    pub requeued: Vec<JobId>,
    pub failed: Vec<JobId>,
}

/// Barrier snapshot: non-blocking completion predicate over a stage (or
/// the whole run).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BarrierSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,
    pub pending: usize,
    pub claimed: usize,
    pub done: usize,
    pub failed: usize,
    pub total_jobs: usize,
    pub complete: bool,
}

/// Wrap an operation outcome in the compact host-facing envelope:
/// `{success, action, ...payload}` or `{success: false, action, error}`.
pub fn action_envelope<T: Serialize>(
    action: &str,
    outcome: &Result<T, QueueError>,
) -> serde_json::Value {
    match outcome {
        Ok(payload) => {
            let mut body = serde_json::json!({ "success": true, "action": action });
            if let (Some(obj), Ok(serde_json::Value::Object(fields))) =
                (body.as_object_mut(), serde_json::to_value(payload))
            {
                // Payload fields win: a no-jobs claim outcome carries its
                // own `success: false`.
                for (key, value) in fields {
                    obj.insert(key, value);
                }
            }
            body
        }
        Err(e) => serde_json::json!({
            "success": false,
            "action": action,
            "error": { "kind": e.kind(), "message": e.to_string() },
        }),
    }
}

impl<C: Clock> ParallelQueue<C> {
    /// Open a handle, validating the identifiers as path segments.
    pub fn open(
        project: ProjectPaths,
        locks: LockManager,
        report_title: &str,
        run_id: &str,
        clock: C,
    ) -> Result<Self, QueueError> {
        let title = ReportTitle::new(report_title)?;
        let run = RunId::new(run_id)?;
        Ok(Self { project, locks, title, run, clock })
    }

    pub fn report_title(&self) -> &ReportTitle {
        &self.title
    }

    pub fn run_id(&self) -> &RunId {
        &self.run
    }

    /// Create the queue document. Fails if it already exists.
    pub fn init(&self, patch: QueueConfigPatch) -> Result<InitReceipt, QueueError> {
        let _guard = self.lock()?;
        let path = self.path();
        if read_json_opt::<serde_json::Value>(&path)?.is_some() {
            return Err(QueueError::AlreadyExists(self.display_name()));
        }

        let config = patch.merged();
        let state = ParallelQueueState::new(self.title.clone(), self.run.clone(), config.clone());
        atomic_write_json(&path, &state)?;
        tracing::info!(queue = %self.display_name(), "initialized queue");
        Ok(InitReceipt { report_title: self.title.clone(), run_id: self.run.clone(), config })
    }

    /// Append jobs. At least one spec is required.
    pub fn enqueue(&self, specs: Vec<JobSpec>) -> Result<EnqueueReceipt, QueueError> {
        if specs.is_empty() {
            return Err(QueueError::EmptyJobs);
        }
        let _guard = self.lock()?;
        let mut state = self.read()?;

        let mut job_ids = Vec::with_capacity(specs.len());
        for spec in specs {
            let job = Job::from_spec(spec);
            job_ids.push(job.job_id.clone());
            state.jobs.push(job);
        }
        let enqueued = job_ids.len();
        state.touch();
        self.write(&state)?;

        tracing::debug!(queue = %self.display_name(), enqueued, "enqueued jobs");
        Ok(EnqueueReceipt { job_ids, enqueued, total_jobs: state.jobs.len() })
    }

    /// Claim the first eligible PENDING job for a worker.
    ///
    /// Deterministic: jobs are scanned in stored order and eligibility is
    /// capability set-inclusion. The worker is registered (or refreshed)
    /// whether or not a job was available.
    pub fn claim(
        &self,
        worker_id: &WorkerId,
        capabilities: &[String],
    ) -> Result<ClaimOutcome, QueueError> {
        let _guard = self.lock()?;
        let mut state = self.read()?;
        let now = self.clock.epoch_ms();

        match state.workers.iter().position(|w| w.worker_id == worker_id.as_str()) {
            Some(i) => state.workers[i].refresh(capabilities, now),
            None => state
                .workers
                .push(WorkerRecord::new(worker_id.clone(), capabilities.to_vec(), now)),
        }

        let claimed = state
            .jobs
            .iter_mut()
            .find(|j| j.status.can_claim() && j.matches_capabilities(capabilities))
            .map(|job| {
                job.claim(worker_id.as_str(), now);
                job.clone()
            });

        state.touch();
        self.write(&state)?;

        match claimed {
            Some(job) => {
                tracing::debug!(queue = %self.display_name(), worker = %worker_id, job = %job.job_id, "claimed job");
                Ok(ClaimOutcome::claimed(job))
            }
            None => Ok(ClaimOutcome::no_jobs()),
        }
    }

    /// Refresh a worker's heartbeat, and optionally its claimed job's.
    ///
    /// A first heartbeat registers the worker. An unknown or no-longer-held
    /// job id is not an error; the receipt just reports nothing refreshed.
    pub fn heartbeat(
        &self,
        worker_id: &WorkerId,
        job_id: Option<&JobId>,
    ) -> Result<HeartbeatReceipt, QueueError> {
        let _guard = self.lock()?;
        let mut state = self.read()?;
        let now = self.clock.epoch_ms();

        match state.workers.iter().position(|w| w.worker_id == worker_id.as_str()) {
            Some(i) => state.workers[i].refresh(&[], now),
            None => state.workers.push(WorkerRecord::new(worker_id.clone(), Vec::new(), now)),
        }

        let mut job_refreshed = false;
        if let Some(job_id) = job_id {
            if let Some(job) = state.find_job_mut(job_id.as_str()) {
                if job.status == JobStatus::Claimed
                    && job.claimed_by.as_deref() == Some(worker_id.as_str())
                {
                    job.heartbeat_at = Some(now);
                    job_refreshed = true;
                }
            }
        }

        state.touch();
        self.write(&state)?;
        Ok(HeartbeatReceipt { worker_id: worker_id.clone(), job_refreshed })
    }

    /// CLAIMED → DONE with a result payload.
    pub fn complete(
        &self,
        job_id: &JobId,
        result: serde_json::Value,
    ) -> Result<CompleteReceipt, QueueError> {
        let _guard = self.lock()?;
        let mut state = self.read()?;
        let now = self.clock.epoch_ms();

        let job = state
            .find_job_mut(job_id.as_str())
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
        if job.status != JobStatus::Claimed {
            return Err(QueueError::WrongState {
                job_id: job_id.to_string(),
                expected: "CLAIMED",
                actual: job.status.to_string(),
            });
        }
        job.complete(result, now);

        state.touch();
        self.write(&state)?;
        tracing::debug!(queue = %self.display_name(), job = %job_id, "job done");
        Ok(CompleteReceipt { job_id: job_id.clone(), status: JobStatus::Done })
    }

    /// CLAIMED → PENDING (attempts left) or FAILED (cap reached).
    pub fn fail(&self, job_id: &JobId, error: &str) -> Result<FailReceipt, QueueError> {
        if error.trim().is_empty() {
            return Err(QueueError::MissingError);
        }
        let _guard = self.lock()?;
        let mut state = self.read()?;
        let max_attempts = state.config.max_job_attempts;

        let job = state
            .find_job_mut(job_id.as_str())
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))?;
        if job.status != JobStatus::Claimed {
            return Err(QueueError::WrongState {
                job_id: job_id.to_string(),
                expected: "CLAIMED",
                actual: job.status.to_string(),
            });
        }

        let disposition = job.fail(error, max_attempts);
        let receipt = FailReceipt {
            job_id: job_id.clone(),
            status: job.status,
            attempts: job.attempts,
            will_retry: disposition == FailDisposition::Retried,
        };

        state.touch();
        self.write(&state)?;
        tracing::info!(
            queue = %self.display_name(),
            job = %job_id,
            attempts = receipt.attempts,
            will_retry = receipt.will_retry,
            "job failed"
        );
        Ok(receipt)
    }

    /// Reclaim every CLAIMED job whose worker stopped heartbeating.
    ///
    /// Stale jobs are treated exactly like `fail`: back to PENDING with
    /// attempts left, FAILED otherwise. This is the only cancellation path.
    pub fn reap(&self) -> Result<ReapSummary, QueueError> {
        let _guard = self.lock()?;
        let mut state = self.read()?;
        let now = self.clock.epoch_ms();
        let stale_ms = state.config.stale_claim_ms;
        let max_attempts = state.config.max_job_attempts;

        let mut summary = ReapSummary { reaped_count: 0, requeued: Vec::new(), failed: Vec::new() };
        for job in &mut state.jobs {
            if !job.is_stale(now, stale_ms) {
                continue;
            }
            let worker = job.claimed_by.clone().unwrap_or_default();
            let disposition =
                job.fail(&format!("stale claim reclaimed from worker '{}'", worker), max_attempts);
            summary.reaped_count += 1;
            match disposition {
                FailDisposition::Retried => summary.requeued.push(job.job_id.clone()),
                FailDisposition::Terminal => summary.failed.push(job.job_id.clone()),
            }
            tracing::info!(
                queue = %self.display_name(),
                job = %job.job_id,
                worker,
                terminal = disposition == FailDisposition::Terminal,
                "reclaimed stale claim"
            );
        }

        if summary.reaped_count > 0 {
            state.touch();
            self.write(&state)?;
        }
        Ok(summary)
    }

    /// Lock-free status snapshot.
    pub fn status(&self) -> Result<StatusSummary, QueueError> {
        let state = self.read()?;
        let now = self.clock.epoch_ms();
        let job_counts = state.counts(None);
        let workers = state
            .workers
            .iter()
            .map(|w| WorkerStatus {
                worker_id: w.worker_id.clone(),
                capabilities: w.capabilities.clone(),
                heartbeat_at: w.heartbeat_at,
                active: w.is_active(now, state.config.heartbeat_interval_ms),
            })
            .collect();

        Ok(StatusSummary {
            run_status: state.status,
            total_jobs: job_counts.total(),
            is_complete: job_counts.total() > 0 && job_counts.pending + job_counts.claimed == 0,
            has_failed: job_counts.failed > 0,
            job_counts,
            workers,
        })
    }

    /// Non-blocking barrier predicate: complete when nothing is pending or
    /// claimed for the stage (or the whole run). The caller chooses its
    /// own polling cadence; the queue never sleeps on its behalf.
    pub fn barrier_wait(&self, stage_id: Option<&str>) -> Result<BarrierSnapshot, QueueError> {
        let state = self.read()?;
        let counts = state.counts(stage_id);
        Ok(BarrierSnapshot {
            stage_id: stage_id.map(str::to_string),
            pending: counts.pending,
            claimed: counts.claimed,
            done: counts.done,
            failed: counts.failed,
            total_jobs: counts.total(),
            complete: counts.pending + counts.claimed == 0,
        })
    }

    fn lock(&self) -> Result<LockGuard, QueueError> {
        Ok(self.locks.acquire(
            LockCategory::Queue,
            &ProjectPaths::queue_lock_key(&self.title, &self.run),
            DEFAULT_LOCK_TIMEOUT,
        )?)
    }

    fn path(&self) -> PathBuf {
        self.project.queue_path(&self.title, &self.run)
    }

    fn read(&self) -> Result<ParallelQueueState, QueueError> {
        read_json_opt(&self.path())?.ok_or_else(|| QueueError::NotFound(self.display_name()))
    }

    fn write(&self, state: &ParallelQueueState) -> Result<(), QueueError> {
        Ok(atomic_write_json(&self.path(), state)?)
    }

    fn display_name(&self) -> String {
        format!("{}/{}", self.title, self.run)
    }
}

#[cfg(test)]
#[path = "ops_tests.rs"]
mod tests;
