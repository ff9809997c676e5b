// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cycle dispatch: turn a cycle plan into queue jobs.
//!
//! The auto-loop enqueues one execute job per worker slot and one verify
//! job per candidate; the worker pool claims them through the queue. The
//! barrier predicate here is what unblocks the loop between the two
//! waves.

use crate::error::EngineError;
use gyoshu_core::{Clock, JobPayload, JobSpec, ReportTitle};
use gyoshu_queue::{EnqueueReceipt, ParallelQueue};
use gyoshu_storage::ProjectPaths;

/// What one cycle wants executed and verified.
#[derive(Debug, Clone)]
pub struct CyclePlan {
    pub stage_id: String,
    pub instructions: String,
    /// Worker slots to fan the stage out to.
    pub workers: u32,
    /// Capabilities each execute job requires.
    pub required_capabilities: Vec<String>,
}

impl CyclePlan {
    pub fn new(stage_id: impl Into<String>, instructions: impl Into<String>, workers: u32) -> Self {
        Self {
            stage_id: stage_id.into(),
            instructions: instructions.into(),
            workers,
            required_capabilities: Vec::new(),
        }
    }
}

/// Enqueue the execute wave for a cycle: one job per worker slot, each
/// told where its candidate artifact must land.
pub fn enqueue_cycle<C: Clock>(
    queue: &ParallelQueue<C>,
    project: &ProjectPaths,
    title: &ReportTitle,
    cycle: u32,
    plan: &CyclePlan,
) -> Result<EnqueueReceipt, EngineError> {
    let specs = (0..plan.workers)
        .map(|slot| {
            let candidate = project.candidate_path(title, cycle, &slot.to_string());
            let mut spec = JobSpec::new(
                plan.stage_id.clone(),
                JobPayload::ExecuteStage {
                    instructions: plan.instructions.clone(),
                    candidate_path: Some(candidate.display().to_string()),
                },
            );
            spec.required_capabilities = plan.required_capabilities.clone();
            spec
        })
        .collect();

    Ok(queue.enqueue(specs)?)
}

/// Enqueue the verification wave: one adversarial verify job per
/// candidate produced in this cycle.
pub fn enqueue_verification<C: Clock>(
    queue: &ParallelQueue<C>,
    project: &ProjectPaths,
    title: &ReportTitle,
    cycle: u32,
    stage_id: &str,
    candidate_workers: &[String],
) -> Result<EnqueueReceipt, EngineError> {
    let specs = candidate_workers
        .iter()
        .map(|worker| {
            let candidate = project.candidate_path(title, cycle, worker);
            let verdict = project.verification_path(title, cycle, worker);
            JobSpec::new(
                format!("{}-verify", stage_id),
                JobPayload::VerifyStage {
                    candidate_path: candidate.display().to_string(),
                    verdict_path: Some(verdict.display().to_string()),
                },
            )
        })
        .collect();

    Ok(queue.enqueue(specs)?)
}

/// Whether a stage's barrier has cleared (nothing pending or claimed).
pub fn stage_complete<C: Clock>(
    queue: &ParallelQueue<C>,
    stage_id: Option<&str>,
) -> Result<bool, EngineError> {
    Ok(queue.barrier_wait(stage_id)?.complete)
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
