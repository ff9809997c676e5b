// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Staging-tree adapter: collect candidates and verification verdicts.
//!
//! Stage workers write `candidate.json` into their per-cycle staging
//! directory; verifiers write `baksa.json` naming the candidate they
//! reviewed. Both are immutable after write, so this adapter is read-only
//! and tolerant: an unreadable artifact is logged and skipped, never
//! fatal to the cycle.

use crate::select::ScoredCandidate;
use crate::trust::aggregate;
use gyoshu_core::{Candidate, ReportTitle, VerificationResult};
use gyoshu_storage::error::logged_and_ignored;
use gyoshu_storage::{fs as safe_fs, ProjectPaths, StorageError};
use std::fs;

/// Everything one cycle produced in staging.
#[derive(Debug, Clone, Default)]
pub struct StageArtifacts {
    pub candidates: Vec<Candidate>,
    pub verifications: Vec<VerificationResult>,
}

impl StageArtifacts {
    /// Verifications whose `candidatePath` points at the given worker's
    /// candidate artifact.
    pub fn verifications_for(&self, worker_id: &str) -> Vec<VerificationResult> {
        let marker = format!("worker-{}/candidate.json", worker_id);
        self.verifications
            .iter()
            .filter(|v| v.candidate_path.ends_with(&marker))
            .cloned()
            .collect()
    }
}

/// Read every worker directory under `staging/cycle-{NN}/`.
pub fn collect_cycle_artifacts(
    project: &ProjectPaths,
    title: &ReportTitle,
    cycle: u32,
) -> Result<StageArtifacts, StorageError> {
    let staging = project
        .report_dir(title)
        .join("staging")
        .join(format!("cycle-{:02}", cycle));

    let mut artifacts = StageArtifacts::default();
    let entries = match fs::read_dir(&staging) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(artifacts),
        Err(e) => return Err(e.into()),
    };

    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }

        match safe_fs::read_json_opt::<Candidate>(&dir.join("candidate.json")) {
            Ok(Some(candidate)) => artifacts.candidates.push(candidate),
            Ok(None) => {}
            Err(e) => logged_and_ignored(&e, "reading candidate artifact"),
        }
        match safe_fs::read_json_opt::<VerificationResult>(&dir.join("baksa.json")) {
            Ok(Some(verdict)) => artifacts.verifications.push(verdict),
            Ok(None) => {}
            Err(e) => logged_and_ignored(&e, "reading verification artifact"),
        }
    }

    Ok(artifacts)
}

/// Pair each candidate with the aggregate of its verifier set.
///
/// Candidates nobody verified are dropped: with no verdicts there is no
/// trust standing, and the selection gate could never pass them anyway.
pub fn score_candidates(artifacts: &StageArtifacts) -> Vec<ScoredCandidate> {
    artifacts
        .candidates
        .iter()
        .filter_map(|candidate| {
            let verdicts = artifacts.verifications_for(&candidate.worker_id);
            aggregate(&verdicts)
                .map(|trust| ScoredCandidate { candidate: candidate.clone(), trust })
        })
        .collect()
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
