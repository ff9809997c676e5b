// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the scenario specs.

#![allow(dead_code)] // not every spec module uses every fixture

use gyoshu_core::{FakeClock, JobPayload, JobSpec};
use gyoshu_queue::ParallelQueue;
use gyoshu_storage::{LockManager, ProjectPaths, RuntimeRoot};
use tempfile::TempDir;

/// A tempdir-backed project + runtime pair.
pub struct Sandbox {
    pub tmp: TempDir,
    pub project: ProjectPaths,
    pub locks: LockManager,
    pub runtime: RuntimeRoot,
}

impl Sandbox {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("tempdir");
        let project = ProjectPaths::new(tmp.path().join("project"));
        let runtime = RuntimeRoot::at(tmp.path().join("runtime")).expect("runtime root");
        let locks = LockManager::new(runtime.clone()).with_order_enforcement(false);
        Self { tmp, project, locks, runtime }
    }

    /// Open a queue handle over this sandbox.
    pub fn queue(&self, report: &str, run: &str, clock: FakeClock) -> ParallelQueue<FakeClock> {
        ParallelQueue::open(self.project.clone(), self.locks.clone(), report, run, clock)
            .expect("open queue")
    }
}

/// A minimal execute-stage job spec.
pub fn execute_spec(stage: &str) -> JobSpec {
    JobSpec::new(
        stage,
        JobPayload::ExecuteStage { instructions: format!("run {stage}"), candidate_path: None },
    )
}
