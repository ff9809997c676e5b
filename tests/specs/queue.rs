// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue specs: claim races, stale reclaim, retry caps, capability
//! filtering, and the stage barrier.

use super::prelude::*;
use gyoshu_core::{FakeClock, JobStatus, WorkerId};
use gyoshu_queue::QueueConfigPatch;
use std::collections::HashSet;
use std::sync::Arc;

/// Five concurrent claimers against five jobs: every claimer gets a job
/// and no job is handed out twice.
#[test]
fn s1_concurrent_claims_are_distinct() {
    let sandbox = Sandbox::new();
    let clock = FakeClock::new();
    let queue = sandbox.queue("wine", "run-001", clock.clone());
    queue.init(QueueConfigPatch::default()).unwrap();
    queue
        .enqueue((1..=5).map(|n| execute_spec(&format!("S{n:02}"))).collect())
        .unwrap();

    let sandbox = Arc::new(sandbox);
    let mut handles = Vec::new();
    for n in 0..5 {
        let sandbox = Arc::clone(&sandbox);
        let clock = clock.clone();
        handles.push(std::thread::spawn(move || {
            let queue = sandbox.queue("wine", "run-001", clock);
            queue.claim(&WorkerId::new(format!("w{n}")), &[]).unwrap()
        }));
    }

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let ids: HashSet<String> = outcomes
        .iter()
        .map(|o| o.job().expect("every claimer should win a job").job_id.to_string())
        .collect();
    assert_eq!(ids.len(), 5, "all five jobs distinct");

    let status = sandbox.queue("wine", "run-001", clock).status().unwrap();
    assert_eq!(status.job_counts.pending, 0);
    assert_eq!(status.job_counts.claimed, 5);
}

/// More claimers than jobs: exactly K jobs go out, the rest get the
/// explicit no-jobs outcome.
#[test]
fn s1b_excess_claimers_get_no_jobs() {
    let sandbox = Sandbox::new();
    let clock = FakeClock::new();
    let queue = sandbox.queue("wine", "run-002", clock.clone());
    queue.init(QueueConfigPatch::default()).unwrap();
    queue.enqueue(vec![execute_spec("S01"), execute_spec("S02")]).unwrap();

    let sandbox = Arc::new(sandbox);
    let mut handles = Vec::new();
    for n in 0..6 {
        let sandbox = Arc::clone(&sandbox);
        let clock = clock.clone();
        handles.push(std::thread::spawn(move || {
            let queue = sandbox.queue("wine", "run-002", clock);
            queue.claim(&WorkerId::new(format!("w{n}")), &[]).unwrap()
        }));
    }

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = outcomes.iter().filter(|o| o.is_claimed()).count();
    assert_eq!(winners, 2);
    assert_eq!(outcomes.len() - winners, 4);
}

/// S2: a claimed job whose worker goes quiet is reclaimed and handed to
/// the next claimer with the attempt counter advanced.
#[test]
fn s2_stale_claim_reclaim() {
    let sandbox = Sandbox::new();
    let clock = FakeClock::new();
    let queue = sandbox.queue("wine", "run-003", clock.clone());
    queue
        .init(QueueConfigPatch::default().stale_claim_ms(100u64).max_job_attempts(3u32))
        .unwrap();
    queue.enqueue(vec![execute_spec("S01")]).unwrap();

    let first = queue.claim(&WorkerId::new("w1"), &[]).unwrap();
    let job_id = first.job().unwrap().job_id.clone();
    assert_eq!(first.job().unwrap().attempts, 1);

    clock.advance_ms(150);
    let summary = queue.reap().unwrap();
    assert_eq!(summary.reaped_count, 1);
    assert_eq!(summary.requeued, vec![job_id.clone()]);

    let second = queue.claim(&WorkerId::new("w2"), &[]).unwrap();
    let job = second.job().unwrap();
    assert_eq!(job.job_id, job_id, "same job comes back");
    assert_eq!(job.attempts, 2);
    assert_eq!(job.claimed_by.as_deref(), Some("w2"));
}

/// S3: with maxJobAttempts = 2, the second failure is terminal.
#[test]
fn s3_retry_cap_is_terminal() {
    let sandbox = Sandbox::new();
    let clock = FakeClock::new();
    let queue = sandbox.queue("wine", "run-004", clock);
    queue.init(QueueConfigPatch::default().max_job_attempts(2u32)).unwrap();
    queue.enqueue(vec![execute_spec("S01")]).unwrap();

    let job_id = queue.claim(&WorkerId::new("w1"), &[]).unwrap().job().unwrap().job_id.clone();
    let first = queue.fail(&job_id, "attempt 1 failed").unwrap();
    assert!(first.will_retry);

    let reclaim = queue.claim(&WorkerId::new("w1"), &[]).unwrap();
    assert_eq!(reclaim.job().unwrap().job_id, job_id);
    let second = queue.fail(&job_id, "attempt 2 failed").unwrap();
    assert!(!second.will_retry);
    assert_eq!(second.status, JobStatus::Failed);
    assert_eq!(second.attempts, 2);

    let status = queue.status().unwrap();
    assert_eq!(status.job_counts.failed, 1);
    assert_eq!(status.job_counts.pending, 0);
}

/// S4: capability matching is set-inclusion on the worker side.
#[test]
fn s4_capability_filter() {
    let sandbox = Sandbox::new();
    let queue = sandbox.queue("wine", "run-005", FakeClock::new());
    queue.init(QueueConfigPatch::default()).unwrap();

    let mut gpu_spec = execute_spec("train");
    gpu_spec.required_capabilities = vec!["gpu".into()];
    queue.enqueue(vec![gpu_spec]).unwrap();

    let cpu = queue.claim(&WorkerId::new("cpu-w"), &["cpu".into()]).unwrap();
    assert!(!cpu.is_claimed());
    let json = serde_json::to_value(&cpu).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["reason"], "no_jobs");

    let gpu = queue.claim(&WorkerId::new("gpu-w"), &["gpu".into()]).unwrap();
    assert!(gpu.is_claimed());
}

/// S5: the barrier clears per stage, not per run.
#[test]
fn s5_barrier_per_stage() {
    let sandbox = Sandbox::new();
    let queue = sandbox.queue("wine", "run-006", FakeClock::new());
    queue.init(QueueConfigPatch::default()).unwrap();
    queue
        .enqueue(vec![execute_spec("stage-A"), execute_spec("stage-A"), execute_spec("stage-B")])
        .unwrap();

    // Claim and complete only the stage-A jobs.
    loop {
        let outcome = queue.claim(&WorkerId::new("w0"), &[]).unwrap();
        let Some(job) = outcome.job() else { break };
        if job.stage_id == "stage-A" {
            queue.complete(&job.job_id, serde_json::json!({"ok": true})).unwrap();
        } else {
            queue.fail(&job.job_id, "wrong wave").unwrap();
            break;
        }
    }

    let a = queue.barrier_wait(Some("stage-A")).unwrap();
    assert!(a.complete);
    assert_eq!(a.total_jobs, 2);

    let b = queue.barrier_wait(Some("stage-B")).unwrap();
    assert!(!b.complete);
    assert_eq!(b.pending, 1);
}

/// Job state progression never leaves the automaton: a DONE job refuses
/// every further transition.
#[test]
fn terminal_states_are_frozen() {
    let sandbox = Sandbox::new();
    let queue = sandbox.queue("wine", "run-007", FakeClock::new());
    queue.init(QueueConfigPatch::default()).unwrap();
    queue.enqueue(vec![execute_spec("S01")]).unwrap();

    let job_id = queue.claim(&WorkerId::new("w0"), &[]).unwrap().job().unwrap().job_id.clone();
    queue.complete(&job_id, serde_json::json!({})).unwrap();

    assert!(queue.complete(&job_id, serde_json::json!({})).is_err());
    assert!(queue.fail(&job_id, "late failure").is_err());
}
