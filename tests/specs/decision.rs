// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Decision-engine specs: conservative aggregation, two-gate admission,
//! and best-candidate selection over staged artifacts.

use super::prelude::*;
use gyoshu_core::{
    AutoLoopState, AutoLoopStateBuilder, CandidateBuilder, GoalGateStatus, LoopDecision,
    ReportTitle, TrustStatus, VerificationResultBuilder,
};
use gyoshu_engine::{
    best_candidate, collect_cycle_artifacts, next_decision, score_candidates, DecisionInputs,
    GoalTarget,
};

/// Decision inputs read from loop state, the way the controller builds
/// them, rather than hand-picked literals.
fn inputs_from(state: &AutoLoopState, trust_passed: bool, goal: GoalGateStatus) -> DecisionInputs {
    DecisionInputs {
        trust_passed,
        goal,
        attempts_left: state.attempts_left(),
        budget_ok: state.exceeded_budget(state.budgets.started_at).is_none(),
        rework_rounds: state.rework_rounds,
    }
}

/// Write one worker's candidate and its verifier verdicts into staging.
fn stage_worker(
    sandbox: &Sandbox,
    title: &ReportTitle,
    worker: &str,
    goal_progress: f64,
    primary_metric: f64,
    scores: &[u32],
) {
    let candidate = CandidateBuilder::default()
        .worker_id(worker)
        .goal_progress(goal_progress)
        .primary_metric(primary_metric)
        .build();
    let path = sandbox.project.candidate_path(title, 1, worker);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, serde_json::to_string_pretty(&candidate).unwrap()).unwrap();

    for (i, score) in scores.iter().enumerate() {
        let verdict = VerificationResultBuilder::default()
            .trust_score(*score)
            .status(TrustStatus::from_score(*score))
            .candidate_path(path.display().to_string())
            .build();
        let vpath = sandbox.project.verification_path(title, 1, &format!("{worker}-v{i}"));
        std::fs::create_dir_all(vpath.parent().unwrap()).unwrap();
        std::fs::write(vpath, serde_json::to_string_pretty(&verdict).unwrap()).unwrap();
    }
}

/// S7: A aggregates to min(85, 72) = 72 and fails the gate; B aggregates
/// to 82 and wins, with the reason naming B.
#[test]
fn s7_aggregation_and_selection() {
    let sandbox = Sandbox::new();
    let title = ReportTitle::new("wine").unwrap();
    stage_worker(&sandbox, &title, "A", 0.4, 0.9, &[85, 72]);
    stage_worker(&sandbox, &title, "B", 0.8, 0.7, &[88, 82]);

    let artifacts = collect_cycle_artifacts(&sandbox.project, &title, 1).unwrap();
    let scored = score_candidates(&artifacts);

    let a = scored.iter().find(|s| s.candidate.worker_id == "A").unwrap();
    let b = scored.iter().find(|s| s.candidate.worker_id == "B").unwrap();
    assert_eq!(a.trust.score, 72);
    assert!(!a.trust.passed);
    assert_eq!(b.trust.score, 82);
    assert!(b.trust.passed);

    let selection = best_candidate(&scored);
    let winner = selection.selected.unwrap();
    assert_eq!(winner.candidate.worker_id, "B");
    assert!(selection.reason.contains('B'), "reason: {}", selection.reason);
}

/// Trust pass + goal miss is PARTIAL progress (PIVOT), not success; goal
/// progress without trust is not acceptance either.
#[test]
fn two_gate_admission() {
    let sandbox = Sandbox::new();
    let title = ReportTitle::new("wine").unwrap();
    stage_worker(&sandbox, &title, "solid", 0.5, 0.6, &[90, 85]);

    let artifacts = collect_cycle_artifacts(&sandbox.project, &title, 1).unwrap();
    let scored = score_candidates(&artifacts);
    let entry = &scored[0];

    // Sound evidence, target unmet.
    let goal = GoalTarget::at_least("accuracy", 0.9);
    let goal_status = goal.evaluate(&entry.candidate);
    assert_eq!(goal_status, GoalGateStatus::NotMet);

    let state = AutoLoopStateBuilder::default().build();
    let decision = next_decision(inputs_from(&state, entry.trust.passed, goal_status));
    assert_eq!(decision, LoopDecision::Pivot);

    // High goal progress with poor trust reworks instead of completing,
    // until the accumulated rounds hit the bound.
    let mut reworked = AutoLoopStateBuilder::default().build();
    let decision = next_decision(inputs_from(&reworked, false, GoalGateStatus::Met));
    assert_eq!(decision, LoopDecision::Rework);

    for _ in 0..3 {
        reworked.advance(LoopDecision::Rework, "re-verify");
    }
    let decision = next_decision(inputs_from(&reworked, false, GoalGateStatus::Met));
    assert_eq!(decision, LoopDecision::Blocked);
}

/// The full path from staged metrics to COMPLETE.
#[test]
fn staged_metrics_drive_completion() {
    let sandbox = Sandbox::new();
    let title = ReportTitle::new("wine").unwrap();

    let mut metrics = std::collections::BTreeMap::new();
    metrics.insert("accuracy".to_string(), 0.94);
    let candidate = CandidateBuilder::default()
        .worker_id("0")
        .goal_progress(1.0)
        .metrics(metrics)
        .build();
    let path = sandbox.project.candidate_path(&title, 1, "0");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, serde_json::to_string_pretty(&candidate).unwrap()).unwrap();

    let verdict = VerificationResultBuilder::default()
        .trust_score(88)
        .candidate_path(path.display().to_string())
        .build();
    let vpath = sandbox.project.verification_path(&title, 1, "0-v0");
    std::fs::create_dir_all(vpath.parent().unwrap()).unwrap();
    std::fs::write(vpath, serde_json::to_string_pretty(&verdict).unwrap()).unwrap();

    let artifacts = collect_cycle_artifacts(&sandbox.project, &title, 1).unwrap();
    let scored = score_candidates(&artifacts);
    let entry = &scored[0];

    let goal = GoalTarget::at_least("accuracy", 0.9).evaluate(&entry.candidate);
    let state = AutoLoopStateBuilder::default().build();
    let decision = next_decision(inputs_from(&state, entry.trust.passed, goal));
    assert_eq!(decision, LoopDecision::Complete);
}
