// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auto-loop specs: terminal-tag short-circuit, injection idempotence,
//! and budget exhaustion end to end.

use super::prelude::*;
use gyoshu_core::{
    AutoLoopStateBuilder, FakeClock, GoalGateStatus, LoopDecision, LoopEvent, ReportTitle,
    TrustStatus, VerificationResultBuilder,
};
use gyoshu_engine::{aggregate, AutoLoopConfig, AutoLoopController, RecordingTransport};
use gyoshu_storage::{BridgeRegistry, LoopStore};

struct LoopFixture {
    sandbox: Sandbox,
    controller: AutoLoopController<RecordingTransport, FakeClock>,
    transport: RecordingTransport,
    clock: FakeClock,
}

fn loop_fixture() -> LoopFixture {
    let sandbox = Sandbox::new();
    let store = LoopStore::new(sandbox.project.clone(), sandbox.locks.clone());
    let bridges = BridgeRegistry::new(sandbox.runtime.clone(), sandbox.locks.clone());
    let transport = RecordingTransport::new();
    let clock = FakeClock::new();
    let controller = AutoLoopController::new(
        store,
        bridges,
        transport.clone(),
        clock.clone(),
        AutoLoopConfig::default(),
    );
    LoopFixture { sandbox, controller, transport, clock }
}

fn store(fx: &LoopFixture) -> LoopStore {
    LoopStore::new(fx.sandbox.project.clone(), fx.sandbox.locks.clone())
}

/// S6: a terminal tag naming the loop's report deactivates it with no
/// continuation and clears the in-memory indices.
#[tokio::test]
async fn s6_terminal_tag_short_circuits() {
    let mut fx = loop_fixture();
    let state = AutoLoopStateBuilder::default().build();
    let title = state.report_title.clone();
    fx.controller.start_loop(state).unwrap();

    fx.controller
        .handle_event(LoopEvent::AgentAfter {
            output: "the wine study hit its target \
                     <promise>GYOSHU_AUTO_COMPLETE</promise>"
                .into(),
        })
        .await
        .unwrap();

    assert!(fx.controller.loop_state(&title).is_none(), "in-memory indices cleared");
    assert_eq!(fx.transport.sent_count(), 0, "no continuation sent");

    let on_disk = store(&fx).load(&title).unwrap().unwrap();
    assert!(!on_disk.active);
    assert_eq!(on_disk.last_decision, Some(LoopDecision::Complete));
}

/// S10 (injection idempotence): the same output observed twice within the
/// cooldown produces exactly one injection.
#[tokio::test]
async fn injection_is_idempotent_within_cooldown() {
    let mut fx = loop_fixture();
    fx.controller.start_loop(AutoLoopStateBuilder::default().build()).unwrap();

    let output = "wine: baseline fitted, r2=0.61".to_string();
    fx.controller
        .handle_event(LoopEvent::AgentAfter { output: output.clone() })
        .await
        .unwrap();
    fx.clock.advance_ms(100);
    fx.controller.handle_event(LoopEvent::AgentAfter { output }).await.unwrap();

    assert_eq!(fx.transport.sent_count(), 1);
}

/// Budget exhaustion deactivates durably: the terminal message carries
/// the tag, and the state on disk never reactivates.
#[tokio::test]
async fn budget_exhaustion_is_terminal_and_sticky() {
    let mut fx = loop_fixture();
    let mut state = AutoLoopStateBuilder::default().build();
    state.budgets.max_tool_calls = 1;
    let title = state.report_title.clone();
    fx.controller.start_loop(state).unwrap();

    fx.controller
        .handle_event(LoopEvent::ToolAfter {
            report_title: "wine".into(),
            tool_result: "ran python".into(),
        })
        .await
        .unwrap();

    let sent = fx.transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("<promise>GYOSHU_AUTO_BUDGET_EXHAUSTED</promise>"));

    let on_disk = store(&fx).load(&title).unwrap().unwrap();
    assert!(!on_disk.active);
    assert_eq!(on_disk.last_decision, Some(LoopDecision::BudgetExhausted));

    // A later event for the same report is ignored; the loop stays down.
    fx.controller
        .handle_event(LoopEvent::AgentAfter { output: "wine: more output".into() })
        .await
        .unwrap();
    assert_eq!(fx.transport.sent_count(), 1);
}

/// Budget counters are monotonic across the debounce boundary.
#[tokio::test]
async fn tool_call_counter_is_monotonic() {
    let mut fx = loop_fixture();
    let state = AutoLoopStateBuilder::default().build();
    let title = state.report_title.clone();
    fx.controller.start_loop(state).unwrap();

    let mut last = 0;
    for _ in 0..5 {
        fx.controller
            .handle_event(LoopEvent::ToolAfter {
                report_title: "wine".into(),
                tool_result: "ok".into(),
            })
            .await
            .unwrap();
        let current = fx.controller.loop_state(&title).unwrap().budgets.total_tool_calls;
        assert!(current >= last);
        last = current;
    }
    assert_eq!(last, 5);
}

/// A terminal loop cannot be restarted except through create-new.
#[tokio::test]
async fn terminal_state_requires_explicit_create_new() {
    let mut fx = loop_fixture();
    let state = AutoLoopStateBuilder::default().build();
    let title = state.report_title.clone();
    fx.controller.start_loop(state.clone()).unwrap();
    fx.controller
        .record_decision(&title, LoopDecision::Complete, Some(90), None, "")
        .unwrap();

    // Plain save of an active state is refused by the store...
    let err = store(&fx).save(&AutoLoopStateBuilder::default().build()).unwrap_err();
    assert!(matches!(err, gyoshu_storage::LoopStoreError::Revived(_)), "got {err:?}");

    // ...while an explicit new loop is fine.
    fx.controller.start_loop(AutoLoopStateBuilder::default().build()).unwrap();
    assert!(fx.controller.loop_state(&title).is_some());
}

/// The REWORK bound is backed by durable state: consecutive failed
/// verification cycles accumulate on disk until the loop blocks.
#[tokio::test]
async fn rework_bound_is_durable() {
    let mut fx = loop_fixture();
    let state = AutoLoopStateBuilder::default().build();
    let title = state.report_title.clone();
    fx.controller.start_loop(state).unwrap();

    // An adversarial verifier set whose skeptic drags the aggregate under
    // the trust gate.
    let verdicts: Vec<_> = [85u32, 55]
        .into_iter()
        .map(|score| {
            VerificationResultBuilder::default()
                .trust_score(score)
                .status(TrustStatus::from_score(score))
                .build()
        })
        .collect();
    let failing = aggregate(&verdicts).unwrap();
    assert!(!failing.passed);

    for round in 1..=3u32 {
        let decision = fx
            .controller
            .decide_cycle(&title, Some(&failing), GoalGateStatus::NotMet, "re-verify evidence")
            .unwrap();
        assert_eq!(decision, LoopDecision::Rework);
        assert_eq!(store(&fx).load(&title).unwrap().unwrap().rework_rounds, round);
    }

    let decision = fx
        .controller
        .decide_cycle(&title, Some(&failing), GoalGateStatus::NotMet, "re-verify evidence")
        .unwrap();
    assert_eq!(decision, LoopDecision::Blocked);

    let on_disk = store(&fx).load(&title).unwrap().unwrap();
    assert!(!on_disk.active);
    assert_eq!(on_disk.rework_rounds, 3);
    assert_eq!(on_disk.last_decision, Some(LoopDecision::Blocked));
}

/// The continuation message is built from persisted state fields.
#[tokio::test]
async fn continuation_reflects_loop_state() {
    let mut fx = loop_fixture();
    let mut state = AutoLoopStateBuilder::default().build();
    state.next_objective = "probe feature interactions".into();
    fx.controller.start_loop(state).unwrap();

    fx.controller
        .handle_event(LoopEvent::AgentAfter { output: "wine: cycle output".into() })
        .await
        .unwrap();

    let sent = fx.transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("probe feature interactions"));
    assert!(sent[0].1.contains("iteration 1/10"));
}

/// ReportTitle is the controller's key: two loops stay independent.
#[tokio::test]
async fn loops_are_isolated_per_report() {
    let mut fx = loop_fixture();
    fx.controller.start_loop(AutoLoopStateBuilder::default().build()).unwrap();
    let mut churn = AutoLoopStateBuilder::default().build();
    churn.report_title = ReportTitle::new("churn").unwrap();
    fx.controller.start_loop(churn).unwrap();

    fx.controller
        .handle_event(LoopEvent::AgentAfter {
            output: "churn is finished <promise>GYOSHU_AUTO_COMPLETE</promise>".into(),
        })
        .await
        .unwrap();

    assert!(fx.controller.loop_state(&ReportTitle::new("churn").unwrap()).is_none());
    assert!(fx.controller.loop_state(&ReportTitle::new("wine").unwrap()).is_some());
}
