// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fresh_state_validates() {
    let state = AutoLoopStateBuilder::default().build();
    assert!(state.active);
    assert_eq!(state.iteration, 1);
    state.validate().unwrap();
}

#[test]
fn iteration_out_of_range_is_invalid() {
    let mut state = AutoLoopStateBuilder::default().max_iterations(3).build();
    state.iteration = 4;
    assert_eq!(
        state.validate().unwrap_err(),
        LoopStateError::IterationRange { iteration: 4, max: 3 }
    );
}

#[test]
fn tool_calls_over_cap_are_invalid() {
    let mut state = AutoLoopStateBuilder::default().build();
    state.budgets.total_tool_calls = state.budgets.max_tool_calls + 1;
    assert!(matches!(state.validate(), Err(LoopStateError::ToolCallRange { .. })));
}

#[test]
fn advance_increments_iteration_and_cycle() {
    let mut state = AutoLoopStateBuilder::default().build();
    state.advance(LoopDecision::Continue, "tighten the model");

    assert_eq!(state.iteration, 2);
    assert_eq!(state.budgets.current_cycle, 2);
    assert_eq!(state.attempt_number, 1);
    assert_eq!(state.last_decision, Some(LoopDecision::Continue));
    assert_eq!(state.next_objective, "tighten the model");
}

#[test]
fn pivot_increments_attempt_number() {
    let mut state = AutoLoopStateBuilder::default().build();
    state.advance(LoopDecision::Pivot, "try a different feature set");
    assert_eq!(state.attempt_number, 2);
}

#[test]
fn rework_rounds_accumulate_only_while_consecutive() {
    let mut state = AutoLoopStateBuilder::default().build();

    state.advance(LoopDecision::Rework, "re-verify the evidence");
    state.advance(LoopDecision::Rework, "re-verify again");
    assert_eq!(state.rework_rounds, 2);

    // Any other decision breaks the streak.
    state.advance(LoopDecision::Continue, "move on");
    assert_eq!(state.rework_rounds, 0);

    state.advance(LoopDecision::Rework, "back to rework");
    assert_eq!(state.rework_rounds, 1);
}

#[test]
fn rework_rounds_over_bound_are_invalid() {
    let mut state = AutoLoopStateBuilder::default().build();
    state.rework_rounds = MAX_REWORK_ROUNDS + 1;
    assert_eq!(
        state.validate().unwrap_err(),
        LoopStateError::ReworkRange { rounds: MAX_REWORK_ROUNDS + 1, max: MAX_REWORK_ROUNDS }
    );
}

#[test]
fn exhaust_is_terminal_and_sticky() {
    let mut state = AutoLoopStateBuilder::default().build();
    state.exhaust();

    assert!(!state.active);
    assert_eq!(state.last_decision, Some(LoopDecision::BudgetExhausted));
}

#[test]
fn iteration_cap_checked_after_budgets() {
    let mut state = AutoLoopStateBuilder::default().max_iterations(2).build();
    state.iteration = 2;
    // No budget axis tripped; the iteration cap is the last check.
    assert_eq!(state.exceeded_budget(0), Some(BudgetExceeded::Iterations));

    state.budgets.total_tool_calls = state.budgets.max_tool_calls;
    assert_eq!(state.exceeded_budget(0), Some(BudgetExceeded::ToolCalls));
}

#[test]
fn attempts_left_respects_cap() {
    let mut state = AutoLoopStateBuilder::default().max_attempts(2).build();
    assert!(state.attempts_left());
    state.attempt_number = 2;
    assert!(!state.attempts_left());
}

#[yare::parameterized(
    complete = { LoopDecision::Complete, true },
    blocked = { LoopDecision::Blocked, true },
    budget = { LoopDecision::BudgetExhausted, true },
    cont = { LoopDecision::Continue, false },
    pivot = { LoopDecision::Pivot, false },
    rework = { LoopDecision::Rework, false },
)]
fn terminal_decisions(decision: LoopDecision, terminal: bool) {
    assert_eq!(decision.is_terminal(), terminal);
}

#[test]
fn wire_format_matches_contract() {
    let state = AutoLoopStateBuilder::default()
        .last_decision(LoopDecision::BudgetExhausted)
        .goal_gate_status(GoalGateStatus::NotMet)
        .build();
    let json = serde_json::to_value(&state).unwrap();

    assert_eq!(json["reportTitle"], "wine");
    assert_eq!(json["researchSessionID"], "sess-test");
    assert_eq!(json["lastDecision"], "BUDGET_EXHAUSTED");
    assert_eq!(json["goalGateStatus"], "NOT_MET");
    assert_eq!(json["reworkRounds"], 0);
    assert!(json["budgets"]["maxCycles"].is_number());
}

#[test]
fn unknown_fields_survive_round_trip() {
    let mut json = serde_json::to_value(AutoLoopStateBuilder::default().build()).unwrap();
    json["schemaHint"] = serde_json::json!("v2");

    let parsed: AutoLoopState = serde_json::from_value(json).unwrap();
    let back = serde_json::to_value(&parsed).unwrap();
    assert_eq!(back["schemaHint"], "v2");
}
