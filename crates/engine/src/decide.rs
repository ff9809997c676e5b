// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The next-decision table: Trust × Goal × attempts × budget.

use gyoshu_core::loop_state::MAX_REWORK_ROUNDS;
use gyoshu_core::{GoalGateStatus, LoopDecision};

/// Inputs to the decision table for one cycle.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInputs {
    /// Aggregated trust ≥ the pass threshold.
    pub trust_passed: bool,
    pub goal: GoalGateStatus,
    /// Another PIVOT attempt is allowed.
    pub attempts_left: bool,
    /// No budget axis has tripped.
    pub budget_ok: bool,
    /// Consecutive REWORK rounds already taken.
    pub rework_rounds: u32,
}

/// Map the gate outcomes onto the next loop decision.
///
/// Rows are evaluated in order; the first match wins:
///
/// | Trust | Goal    | Attempts | Budget | Decision         |
/// |-------|---------|----------|--------|------------------|
/// | pass  | MET     | any      | any    | COMPLETE         |
/// | pass  | NOT_MET | yes      | ok     | PIVOT            |
/// | pass  | NOT_MET | no       | ok     | BLOCKED          |
/// | fail  | any     | any      | ok     | REWORK (max 3)   |
/// | any   | any     | any      | spent  | BUDGET_EXHAUSTED |
/// | any   | BLOCKED | any      | any    | BLOCKED          |
/// | otherwise                           | CONTINUE         |
pub fn next_decision(inputs: DecisionInputs) -> LoopDecision {
    let DecisionInputs { trust_passed, goal, attempts_left, budget_ok, rework_rounds } = inputs;

    if trust_passed && goal == GoalGateStatus::Met {
        return LoopDecision::Complete;
    }
    if trust_passed && goal == GoalGateStatus::NotMet && budget_ok {
        return if attempts_left { LoopDecision::Pivot } else { LoopDecision::Blocked };
    }
    if !trust_passed && budget_ok {
        return if rework_rounds < MAX_REWORK_ROUNDS {
            LoopDecision::Rework
        } else {
            LoopDecision::Blocked
        };
    }
    if !budget_ok {
        return LoopDecision::BudgetExhausted;
    }
    if goal == GoalGateStatus::Blocked {
        return LoopDecision::Blocked;
    }
    LoopDecision::Continue
}

#[cfg(test)]
#[path = "decide_tests.rs"]
mod tests;
