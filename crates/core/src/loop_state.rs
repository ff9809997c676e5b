// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable auto-loop state and the loop decision vocabulary.

use crate::budget::{BudgetExceeded, Budgets};
use crate::report::{ReportTitle, RunId, SessionId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bound on consecutive REWORK rounds before the loop escalates.
pub const MAX_REWORK_ROUNDS: u32 = 3;

/// The decision steering the next cycle of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopDecision {
    Continue,
    Pivot,
    Rework,
    Complete,
    Blocked,
    BudgetExhausted,
}

impl LoopDecision {
    /// COMPLETE, BLOCKED, and BUDGET_EXHAUSTED end the loop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoopDecision::Complete | LoopDecision::Blocked | LoopDecision::BudgetExhausted
        )
    }
}

crate::simple_display! {
    LoopDecision {
        Continue => "CONTINUE",
        Pivot => "PIVOT",
        Rework => "REWORK",
        Complete => "COMPLETE",
        Blocked => "BLOCKED",
        BudgetExhausted => "BUDGET_EXHAUSTED",
    }
}

/// Outcome of the goal gate: did the achieved metric meet the target?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalGateStatus {
    Met,
    NotMet,
    Blocked,
}

crate::simple_display! {
    GoalGateStatus {
        Met => "MET",
        NotMet => "NOT_MET",
        Blocked => "BLOCKED",
    }
}

/// Invariant violations detected when loading or mutating loop state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoopStateError {
    #[error("iteration {iteration} outside 1..={max}")]
    IterationRange { iteration: u32, max: u32 },
    #[error("cycle {cycle} outside 1..={max}")]
    CycleRange { cycle: u32, max: u32 },
    #[error("tool calls {calls} exceed cap {max}")]
    ToolCallRange { calls: u32, max: u32 },
    #[error("attempt {attempt} outside 1..={max}")]
    AttemptRange { attempt: u32, max: u32 },
    #[error("rework rounds {rounds} exceed bound {max}")]
    ReworkRange { rounds: u32, max: u32 },
    #[error("state is terminal (active = false) and cannot be revived")]
    Terminal,
}

/// Durable state of one auto-loop, one per report.
///
/// Persisted at `reports/{reportTitle}/auto/loop-state.json`. Once
/// `active` goes false the state is terminal; only an explicit create-new
/// may start another loop for the title.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoLoopState {
    pub active: bool,
    pub iteration: u32,
    pub max_iterations: u32,
    pub report_title: ReportTitle,
    pub run_id: RunId,
    #[serde(rename = "researchSessionID")]
    pub research_session_id: SessionId,
    pub budgets: Budgets,
    pub attempt_number: u32,
    pub max_attempts: u32,
    /// Consecutive REWORK rounds taken since the last non-REWORK decision.
    /// Durable, so the bound holds across controller restarts.
    #[serde(default)]
    pub rework_rounds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_decision: Option<LoopDecision>,
    pub next_objective: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_gate_status: Option<GoalGateStatus>,
    /// Unknown fields from newer writers, preserved across read-modify-write.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AutoLoopState {
    /// Fresh state for a newly started loop.
    pub fn start(
        report_title: ReportTitle,
        run_id: RunId,
        research_session_id: SessionId,
        max_iterations: u32,
        max_attempts: u32,
        budgets: Budgets,
        next_objective: impl Into<String>,
    ) -> Self {
        Self {
            active: true,
            iteration: 1,
            max_iterations,
            report_title,
            run_id,
            research_session_id,
            budgets,
            attempt_number: 1,
            max_attempts,
            rework_rounds: 0,
            last_decision: None,
            next_objective: next_objective.into(),
            trust_score: None,
            goal_gate_status: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Check the documented range invariants.
    pub fn validate(&self) -> Result<(), LoopStateError> {
        if self.iteration < 1 || self.iteration > self.max_iterations {
            return Err(LoopStateError::IterationRange {
                iteration: self.iteration,
                max: self.max_iterations,
            });
        }
        let b = &self.budgets;
        if b.current_cycle < 1 || b.current_cycle > b.max_cycles {
            return Err(LoopStateError::CycleRange { cycle: b.current_cycle, max: b.max_cycles });
        }
        if b.total_tool_calls > b.max_tool_calls {
            return Err(LoopStateError::ToolCallRange {
                calls: b.total_tool_calls,
                max: b.max_tool_calls,
            });
        }
        if self.attempt_number < 1 || self.attempt_number > self.max_attempts {
            return Err(LoopStateError::AttemptRange {
                attempt: self.attempt_number,
                max: self.max_attempts,
            });
        }
        if self.rework_rounds > MAX_REWORK_ROUNDS {
            return Err(LoopStateError::ReworkRange {
                rounds: self.rework_rounds,
                max: MAX_REWORK_ROUNDS,
            });
        }
        Ok(())
    }

    /// Full budget check in precedence order, iterations last.
    pub fn exceeded_budget(&self, now_ms: u64) -> Option<BudgetExceeded> {
        if let Some(hit) = self.budgets.check(now_ms) {
            return Some(hit);
        }
        if self.iteration >= self.max_iterations {
            return Some(BudgetExceeded::Iterations);
        }
        None
    }

    /// Whether another PIVOT attempt is allowed.
    pub fn attempts_left(&self) -> bool {
        self.attempt_number < self.max_attempts
    }

    /// Transition into the terminal budget-exhausted state.
    pub fn exhaust(&mut self) {
        self.active = false;
        self.last_decision = Some(LoopDecision::BudgetExhausted);
    }

    /// Deactivate with a terminal decision (COMPLETE or BLOCKED).
    pub fn finish(&mut self, decision: LoopDecision) {
        debug_assert!(decision.is_terminal());
        self.active = false;
        self.last_decision = Some(decision);
    }

    /// Advance to the next iteration and cycle after a non-terminal decision.
    ///
    /// REWORK accumulates its round counter; any other decision resets it,
    /// so only consecutive rework cycles count against the bound.
    pub fn advance(&mut self, decision: LoopDecision, next_objective: impl Into<String>) {
        debug_assert!(!decision.is_terminal());
        self.iteration += 1;
        self.budgets.current_cycle += 1;
        if decision == LoopDecision::Pivot {
            self.attempt_number += 1;
        }
        if decision == LoopDecision::Rework {
            self.rework_rounds += 1;
        } else {
            self.rework_rounds = 0;
        }
        self.last_decision = Some(decision);
        self.next_objective = next_objective.into();
    }
}

crate::builder! {
    pub struct AutoLoopStateBuilder => AutoLoopState {
        into {
            next_objective: String = "establish baseline",
        }
        set {
            active: bool = true,
            iteration: u32 = 1,
            max_iterations: u32 = 10,
            attempt_number: u32 = 1,
            max_attempts: u32 = 3,
            rework_rounds: u32 = 0,
            budgets: Budgets = Budgets::default(),
        }
        option {
            last_decision: LoopDecision = None,
            trust_score: u32 = None,
            goal_gate_status: GoalGateStatus = None,
        }
        computed {
            report_title: ReportTitle = ReportTitle::for_tests("wine"),
            run_id: RunId = RunId::for_tests("run-001"),
            research_session_id: SessionId = SessionId::new("sess-test"),
            extra: serde_json::Map<String, serde_json::Value> = serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
#[path = "loop_state_tests.rs"]
mod tests;
