// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The goal gate: a binary predicate over the achieved metric.
//!
//! Kept separate from trust. A candidate may carry sound evidence (trust
//! passes) while the research target itself is unmet; that is PARTIAL
//! progress, not success. The converse, high goal progress on untrusted
//! evidence, is not acceptance either.

use gyoshu_core::{Candidate, GoalGateStatus};
use serde::{Deserialize, Serialize};

/// Which way the target metric must move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalDirection {
    /// Achieved ≥ target (accuracy, R², recall, …).
    AtLeast,
    /// Achieved ≤ target (error, loss, latency, …).
    AtMost,
}

/// The target stated in the research goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalTarget {
    /// Metric name as stage workers report it.
    pub metric: String,
    pub target: f64,
    pub direction: GoalDirection,
}

impl GoalTarget {
    pub fn at_least(metric: impl Into<String>, target: f64) -> Self {
        Self { metric: metric.into(), target, direction: GoalDirection::AtLeast }
    }

    pub fn at_most(metric: impl Into<String>, target: f64) -> Self {
        Self { metric: metric.into(), target, direction: GoalDirection::AtMost }
    }

    /// Did the candidate's achieved metric meet the target?
    ///
    /// A candidate without the metric has not demonstrated the goal:
    /// NOT_MET, never an error. BLOCKED is an external signal (the agent
    /// reporting the goal unreachable), not something this predicate
    /// derives.
    pub fn evaluate(&self, candidate: &Candidate) -> GoalGateStatus {
        let Some(achieved) = candidate.metric(&self.metric) else {
            return GoalGateStatus::NotMet;
        };
        let met = match self.direction {
            GoalDirection::AtLeast => achieved >= self.target,
            GoalDirection::AtMost => achieved <= self.target,
        };
        if met {
            GoalGateStatus::Met
        } else {
            GoalGateStatus::NotMet
        }
    }

    /// Evaluate an optional candidate; absence is NOT_MET.
    pub fn evaluate_opt(&self, candidate: Option<&Candidate>) -> GoalGateStatus {
        candidate.map_or(GoalGateStatus::NotMet, |c| self.evaluate(c))
    }
}

#[cfg(test)]
#[path = "goal_tests.rs"]
mod tests;
