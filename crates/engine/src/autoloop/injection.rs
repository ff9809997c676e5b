// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Continuation message construction.
//!
//! One message per cycle, built entirely from persisted state so a
//! restarted controller produces the same continuation. The message
//! carries the loop's standing rules; it never embeds a terminal tag,
//! since those belong exclusively to terminal transitions.

use gyoshu_core::AutoLoopState;
use std::fmt::Write;

/// Build the continuation message for the next cycle.
pub fn build_continuation(state: &AutoLoopState, now_ms: u64) -> String {
    let mut msg = String::with_capacity(512);

    let _ = writeln!(
        msg,
        "Continue the research loop for report '{}' (iteration {}/{}).",
        state.report_title, state.iteration, state.max_iterations,
    );

    if let Some(decision) = state.last_decision {
        let _ = writeln!(msg, "Last decision: {}.", decision);
    }
    if let Some(trust) = state.trust_score {
        let _ = writeln!(msg, "Aggregated trust score: {}.", trust);
    }
    if let Some(goal) = state.goal_gate_status {
        let _ = writeln!(msg, "Goal gate: {}.", goal);
    }

    let _ = writeln!(msg, "Budget: {}.", state.budgets.summary(now_ms));
    let _ = writeln!(
        msg,
        "Attempt {}/{}. Next objective: {}",
        state.attempt_number, state.max_attempts, state.next_objective,
    );

    msg.push_str(
        "\nRules: work autonomously toward the objective; report metrics and \
         findings with the standard output markers; when the goal is met, \
         blocked, or the budget is spent, say so with the matching promise tag \
         and stop.\n",
    );

    msg
}

#[cfg(test)]
#[path = "injection_tests.rs"]
mod tests;
