// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loop budgets: cycles, tool calls, wall time.
//!
//! The iteration cap lives on [`crate::AutoLoopState`]; it is checked last
//! in the budget precedence order.

use serde::{Deserialize, Serialize};

/// Which budget tripped. Ordering of the enum matches check precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetExceeded {
    ToolCalls,
    Cycles,
    WallTime,
    Iterations,
}

crate::simple_display! {
    BudgetExceeded {
        ToolCalls => "tool call budget exhausted",
        Cycles => "cycle budget exhausted",
        WallTime => "wall time budget exhausted",
        Iterations => "iteration budget exhausted",
    }
}

/// The budget quadruple bounding one auto-loop execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budgets {
    pub max_cycles: u32,
    pub current_cycle: u32,
    pub max_tool_calls: u32,
    pub total_tool_calls: u32,
    pub max_time_minutes: u64,
    /// Epoch milliseconds when the loop started.
    pub started_at: u64,
}

impl Budgets {
    pub fn new(max_cycles: u32, max_tool_calls: u32, max_time_minutes: u64, now_ms: u64) -> Self {
        Self {
            max_cycles,
            current_cycle: 1,
            max_tool_calls,
            total_tool_calls: 0,
            max_time_minutes,
            started_at: now_ms,
        }
    }

    /// Minutes elapsed since the loop started.
    pub fn elapsed_minutes(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.started_at) / 60_000
    }

    /// First tripped budget in precedence order:
    /// tool calls ≻ cycles ≻ wall time. Iterations are checked by the
    /// loop state after these.
    pub fn check(&self, now_ms: u64) -> Option<BudgetExceeded> {
        if self.total_tool_calls >= self.max_tool_calls {
            return Some(BudgetExceeded::ToolCalls);
        }
        if self.current_cycle >= self.max_cycles {
            return Some(BudgetExceeded::Cycles);
        }
        if self.elapsed_minutes(now_ms) >= self.max_time_minutes {
            return Some(BudgetExceeded::WallTime);
        }
        None
    }

    /// One-line summary for continuation messages and logs.
    pub fn summary(&self, now_ms: u64) -> String {
        format!(
            "cycle {}/{}, tool calls {}/{}, elapsed {}m/{}m",
            self.current_cycle,
            self.max_cycles,
            self.total_tool_calls,
            self.max_tool_calls,
            self.elapsed_minutes(now_ms),
            self.max_time_minutes,
        )
    }
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            max_cycles: 10,
            current_cycle: 1,
            max_tool_calls: 200,
            total_tool_calls: 0,
            max_time_minutes: 120,
            started_at: 0,
        }
    }
}

#[cfg(test)]
#[path = "budget_tests.rs"]
mod tests;
