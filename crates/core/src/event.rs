// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed runtime events consumed by the auto-loop controller.
//!
//! The hosting runtime translates its hook callbacks into these variants
//! and sends them down a single channel; the controller is the only
//! consumer and owns all loop state.

use crate::report::SessionId;

/// One observation from the hosting runtime.
#[derive(Debug, Clone)]
pub enum LoopEvent {
    /// A tool finished executing on behalf of a tracked report.
    ToolAfter {
        report_title: String,
        /// Tool result text, scanned for terminal tags.
        tool_result: String,
    },
    /// An agent turn completed with this output text.
    AgentAfter { output: String },
    /// The runtime went idle or a message completed; a continuation may
    /// be due.
    IdleOrCompleted,
    /// A REPL bridge session ended.
    SessionEnd { session_id: SessionId },
    /// Host-initiated teardown of all loops and timers.
    Cleanup,
}
