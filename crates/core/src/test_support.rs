// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers and proptest strategies for tests in this and other crates.

#[cfg(feature = "proptest")]
pub mod strategies {
    use proptest::prelude::*;

    /// Safe single-segment identifiers (valid report titles and run ids).
    pub fn safe_segment() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{0,30}"
    }

    /// Hostile path inputs: traversal, separators, absolute paths.
    pub fn hostile_segment() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("..".to_string()),
            Just("../etc".to_string()),
            Just("a/../b".to_string()),
            Just("/absolute".to_string()),
            Just("back\\slash".to_string()),
            Just(".".to_string()),
            Just("".to_string()),
            Just(" padded ".to_string()),
            Just("trailing.".to_string()),
        ]
    }

    /// Trust scores across all three verdict bands.
    pub fn trust_score() -> impl Strategy<Value = u32> {
        0u32..=100
    }
}
