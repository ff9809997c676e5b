// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conservative trust aggregation across adversarial verifiers.

use gyoshu_core::verification::TRUST_PASS_THRESHOLD;
use gyoshu_core::{TrustStatus, VerificationResult};
use serde::Serialize;

/// How strongly the verifier set agrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Consensus {
    /// Every verifier landed on VERIFIED, or every one on not-VERIFIED.
    Unanimous,
    /// Strictly more than half on one side.
    Majority,
    Split,
}

gyoshu_core::simple_display! {
    Consensus {
        Unanimous => "unanimous",
        Majority => "majority",
        Split => "split",
    }
}

/// Aggregated verdict over one candidate's verifier set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustAggregate {
    /// `min` over the individual scores. Adversarial reviewers are not
    /// averaged into approval.
    pub score: u32,
    pub passed: bool,
    pub consensus: Consensus,
    pub verifier_count: usize,
}

/// Aggregate a non-empty verifier set. Returns `None` for an empty set:
/// an unverified candidate has no trust standing at all.
pub fn aggregate(results: &[VerificationResult]) -> Option<TrustAggregate> {
    if results.is_empty() {
        return None;
    }

    let score = results.iter().map(|r| r.trust_score).min().unwrap_or(0);
    let verified = results.iter().filter(|r| r.status == TrustStatus::Verified).count();
    let total = results.len();

    let consensus = if verified == total || verified == 0 {
        Consensus::Unanimous
    } else if verified * 2 > total || (total - verified) * 2 > total {
        Consensus::Majority
    } else {
        Consensus::Split
    };

    Some(TrustAggregate {
        score,
        passed: score >= TRUST_PASS_THRESHOLD,
        consensus,
        verifier_count: total,
    })
}

#[cfg(test)]
#[path = "trust_tests.rs"]
mod tests;
