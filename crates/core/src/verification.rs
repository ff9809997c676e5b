// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adversarial verification verdicts.

use serde::{Deserialize, Serialize};

/// Trust score at or above which a verification is VERIFIED,
/// and at or above which the aggregate trust gate passes.
pub const TRUST_PASS_THRESHOLD: u32 = 80;

/// Lower bound of the PARTIAL band.
pub const TRUST_PARTIAL_THRESHOLD: u32 = 60;

/// Verdict status of a single verification.
///
/// The status vocabulary is canonical. Verifiers that report the outcome
/// vocabulary (`passed`, `failed`, `rework_requested`) are mapped on input
/// by the deserializer aliases below; nothing emits the outcome form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustStatus {
    #[serde(alias = "passed")]
    Verified,
    #[serde(alias = "rework_requested")]
    Partial,
    #[serde(alias = "failed")]
    Rejected,
}

impl TrustStatus {
    /// Classify a trust score: VERIFIED ≥ 80, PARTIAL 60–79, else REJECTED.
    pub fn from_score(score: u32) -> Self {
        if score >= TRUST_PASS_THRESHOLD {
            TrustStatus::Verified
        } else if score >= TRUST_PARTIAL_THRESHOLD {
            TrustStatus::Partial
        } else {
            TrustStatus::Rejected
        }
    }
}

crate::simple_display! {
    TrustStatus {
        Verified => "VERIFIED",
        Partial => "PARTIAL",
        Rejected => "REJECTED",
    }
}

/// One verifier's verdict over one candidate, written as a sibling artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub job_id: String,
    pub candidate_path: String,
    /// 0–100.
    pub trust_score: u32,
    pub status: TrustStatus,
    #[serde(default)]
    pub findings_verified: u32,
    #[serde(default)]
    pub findings_rejected: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Unknown fields from newer writers, preserved across read-modify-write.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl VerificationResult {
    /// Whether the recorded status agrees with the recorded score.
    pub fn status_consistent(&self) -> bool {
        self.status == TrustStatus::from_score(self.trust_score)
    }
}

crate::builder! {
    pub struct VerificationResultBuilder => VerificationResult {
        into {
            job_id: String = "job-verify-1",
            candidate_path: String = "staging/cycle-01/worker-0/candidate.json",
        }
        set {
            trust_score: u32 = 85,
            status: TrustStatus = TrustStatus::Verified,
            findings_verified: u32 = 3,
            findings_rejected: u32 = 0,
        }
        option {
            verification_time: String = None,
            duration_ms: u64 = None,
        }
        computed {
            extra: serde_json::Map<String, serde_json::Value> = serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
#[path = "verification_tests.rs"]
mod tests;
