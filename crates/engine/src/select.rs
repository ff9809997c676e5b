// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-candidate selection.

use crate::trust::TrustAggregate;
use gyoshu_core::verification::TRUST_PASS_THRESHOLD;
use gyoshu_core::Candidate;
use serde::Serialize;
use std::cmp::Ordering;

/// A candidate paired with its aggregated trust.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub trust: TrustAggregate,
}

/// Outcome of selection: a borrowed winner, or none with the reason.
#[derive(Debug)]
pub struct Selection<'a> {
    pub selected: Option<&'a ScoredCandidate>,
    pub reason: String,
}

/// Pick the best candidate among those whose aggregated trust passes.
///
/// Ranking is `goalProgress` descending, tie-broken by `primaryMetric`
/// descending; remaining ties keep the earlier input element, so the
/// result is deterministic. The input is only borrowed; order and
/// identity are untouched. With no qualifying candidate the reason names
/// the failing gate and the best score observed.
pub fn best_candidate(candidates: &[ScoredCandidate]) -> Selection<'_> {
    if candidates.is_empty() {
        return Selection { selected: None, reason: "no candidates to select from".to_string() };
    }

    let mut best: Option<&ScoredCandidate> = None;
    for entry in candidates {
        if !entry.trust.passed {
            continue;
        }
        best = match best {
            None => Some(entry),
            Some(current) => {
                if ranks_higher(entry, current) {
                    Some(entry)
                } else {
                    Some(current)
                }
            }
        };
    }

    match best {
        Some(winner) => Selection {
            selected: Some(winner),
            reason: format!(
                "worker '{}' leads with goal progress {:.2} at trust {}",
                winner.candidate.worker_id,
                winner.candidate.goal_progress.unwrap_or(0.0),
                winner.trust.score,
            ),
        },
        None => {
            let best_score = candidates.iter().map(|c| c.trust.score).max().unwrap_or(0);
            Selection {
                selected: None,
                reason: format!(
                    "trust gate failed for all {} candidates; best aggregated score {} < {}",
                    candidates.len(),
                    best_score,
                    TRUST_PASS_THRESHOLD,
                ),
            }
        }
    }
}

/// Strictly-better comparison; equal ranks keep the incumbent.
fn ranks_higher(a: &ScoredCandidate, b: &ScoredCandidate) -> bool {
    match compare_f64(a.candidate.goal_progress, b.candidate.goal_progress) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => {
            compare_f64(a.candidate.primary_metric, b.candidate.primary_metric)
                == Ordering::Greater
        }
    }
}

/// Total order on optional metrics: absent ranks lowest, NaN next.
fn compare_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
#[path = "select_tests.rs"]
mod tests;
