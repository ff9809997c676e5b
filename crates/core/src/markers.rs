// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Marker protocol: plain-text markers embedded in stage and verifier output.
//!
//! Stage workers emit `[MARKER]`-prefixed lines; verifiers additionally emit
//! a `Trust Score:` / `Status:` pair and a single-line JSON summary. The
//! decision engine consumes both.

use crate::verification::TrustStatus;
use serde::{Deserialize, Serialize};

/// Aggregate kind for a cross-validation metric marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CvAggregate {
    Mean,
    Std,
}

/// One parsed marker line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "marker")]
pub enum Marker {
    /// `[STAT:ci]`, `[STAT:effect_size]`, `[STAT:estimate]`, …
    Stat { kind: String, text: String },
    /// `[METRIC:<name>] <value>`
    Metric { name: String, value: Option<f64> },
    /// `[METRIC:baseline_<name>] <value>`
    BaselineMetric { name: String, value: Option<f64> },
    /// `[METRIC:cv_<name>_mean]` / `[METRIC:cv_<name>_std]`
    CvMetric { name: String, agg: CvAggregate, value: Option<f64> },
    /// `[FINDING] <text>`
    Finding { text: String },
    /// `[SO_WHAT] <text>`
    SoWhat { text: String },
    /// `[LIMITATION] <text>`
    Limitation { text: String },
    /// `[CITATION:<kind>] <text>`
    Citation { kind: String, text: String },
    /// `[FIGURE:<type>:path=…:dpi=…:lib=…]`
    Figure { figure_type: String, path: String, dpi: Option<u32>, lib: Option<String> },
}

/// The single-line JSON summary a verifier prints after its markers.
///
/// Key casing follows the wire contract: `trustScore` is camelCase while
/// the findings counters are snake_case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifierSummary {
    #[serde(rename = "trustScore")]
    pub trust_score: u32,
    pub status: TrustStatus,
    #[serde(default)]
    pub challenges: Vec<String>,
    #[serde(default)]
    pub findings_verified: u32,
    #[serde(default)]
    pub findings_rejected: u32,
}

/// Parse every marker line in a block of worker output.
///
/// Non-marker lines are skipped; malformed markers are skipped rather than
/// failing the whole parse, since worker output is free text around the
/// protocol lines.
pub fn parse_markers(output: &str) -> Vec<Marker> {
    output.lines().filter_map(parse_marker_line).collect()
}

fn parse_marker_line(line: &str) -> Option<Marker> {
    let line = line.trim();
    let rest = line.strip_prefix('[')?;
    let close = rest.find(']')?;
    let head = &rest[..close];
    let text = rest[close + 1..].trim().to_string();

    let (tag, arg) = match head.find(':') {
        Some(i) => (&head[..i], Some(&head[i + 1..])),
        None => (head, None),
    };

    match (tag, arg) {
        ("STAT", Some(kind)) if !kind.is_empty() => {
            Some(Marker::Stat { kind: kind.to_string(), text })
        }
        ("METRIC", Some(name)) if !name.is_empty() => Some(parse_metric(name, &text)),
        ("FINDING", None) => Some(Marker::Finding { text }),
        ("SO_WHAT", None) => Some(Marker::SoWhat { text }),
        ("LIMITATION", None) => Some(Marker::Limitation { text }),
        ("CITATION", Some(kind)) if !kind.is_empty() => {
            Some(Marker::Citation { kind: kind.to_string(), text })
        }
        ("FIGURE", Some(spec)) => parse_figure(spec),
        _ => None,
    }
}

/// Split a metric marker into plain, baseline, and cross-validation forms.
fn parse_metric(name: &str, text: &str) -> Marker {
    let value = leading_number(text);

    if let Some(base) = name.strip_prefix("baseline_") {
        return Marker::BaselineMetric { name: base.to_string(), value };
    }
    if let Some(cv) = name.strip_prefix("cv_") {
        if let Some(base) = cv.strip_suffix("_mean") {
            return Marker::CvMetric { name: base.to_string(), agg: CvAggregate::Mean, value };
        }
        if let Some(base) = cv.strip_suffix("_std") {
            return Marker::CvMetric { name: base.to_string(), agg: CvAggregate::Std, value };
        }
    }
    Marker::Metric { name: name.to_string(), value }
}

/// `<type>:path=…:dpi=…:lib=…`; path is required, dpi/lib optional.
fn parse_figure(spec: &str) -> Option<Marker> {
    let mut parts = spec.split(':');
    let figure_type = parts.next()?.to_string();
    if figure_type.is_empty() {
        return None;
    }

    let mut path = None;
    let mut dpi = None;
    let mut lib = None;
    for part in parts {
        if let Some(v) = part.strip_prefix("path=") {
            path = Some(v.to_string());
        } else if let Some(v) = part.strip_prefix("dpi=") {
            dpi = v.parse().ok();
        } else if let Some(v) = part.strip_prefix("lib=") {
            lib = Some(v.to_string());
        }
    }

    Some(Marker::Figure { figure_type, path: path?, dpi, lib })
}

/// Parse the first whitespace-delimited token as a number, tolerating
/// `name = value` and `name: value` forms.
fn leading_number(text: &str) -> Option<f64> {
    text.split_whitespace().find_map(|tok| {
        let tok = tok.trim_start_matches(['=', ':']);
        if tok.is_empty() {
            None
        } else {
            tok.parse().ok()
        }
    })
}

/// Extract a verifier's terminal verdict from its full output.
///
/// The single-line JSON summary is authoritative when present; otherwise
/// the `Trust Score:` / `Status:` line pair is assembled into a summary
/// with empty challenge and findings counters.
pub fn parse_verifier_output(output: &str) -> Option<VerifierSummary> {
    for line in output.lines() {
        let line = line.trim();
        if line.starts_with('{') && line.ends_with('}') {
            if let Ok(summary) = serde_json::from_str::<VerifierSummary>(line) {
                return Some(summary);
            }
        }
    }

    let mut score = None;
    let mut status = None;
    for line in output.lines() {
        let line = line.trim();
        if let Some(v) = line.strip_prefix("Trust Score:") {
            score = v.trim().parse::<u32>().ok();
        } else if let Some(v) = line.strip_prefix("Status:") {
            status = match v.trim() {
                "VERIFIED" => Some(TrustStatus::Verified),
                "PARTIAL" => Some(TrustStatus::Partial),
                "REJECTED" => Some(TrustStatus::Rejected),
                _ => None,
            };
        }
    }

    let trust_score = score?;
    Some(VerifierSummary {
        trust_score,
        status: status.unwrap_or_else(|| TrustStatus::from_score(trust_score)),
        challenges: Vec::new(),
        findings_verified: 0,
        findings_rejected: 0,
    })
}

#[cfg(test)]
#[path = "markers_tests.rs"]
mod tests;
