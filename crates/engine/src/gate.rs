// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Report readiness gate.
//!
//! Read-only adapter over the durable report tree: the report directory
//! and file must exist, the required sections must be present, at least
//! one finding must be stated, and every artifact the markdown references
//! must exist on disk. Each miss costs points against an initial 100; a
//! missing file or directory is blocking regardless of score.

use gyoshu_core::ReportTitle;
use gyoshu_storage::{fs as safe_fs, ProjectPaths, StorageError};
use serde::Serialize;
use std::path::Path;

/// Gate pass threshold.
const PASS_SCORE: i32 = 80;

const SECTION_PENALTY: i32 = 15;
const FINDINGS_PENALTY: i32 = 20;
const ARTIFACT_PENALTY: i32 = 10;
const MISSING_FILE_PENALTY: i32 = 100;

/// Required section headings, matched case-insensitively.
const REQUIRED_SECTIONS: [&str; 3] = ["executive summary", "key findings", "conclusion"];

/// One scored problem with the report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateViolation {
    pub detail: String,
    pub penalty: i32,
    /// A blocking violation fails the gate regardless of score.
    pub blocking: bool,
}

/// Gate outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportGateResult {
    pub score: i32,
    pub passed: bool,
    pub violations: Vec<GateViolation>,
}

/// The report gate over one project.
#[derive(Debug, Clone)]
pub struct ReportGate {
    project: ProjectPaths,
}

impl ReportGate {
    pub fn new(project: ProjectPaths) -> Self {
        Self { project }
    }

    /// Check a report. I/O problems below the existence checks (an
    /// unreadable report file) surface as storage errors; everything
    /// expected is expressed as violations.
    pub fn check(&self, title: &ReportTitle) -> Result<ReportGateResult, StorageError> {
        let mut violations = Vec::new();

        let report_dir = self.project.report_dir(title);
        if !report_dir.is_dir() {
            violations.push(GateViolation {
                detail: format!("report directory missing: {}", report_dir.display()),
                penalty: MISSING_FILE_PENALTY,
                blocking: true,
            });
            return Ok(finish(violations));
        }

        let report_file = self.project.report_file(title);
        if !report_file.is_file() {
            violations.push(GateViolation {
                detail: format!("report file missing: {}", report_file.display()),
                penalty: MISSING_FILE_PENALTY,
                blocking: true,
            });
            return Ok(finish(violations));
        }

        let body = safe_fs::read_string(&report_file)?;
        check_sections(&body, &mut violations);
        check_findings(&body, &mut violations);
        check_artifacts(&body, &report_dir, &mut violations);

        Ok(finish(violations))
    }
}

fn finish(violations: Vec<GateViolation>) -> ReportGateResult {
    let score = 100 - violations.iter().map(|v| v.penalty).sum::<i32>();
    let blocking = violations.iter().any(|v| v.blocking);
    ReportGateResult { score, passed: score >= PASS_SCORE && !blocking, violations }
}

/// Headings may be `#`-style or a bold standalone line.
fn check_sections(body: &str, violations: &mut Vec<GateViolation>) {
    let headings: Vec<String> = body
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if let Some(h) = line.strip_prefix('#') {
                Some(h.trim_start_matches('#').trim().to_lowercase())
            } else if line.starts_with("**") && line.ends_with("**") && line.len() > 4 {
                Some(line.trim_matches('*').trim().to_lowercase())
            } else {
                None
            }
        })
        .collect();

    for required in REQUIRED_SECTIONS {
        if !headings.iter().any(|h| h.contains(required)) {
            violations.push(GateViolation {
                detail: format!("required section missing: {}", required),
                penalty: SECTION_PENALTY,
                blocking: false,
            });
        }
    }
}

/// At least one finding: a bullet under the findings section, or an
/// explicit `[FINDING]` marker anywhere.
fn check_findings(body: &str, violations: &mut Vec<GateViolation>) {
    if body.contains("[FINDING]") {
        return;
    }

    let mut in_findings = false;
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            in_findings = trimmed.to_lowercase().contains("key findings");
            continue;
        }
        if in_findings && (trimmed.starts_with("- ") || trimmed.starts_with("* ")) {
            return;
        }
    }

    violations.push(GateViolation {
        detail: "no findings stated".to_string(),
        penalty: FINDINGS_PENALTY,
        blocking: false,
    });
}

/// Every relative artifact reference in links and images must exist.
fn check_artifacts(body: &str, report_dir: &Path, violations: &mut Vec<GateViolation>) {
    for target in markdown_link_targets(body) {
        if target.starts_with("http://") || target.starts_with("https://") || target.starts_with('#')
        {
            continue;
        }
        if !report_dir.join(&target).exists() {
            violations.push(GateViolation {
                detail: format!("referenced artifact missing: {}", target),
                penalty: ARTIFACT_PENALTY,
                blocking: true,
            });
        }
    }
}

/// Extract `](target)` targets from markdown links and images.
fn markdown_link_targets(body: &str) -> Vec<String> {
    let mut targets = Vec::new();
    let mut rest = body;
    while let Some(open) = rest.find("](") {
        let after = &rest[open + 2..];
        let Some(close) = after.find(')') else {
            break;
        };
        let target = after[..close].trim();
        if !target.is_empty() {
            targets.push(target.to_string());
        }
        rest = &after[close + 1..];
    }
    targets
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
