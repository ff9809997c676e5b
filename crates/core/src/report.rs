// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Report, run, and session identity.
//!
//! A [`ReportTitle`] is the namespace for all durable per-research state,
//! so it must be a safe single path segment. Validation happens once at
//! construction; everything downstream can trust the value.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use thiserror::Error;

/// Why a report title or run ID was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportTitleError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier contains a path separator: {0:?}")]
    Separator(String),
    #[error("identifier contains a parent-directory reference: {0:?}")]
    Traversal(String),
    #[error("identifier would not survive path normalization: {0:?}")]
    Unnormalized(String),
    #[error("identifier contains a NUL byte")]
    Nul,
}

/// Validate a string as a single safe path segment.
///
/// Rejects empty strings, `/` and `\` separators, `..`, NUL bytes, and
/// segments that normalization would alter (`.`, leading/trailing
/// whitespace, trailing dots).
fn validate_segment(s: &str) -> Result<(), ReportTitleError> {
    if s.is_empty() {
        return Err(ReportTitleError::Empty);
    }
    if s.bytes().any(|b| b == 0) {
        return Err(ReportTitleError::Nul);
    }
    if s.contains('/') || s.contains('\\') {
        return Err(ReportTitleError::Separator(s.to_string()));
    }
    if s == ".." || s.contains("..") {
        return Err(ReportTitleError::Traversal(s.to_string()));
    }
    // A segment survives normalization iff trimming and dot-stripping are no-ops.
    if s == "." || s.trim() != s || s.ends_with('.') || s.starts_with('.') {
        return Err(ReportTitleError::Unnormalized(s.to_string()));
    }
    Ok(())
}

/// User-chosen identifier naming one research effort.
///
/// Used as the directory name under `reports/`, so construction enforces
/// that it is a single normalization-stable path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportTitle(String);

impl ReportTitle {
    pub fn new(s: impl Into<String>) -> Result<Self, ReportTitleError> {
        let s = s.into();
        validate_segment(&s)?;
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bypass validation for test fixtures with known-good titles.
    #[cfg(any(test, feature = "test-support"))]
    pub fn for_tests(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ReportTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for ReportTitle {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ReportTitle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ReportTitle {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ReportTitle {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Caller-chosen identifier for one queue run within a report.
///
/// Shares the single-segment rules with [`ReportTitle`] because it names
/// the queue document `queue/{runId}.json`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(s: impl Into<String>) -> Result<Self, ReportTitleError> {
        let s = s.into();
        validate_segment(&s)?;
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bypass validation for test fixtures with known-good run ids.
    #[cfg(any(test, feature = "test-support"))]
    pub fn for_tests(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unique identifier for one REPL bridge process.
///
/// Opaque; on-disk directory names use a hashed 12-hex short form computed
/// by the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
