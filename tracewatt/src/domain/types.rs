//! Domain types providing compile-time safety and self-documentation
//!
//! Newtype wrappers around the strings and integers that flow through the
//! engine, so a module identifier can't be passed where a file path is
//! expected and a report intern id can't be confused with a source-node id.

use super::errors::IndexError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use tracewatt_common::{MicroSeconds, ModuleId, PathId, ReferenceKind, SourceNodeId};

/// Module identifier string
///
/// One of the two reserved identifiers (`{self}` for the project,
/// `{lang}` for language-internal code) or an external dependency written
/// as `name@version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleIdentifier(String);

impl ModuleIdentifier {
    /// Reserved identifier of the project itself.
    pub const PROJECT: &'static str = "{self}";
    /// Reserved identifier of language/runtime-internal code.
    pub const LANG_INTERNAL: &'static str = "{lang}";

    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    /// Identifier for an external dependency.
    #[must_use]
    pub fn external(name: &str, version: &str) -> Self {
        Self(format!("{name}@{version}"))
    }

    #[must_use]
    pub fn project() -> Self {
        Self(Self::PROJECT.to_string())
    }

    #[must_use]
    pub fn lang_internal() -> Self {
        Self(Self::LANG_INTERNAL.to_string())
    }

    #[must_use]
    pub fn is_project(&self) -> bool {
        self.0 == Self::PROJECT
    }

    #[must_use]
    pub fn is_lang_internal(&self) -> bool {
        self.0 == Self::LANG_INTERNAL
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Dotted source-node identifier
///
/// A sequence of `{kind:name}` segments joined by `.`, for example
/// `{root}.{class:Parser}.{method:parse}`. Dots inside braces belong to the
/// segment, so `{function:a.b}` is a single segment.
///
/// Always validated on construction: non-empty, no empty segments, balanced
/// braces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SourceNodeIdentifier(String);

impl SourceNodeIdentifier {
    /// Parse and validate a dotted identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidIdentifier`] for empty identifiers,
    /// empty segments or unbalanced braces.
    pub fn parse(identifier: impl Into<String>) -> Result<Self, IndexError> {
        let identifier = identifier.into();
        split_segments(&identifier)?;
        Ok(Self(identifier))
    }

    /// Segments of this identifier, outermost first.
    #[must_use]
    pub fn segments(&self) -> Vec<&str> {
        // Validated at construction
        split_segments(&self.0).unwrap_or_default()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for SourceNodeIdentifier {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(raw).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for SourceNodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Split a dotted identifier on `.` characters that are not inside `{...}`.
///
/// # Errors
///
/// Returns [`IndexError::InvalidIdentifier`] for empty identifiers, empty
/// segments or unbalanced braces.
pub fn split_segments(identifier: &str) -> Result<Vec<&str>, IndexError> {
    let invalid = || IndexError::InvalidIdentifier(identifier.to_string());

    if identifier.is_empty() {
        return Err(invalid());
    }

    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in identifier.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.checked_sub(1).ok_or_else(invalid)?,
            '.' if depth == 0 => {
                segments.push(&identifier[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(invalid());
    }
    segments.push(&identifier[start..]);

    if segments.iter().any(|s| s.is_empty()) {
        return Err(invalid());
    }
    Ok(segments)
}

/// Raw code location reported by a profiler
///
/// Lines and columns are 1-based. A location without a file (native frames)
/// carries an empty `file`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeLocation {
    pub file: String,
    #[serde(default)]
    pub function_name: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

/// Position of a report in a call graph's traversal order
///
/// The project report is always `0`; nested module reports follow in the
/// order they are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportInternId(pub u32);

impl ReportInternId {
    pub const PROJECT: ReportInternId = ReportInternId(0);
}

impl fmt::Display for ReportInternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "report#{}", self.0)
    }
}
