//! Path-pattern resolver.
//!
//! Classifies each location with [`ClassificationRules`] and names it after
//! its function: `{root}.{function:<name>}`, or
//! `{root}.{anonymous:<line>:<column>}` for unnamed functions.

use super::{FrameScope, LocationResolver, ResolvedFrame};
use crate::classification::{ClassificationRules, FrameOrigin};
use crate::domain::{CodeLocation, ResolveError, SourceNodeIdentifier};

#[derive(Debug, Clone, Default)]
pub struct HeuristicResolver {
    rules: ClassificationRules,
}

impl HeuristicResolver {
    #[must_use]
    pub fn new(rules: ClassificationRules) -> Self {
        Self { rules }
    }

    #[must_use]
    pub fn rules(&self) -> &ClassificationRules {
        &self.rules
    }
}

/// Identifier of the function at `location`.
///
/// Braces in function names would unbalance the segment, so they are
/// replaced by parentheses.
fn function_identifier(location: &CodeLocation) -> Result<SourceNodeIdentifier, ResolveError> {
    let name = location.function_name.trim();
    let segment = if name.is_empty() {
        format!("{{anonymous:{}:{}}}", location.line, location.column)
    } else {
        let name = name.replace('{', "(").replace('}', ")");
        format!("{{function:{name}}}")
    };
    Ok(SourceNodeIdentifier::parse(format!("{{root}}.{segment}"))?)
}

impl LocationResolver for HeuristicResolver {
    fn resolve(&self, location: &CodeLocation) -> Result<ResolvedFrame, ResolveError> {
        let origin = self
            .rules
            .classify_frame(&location.file, &location.function_name);
        let (scope, path) = match origin {
            FrameOrigin::Project { path } => (FrameScope::ProjectIntern, path),
            FrameOrigin::Extern { module, path } => (FrameScope::ExternModule(module), path),
            FrameOrigin::LangInternal { path } => (FrameScope::LangInternal, path),
            FrameOrigin::Unknown => {
                return Err(ResolveError::Unclassifiable {
                    file: location.file.clone(),
                    function: location.function_name.clone(),
                });
            }
        };
        Ok(ResolvedFrame {
            scope,
            path,
            identifier: function_identifier(location)?,
        })
    }
}
