//! Location resolution: raw profiler locations → scoped source-node identifiers
//!
//! The insertion engine only knows the [`LocationResolver`] trait. Two
//! implementations ship with the crate:
//!
//! - [`heuristic::HeuristicResolver`]: classifies by path patterns
//!   ([`crate::classification::ClassificationRules`]) and names frames after
//!   their function
//! - [`table::TableResolver`]: looks locations up in a JSON table produced by
//!   an external static-analysis step

pub mod heuristic;
pub mod table;

pub use heuristic::HeuristicResolver;
pub use table::TableResolver;

use crate::domain::{CodeLocation, ModuleIdentifier, ResolveError, SourceNodeIdentifier};
use serde::{Deserialize, Serialize};

/// Which part of the program a frame belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameScope {
    /// Project code
    ProjectIntern,
    /// Code of an external dependency
    ExternModule(ModuleIdentifier),
    /// Language/runtime-internal code
    LangInternal,
}

impl FrameScope {
    /// Module identifier the frame is indexed under.
    #[must_use]
    pub fn module(&self) -> ModuleIdentifier {
        match self {
            FrameScope::ProjectIntern => ModuleIdentifier::project(),
            FrameScope::ExternModule(module) => module.clone(),
            FrameScope::LangInternal => ModuleIdentifier::lang_internal(),
        }
    }
}

/// A resolved frame: scope, file path inside the scope's module, and the
/// dotted identifier inside that file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedFrame {
    pub scope: FrameScope,
    pub path: String,
    pub identifier: SourceNodeIdentifier,
}

/// Maps code locations to resolved frames. Must be pure: the same location
/// always resolves to the same frame.
pub trait LocationResolver {
    /// # Errors
    ///
    /// Returns a [`ResolveError`] for locations that cannot be classified;
    /// ingestion aborts on the first one.
    fn resolve(&self, location: &CodeLocation) -> Result<ResolvedFrame, ResolveError>;

    /// Whether a project path has uncommitted changes in the working tree.
    fn has_uncommitted_changes(&self, _path: &str) -> bool {
        false
    }
}

impl<R: LocationResolver + ?Sized> LocationResolver for &R {
    fn resolve(&self, location: &CodeLocation) -> Result<ResolvedFrame, ResolveError> {
        (**self).resolve(location)
    }

    fn has_uncommitted_changes(&self, path: &str) -> bool {
        (**self).has_uncommitted_changes(path)
    }
}

impl<R: LocationResolver + ?Sized> LocationResolver for Box<R> {
    fn resolve(&self, location: &CodeLocation) -> Result<ResolvedFrame, ResolveError> {
        (**self).resolve(location)
    }

    fn has_uncommitted_changes(&self, path: &str) -> bool {
        (**self).has_uncommitted_changes(path)
    }
}
