//! Domain model for tracewatt
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{
    split_segments, CodeLocation, MicroSeconds, ModuleId, ModuleIdentifier, PathId,
    ReferenceKind, ReportInternId, SourceNodeId, SourceNodeIdentifier,
};

pub use errors::{
    GraphError, ImportError, IndexError, InsertError, ReportIoError, ResolveError, ValidationError,
};
