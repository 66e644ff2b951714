//! Structured error types for tracewatt
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Every error here is fatal for the operation that raised it; there is no
//! partial-success mode.

use super::types::{ModuleId, ModuleIdentifier, SourceNodeId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Invalid source node identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Id {0} assigned more than once")]
    DuplicateId(u32),

    #[error("Id {id} is not below the index counter {current_id}")]
    IdOutOfRange { id: u32, current_id: u32 },

    #[error("Id {0} is not known to the index")]
    UnknownId(u32),

    #[error("Id space exhausted")]
    IdSpaceExhausted,
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Cannot classify location {file:?} (function {function:?})")]
    Unclassifiable { file: String, function: String },

    #[error("No lookup table entry for {file}:{line}:{column}")]
    NotInTable {
        file: String,
        line: u32,
        column: u32,
    },

    #[error(transparent)]
    InvalidIdentifier(#[from] IndexError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum InsertError {
    #[error("Malformed call tree: {0}")]
    MalformedCallTree(String),

    #[error("Open frame {0} has no record in its report")]
    MissingRecord(SourceNodeId),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Reference from {from} points at {target}, which no report contains")]
    UnresolvedReference {
        from: SourceNodeId,
        target: SourceNodeId,
    },

    #[error("Module {0} has no module report")]
    MissingModuleReport(ModuleIdentifier),

    #[error("Module report {0} is not registered in the index")]
    UnknownModule(ModuleId),
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("{channel} of {node:?} is {actual:?}, recomputed {expected:?}")]
    AggregateMismatch {
        node: String,
        channel: &'static str,
        expected: tracewatt_common::SensorValues,
        actual: tracewatt_common::SensorValues,
    },
}

#[derive(Error, Debug)]
pub enum ReportIoError {
    #[error("Unsupported report version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_error_display() {
        let err = IndexError::IdOutOfRange {
            id: 9,
            current_id: 4,
        };
        assert_eq!(err.to_string(), "Id 9 is not below the index counter 4");
    }

    #[test]
    fn test_insert_error_wraps_resolve_error() {
        let err: InsertError = ResolveError::Unclassifiable {
            file: "/opt/x.js".to_string(),
            function: "f".to_string(),
        }
        .into();
        assert!(err.to_string().contains("/opt/x.js"));
        assert!(matches!(err, InsertError::Resolve(_)));
    }
}
