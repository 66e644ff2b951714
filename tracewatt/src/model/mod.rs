//! Report data model
//!
//! Sensor values, per-node and per-file metadata, and the report containers
//! the insertion engine fills in. Everything here serializes to the report
//! JSON format and round-trips losslessly.

pub mod merge;
pub mod metadata;
pub mod report;

pub use metadata::{MetaDataKind, ReferenceMap, SourceFileMetaData, SourceNodeMetaData};
pub use report::{ExecutionDetails, FileScope, ModuleReport, ProjectReport, Report, REPORT_VERSION};
pub use tracewatt_common::SensorValues;
