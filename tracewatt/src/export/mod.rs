//! Report persistence
//!
//! Reports are stored as JSON documents that round-trip losslessly:
//! execution details, the identifier index with its counter, and every
//! project and module report.

pub mod report_json;

pub use report_json::{load_report, read_report, ReportExporter};
