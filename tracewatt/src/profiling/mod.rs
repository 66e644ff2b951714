//! Profile ingestion
//!
//! This module turns sampled profiles into report statistics:
//! - Cleaned call tree input format
//! - V8 `.cpuprofile` import
//! - The insertion engine walking a call tree into a report

pub mod call_tree;
pub mod cpuprofile;
pub mod insert;

// Re-export common types
pub use call_tree::{CallTree, CallTreeNode};
pub use cpuprofile::CpuProfile;
pub use insert::InsertCpuProfileStateMachine;
