//! Command-line interface

mod args;

pub use args::{Args, Command, IngestArgs, MergeArgs, ProfileFormat, ReachabilityArgs, SummaryArgs};
