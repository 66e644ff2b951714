//! CLI argument definitions

use crate::classification::ClassificationRules;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tracewatt",
    about = "Attribute sampled CPU time to source nodes, modules and call edges",
    after_help = "\
EXAMPLES:
    tracewatt ingest app.cpuprofile -o report.json --project-root /srv/app
    tracewatt ingest tree.json --format call-tree --resolver-table table.json -o report.json
    tracewatt summary report.json --top 20
    tracewatt reachability report.json --entry 12 --entry 40
    tracewatt merge run1.json run2.json -o merged.json"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Insert a sampled profile into a new report
    Ingest(IngestArgs),
    /// Print totals and the top source nodes of a report
    Summary(SummaryArgs),
    /// Print what is reachable from a set of entry nodes
    Reachability(ReachabilityArgs),
    /// Merge several reports into one
    Merge(MergeArgs),
}

/// Input format of `ingest`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProfileFormat {
    /// V8 / DevTools `.cpuprofile`
    Cpuprofile,
    /// Cleaned call tree JSON
    CallTree,
}

#[derive(ClapArgs)]
pub struct IngestArgs {
    /// Profile to ingest
    #[arg(value_name = "PROFILE")]
    pub profile: PathBuf,

    /// Report file to write
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    #[arg(long, value_enum, default_value = "cpuprofile")]
    pub format: ProfileFormat,

    /// Resolve locations with a lookup table instead of path patterns
    #[arg(long, value_name = "FILE")]
    pub resolver_table: Option<PathBuf>,

    /// Files below this directory are project code
    #[arg(long, value_name = "DIR")]
    pub project_root: Option<String>,

    /// Additional package install location (repeatable)
    #[arg(long, value_name = "MARKER")]
    pub extern_marker: Vec<String>,

    /// Additional language/runtime path marker (repeatable)
    #[arg(long, value_name = "MARKER")]
    pub lang_internal_marker: Vec<String>,

    /// Free-form label stored in the execution details
    #[arg(long, default_value = "")]
    pub origin: String,

    #[arg(long)]
    pub commit_hash: Option<String>,

    /// Commit time, unix milliseconds
    #[arg(long)]
    pub commit_timestamp: Option<i64>,

    /// Mark the report as built from uncommitted sources
    #[arg(long)]
    pub uncommitted_changes: bool,

    /// Indent the written JSON
    #[arg(long)]
    pub pretty: bool,
}

impl IngestArgs {
    /// Built-in classification tables extended by the CLI flags.
    #[must_use]
    pub fn classification_rules(&self) -> ClassificationRules {
        let mut rules = ClassificationRules::default();
        if let Some(root) = &self.project_root {
            rules = rules.with_project_root(root.as_str());
        }
        for marker in &self.extern_marker {
            rules = rules.with_extern_marker(marker.as_str());
        }
        for marker in &self.lang_internal_marker {
            rules = rules.with_lang_internal_marker(marker.as_str());
        }
        rules
    }
}

#[derive(ClapArgs)]
pub struct SummaryArgs {
    #[arg(value_name = "REPORT")]
    pub report: PathBuf,

    /// Number of source nodes to list
    #[arg(long, default_value = "10")]
    pub top: usize,

    /// Print the aggregation tree
    #[arg(long)]
    pub tree: bool,
}

#[derive(ClapArgs)]
pub struct ReachabilityArgs {
    #[arg(value_name = "REPORT")]
    pub report: PathBuf,

    /// Source node id to start from (repeatable)
    #[arg(long = "entry", value_name = "ID", required = true)]
    pub entries: Vec<u32>,
}

#[derive(ClapArgs)]
pub struct MergeArgs {
    /// Reports to merge
    #[arg(value_name = "REPORT", required = true)]
    pub reports: Vec<PathBuf>,

    /// Merged report file to write
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Indent the written JSON
    #[arg(long)]
    pub pretty: bool,
}
