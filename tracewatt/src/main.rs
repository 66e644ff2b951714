//! # tracewatt - Main Entry Point
//!
//! Subcommands:
//! - **ingest**: profile (`.cpuprofile` or call tree) → report JSON
//! - **summary**: totals, hotspots and optionally the aggregation tree
//! - **reachability**: nodes reachable from entry ids, with filtered totals
//! - **merge**: several reports → one report

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracewatt::analysis::{
    analyze_hotspots, GraphNodeKey, SourceFileMetaDataTree, SourceNodeGraph, TreeNodeKind,
};
use tracewatt::cli::{
    Args, Command, IngestArgs, MergeArgs, ProfileFormat, ReachabilityArgs, SummaryArgs,
};
use tracewatt::domain::SourceNodeId;
use tracewatt::export::{load_report, ReportExporter};
use tracewatt::model::{ExecutionDetails, ProjectReport, SensorValues};
use tracewatt::profiling::{CallTree, CpuProfile};
use tracewatt::resolution::{HeuristicResolver, LocationResolver, TableResolver};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = err.to_string().to_lowercase();
    if msg.contains("unknown entry") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Ingest(ingest) => run_ingest(&ingest),
        Command::Summary(summary) => run_summary(&summary),
        Command::Reachability(reachability) => run_reachability(&reachability),
        Command::Merge(merge) => run_merge(&merge),
    }
}

// =============================================================================
// INGEST
// =============================================================================

fn run_ingest(args: &IngestArgs) -> Result<()> {
    let tree = match args.format {
        ProfileFormat::Cpuprofile => CpuProfile::from_file(&args.profile)
            .with_context(|| format!("Failed to read profile {}", args.profile.display()))?
            .to_call_tree()?,
        ProfileFormat::CallTree => CallTree::from_file(&args.profile)
            .with_context(|| format!("Failed to read call tree {}", args.profile.display()))?,
    };

    let details = ExecutionDetails {
        origin: args.origin.clone(),
        commit_hash: args.commit_hash.clone(),
        commit_timestamp: args.commit_timestamp,
        timestamp: now_millis(),
        uncommitted_changes: args.uncommitted_changes,
    };
    let mut report = ProjectReport::new(details);

    let resolver: Box<dyn LocationResolver> = match &args.resolver_table {
        Some(path) => Box::new(
            TableResolver::from_file(path)
                .with_context(|| format!("Failed to read lookup table {}", path.display()))?,
        ),
        None => Box::new(HeuristicResolver::new(args.classification_rules())),
    };
    report
        .insert_cpu_profile(&tree, resolver)
        .with_context(|| format!("Failed to ingest {}", args.profile.display()))?;

    write_report(&report, &args.output, args.pretty)?;
    println!("report: {}", args.output.display());
    print_totals(&report)?;
    Ok(())
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

fn write_report(report: &ProjectReport, path: &Path, pretty: bool) -> Result<()> {
    ReportExporter::new(report)
        .pretty(pretty)
        .export_to_file(path)
        .with_context(|| format!("Failed to write report {}", path.display()))
}

fn read_report(path: &Path) -> Result<ProjectReport> {
    load_report(path).with_context(|| format!("Failed to read report {}", path.display()))
}

// =============================================================================
// SUMMARY
// =============================================================================

fn run_summary(args: &SummaryArgs) -> Result<()> {
    let report = read_report(&args.report)?;
    print_totals(&report)?;

    let hotspots = analyze_hotspots(&report);
    if !hotspots.is_empty() {
        println!();
        println!(
            "{:>7}  {:>10}  {:>10}  {:>6}  NODE",
            "SELF %", "SELF(us)", "AGG(us)", "HITS"
        );
        for hotspot in hotspots.iter().take(args.top) {
            let module = hotspot
                .module
                .as_ref()
                .map_or_else(String::new, ToString::to_string);
            let path = hotspot.path.as_deref().unwrap_or("?");
            println!(
                "{:>6.1}%  {:>10}  {:>10}  {:>6}  {module} {path} {}",
                hotspot.percentage,
                hotspot.sensor_values.self_cpu_time,
                hotspot.sensor_values.aggregated_cpu_time,
                hotspot.sensor_values.profiler_hits,
                hotspot.name
            );
        }
    }

    if args.tree {
        let tree = SourceFileMetaDataTree::from_report(&report)?;
        println!();
        print_tree(&tree);
    }
    Ok(())
}

fn print_totals(report: &ProjectReport) -> Result<()> {
    let tree = SourceFileMetaDataTree::from_report(report)?;
    tree.validate()?;
    let aggregate = tree.total_aggregated_source_meta_data();
    let headless = report.report.headless_sensor_values;

    println!("ids allocated: {}", report.global_index.current_id());
    println!("module reports: {}", report.report.extern_.len());
    print_values("total", &aggregate.total);
    print_values("max", &aggregate.max);
    if !headless.is_empty() {
        print_values("headless", &headless);
    }
    Ok(())
}

fn print_values(label: &str, values: &SensorValues) {
    println!(
        "{label}: hits={} self={}us aggregated={}us intern={}us extern={}us lang_internal={}us",
        values.profiler_hits,
        values.self_cpu_time,
        values.aggregated_cpu_time,
        values.intern_cpu_time,
        values.extern_cpu_time,
        values.lang_internal_cpu_time
    );
}

fn print_tree(tree: &SourceFileMetaDataTree) {
    for (depth, _, node) in tree.depth_first() {
        if node.kind == TreeNodeKind::Root {
            continue;
        }
        let suffix = if matches!(node.kind, TreeNodeKind::File { .. }) {
            ""
        } else {
            "/"
        };
        println!(
            "{:indent$}{}{suffix}  self={}us hits={}",
            "",
            node.name,
            node.total.self_cpu_time,
            node.total.profiler_hits,
            indent = (depth - 1) * 2
        );
    }
}

// =============================================================================
// REACHABILITY
// =============================================================================

fn run_reachability(args: &ReachabilityArgs) -> Result<()> {
    let report = read_report(&args.report)?;
    let mut graph = SourceNodeGraph::from_report(&report)?;

    let mut entries = Vec::new();
    for raw in &args.entries {
        let id = SourceNodeId(*raw);
        let keys: Vec<GraphNodeKey> = graph
            .nodes()
            .map(|n| n.key)
            .filter(|key| key.id == id)
            .collect();
        if keys.is_empty() {
            anyhow::bail!("Unknown entry {id}: no report contains this source node");
        }
        entries.extend(keys);
    }

    let mut reachable = BTreeSet::new();
    for entry in &entries {
        if let Some(reached) = graph.reachability_for_node(*entry) {
            reachable.extend(reached);
        }
    }
    info!("{} entries reach {} graph nodes", entries.len(), reachable.len());

    for key in &reachable {
        let name = report
            .global_index
            .source_node_locator(key.id)
            .map_or_else(
                || key.id.to_string(),
                |l| format!("{} {} {}", l.module, l.path, l.identifier),
            );
        println!("{} {}  {name}", key.report, key.id);
    }

    let filtered = SourceFileMetaDataTree::from_report(&report)?.filter(&mut graph, &entries);
    let aggregate = filtered.total_aggregated_source_meta_data();
    println!();
    print_values("reachable total", &aggregate.total);
    print_values("reachable max", &aggregate.max);
    Ok(())
}

// =============================================================================
// MERGE
// =============================================================================

fn run_merge(args: &MergeArgs) -> Result<()> {
    let reports = args
        .reports
        .iter()
        .map(|path| read_report(path))
        .collect::<Result<Vec<_>>>()?;
    let merged = ProjectReport::merge(reports).context("Failed to merge reports")?;
    write_report(&merged, &args.output, args.pretty)?;
    println!(
        "merged {} reports into {}",
        args.reports.len(),
        args.output.display()
    );
    print_totals(&merged)?;
    Ok(())
}
