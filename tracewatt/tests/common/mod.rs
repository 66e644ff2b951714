//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tracewatt::classification::ClassificationRules;
use tracewatt::domain::{ModuleIdentifier, SourceNodeId, SourceNodeIdentifier};
use tracewatt::model::{ExecutionDetails, ProjectReport, SourceNodeMetaData};
use tracewatt::profiling::CallTree;
use tracewatt::resolution::HeuristicResolver;

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// Path-pattern resolver with `/app` as project root.
pub fn resolver() -> HeuristicResolver {
    HeuristicResolver::new(ClassificationRules::default().with_project_root("/app"))
}

pub fn ingest_call_tree(name: &str) -> ProjectReport {
    let tree = CallTree::from_file(fixture(name)).expect("Failed to read call tree fixture");
    let mut report = ProjectReport::new(ExecutionDetails::default());
    report
        .insert_cpu_profile(&tree, resolver())
        .expect("Failed to insert call tree");
    report
}

pub fn function_id(
    report: &ProjectReport,
    module: &ModuleIdentifier,
    path: &str,
    function: &str,
) -> SourceNodeId {
    let identifier =
        SourceNodeIdentifier::parse(format!("{{root}}.{{function:{function}}}")).unwrap();
    report
        .global_index
        .module(module)
        .and_then(|m| m.path(path))
        .and_then(|p| p.source_node_id(&identifier))
        .unwrap_or_else(|| panic!("{module} {path} {function} is not indexed"))
}

/// Every record of `id`, across all reports.
pub fn records(report: &ProjectReport, id: SourceNodeId) -> Vec<&SourceNodeMetaData> {
    report
        .report
        .reports()
        .into_iter()
        .flat_map(|(_, r)| r.intern.values().chain(r.lang_internal.values()))
        .filter_map(|file| file.functions.get(&id))
        .collect()
}

/// The single record of `id`.
pub fn record(report: &ProjectReport, id: SourceNodeId) -> &SourceNodeMetaData {
    let found = records(report, id);
    assert_eq!(found.len(), 1, "expected exactly one record of {id}");
    found[0]
}

pub fn project() -> ModuleIdentifier {
    ModuleIdentifier::project()
}

pub fn lang() -> ModuleIdentifier {
    ModuleIdentifier::lang_internal()
}
