mod common;

use common::{function_id, ingest_call_tree, lang, project, record, records, resolver};
use tracewatt::domain::{CodeLocation, InsertError, ModuleIdentifier, ReferenceKind, ResolveError};
use tracewatt::model::{ExecutionDetails, FileScope, ProjectReport, SensorValues};
use tracewatt::profiling::{CallTree, CallTreeNode};

fn values(hits: i64, self_time: i64, aggregated: i64) -> (i64, i64, i64) {
    (hits, self_time, aggregated)
}

fn triple(v: &SensorValues) -> (i64, i64, i64) {
    (v.profiler_hits, v.self_cpu_time, v.aggregated_cpu_time)
}

/// Every node's reference channel equals the summed aggregate of its edges.
fn assert_channels_match_edges(report: &ProjectReport) {
    for (_, r) in report.report.reports() {
        let files = r.intern.values().chain(r.lang_internal.values());
        for function in files.flat_map(|f| f.functions.values()) {
            for kind in ReferenceKind::ALL {
                let edges: i64 = function
                    .references(kind)
                    .map(|map| map.values().map(|e| e.sensor_values.aggregated_cpu_time).sum())
                    .unwrap_or(0);
                assert_eq!(
                    function.sensor_values.reference_time(kind),
                    edges,
                    "{kind:?} of {}",
                    function.id
                );
            }
        }
    }
}

#[test]
fn test_lang_internal_chain() {
    let report = ingest_call_tree("scenario_lang_chain.json");
    let a = function_id(&report, &lang(), "node:internal/a", "A");
    let b = function_id(&report, &lang(), "node:internal/b", "B");
    let c = function_id(&report, &lang(), "node:internal/c", "C");

    assert_eq!(triple(&record(&report, a).sensor_values), values(3, 30, 60));
    assert_eq!(triple(&record(&report, b).sensor_values), values(2, 20, 30));
    assert_eq!(triple(&record(&report, c).sensor_values), values(1, 10, 10));

    // All of them live in the project report, there is no other
    assert_eq!(report.report.lang_internal.len(), 3);
    assert!(report.report.extern_.is_empty());

    let edge = &record(&report, a).references(ReferenceKind::LangInternal).unwrap()[&b];
    assert_eq!(triple(&edge.sensor_values), values(2, 20, 30));
    assert_eq!(record(&report, a).sensor_values.lang_internal_cpu_time, 30);
    assert_channels_match_edges(&report);
}

#[test]
fn test_mutual_recursion_counts_outermost_occurrence() {
    let report = ingest_call_tree("scenario_mutual_recursion.json");
    let a = function_id(&report, &project(), "src/app.js", "A");
    let b = function_id(&report, &project(), "src/app.js", "B");

    assert_eq!(triple(&record(&report, a).sensor_values), values(6, 60, 100));
    assert_eq!(triple(&record(&report, b).sensor_values), values(4, 40, 60));

    let a_to_b = &record(&report, a).references(ReferenceKind::Intern).unwrap()[&b];
    assert_eq!(triple(&a_to_b.sensor_values), values(4, 40, 60));
    let b_to_a = &record(&report, b).references(ReferenceKind::Intern).unwrap()[&a];
    assert_eq!(triple(&b_to_a.sensor_values), values(2, 20, 40));
    assert_channels_match_edges(&report);
}

#[test]
fn test_extern_call_creates_module_report() {
    let report = ingest_call_tree("scenario_extern_call.json");
    let module = ModuleIdentifier::new("mA");
    let a0 = function_id(&report, &project(), "src/main.js", "A0");
    let a1 = function_id(&report, &project(), "src/main.js", "A1");
    let module_a0 = function_id(&report, &module, "index.js", "A0");

    let caller = record(&report, a0);
    assert_eq!(caller.sensor_values.extern_cpu_time, 20);
    assert_eq!(triple(&caller.sensor_values), values(1, 10, 30));
    assert!(caller.references(ReferenceKind::Extern).unwrap().contains_key(&module_a0));

    let module_id = report.global_index.module(&module).unwrap().id();
    let module_report = report.module_report(module_id).unwrap();
    let callee = module_report.report.function(FileScope::Intern, module_a0).unwrap();
    assert_eq!(triple(&callee.sensor_values), values(2, 20, 20));

    // Back into the project, as another extern edge
    let back = &callee.references(ReferenceKind::Extern).unwrap()[&a1];
    assert_eq!(back.sensor_values.aggregated_cpu_time, 0);
    assert_eq!(triple(&record(&report, a1).sensor_values), values(0, 0, 0));
    assert_channels_match_edges(&report);
}

#[test]
fn test_two_call_sites_share_one_module_node() {
    let report = ingest_call_tree("scenario_two_call_sites.json");
    let lodash = ModuleIdentifier::new("lodash");
    let map = function_id(&report, &lodash, "map.js", "map");
    let main = function_id(&report, &project(), "src/main.js", "main");
    let b = function_id(&report, &project(), "src/b.js", "b");

    // 2 + 3 samples plus the location-less child below the second call
    assert_eq!(triple(&record(&report, map).sensor_values), values(6, 54, 54));
    assert_eq!(triple(&record(&report, main).sensor_values), values(0, 0, 74));

    let b_to_map = &record(&report, b).references(ReferenceKind::Extern).unwrap()[&map];
    assert_eq!(triple(&b_to_map.sensor_values), values(4, 34, 34));

    assert_eq!(report.report.headless_sensor_values, SensorValues::sampled(1, 5));
    assert_channels_match_edges(&report);
}

#[test]
fn test_self_time_is_additive_across_insertions() {
    let tree = CallTree::from_file(common::fixture("scenario_mutual_recursion.json")).unwrap();
    let mut report = ProjectReport::new(ExecutionDetails::default());
    report.insert_cpu_profile(&tree, resolver()).unwrap();
    let ids_after_first = report.global_index.current_id();
    report.insert_cpu_profile(&tree, resolver()).unwrap();

    assert_eq!(report.global_index.current_id(), ids_after_first);
    let a = function_id(&report, &project(), "src/app.js", "A");
    assert_eq!(triple(&record(&report, a).sensor_values), values(12, 120, 200));
    assert_channels_match_edges(&report);
}

#[test]
fn test_self_time_sum_matches_tree_total() {
    for name in [
        "scenario_lang_chain.json",
        "scenario_mutual_recursion.json",
        "scenario_extern_call.json",
        "scenario_two_call_sites.json",
    ] {
        let tree = CallTree::from_file(common::fixture(name)).unwrap();
        let report = ingest_call_tree(name);
        let stored: i64 = report
            .report
            .reports()
            .into_iter()
            .map(|(_, r)| {
                r.local_sensor_values().self_cpu_time + r.headless_sensor_values.self_cpu_time
            })
            .sum();
        assert_eq!(stored, tree.total_time(), "{name}");
    }
}

#[test]
fn test_lang_record_appears_once_per_enclosing_report() {
    let report = ingest_call_tree("scenario_lang_chain.json");
    let a = function_id(&report, &lang(), "node:internal/a", "A");
    assert_eq!(records(&report, a).len(), 1);
}

#[test]
fn test_unclassifiable_location_aborts_ingestion() {
    let location = CodeLocation {
        file: "/elsewhere/x.js".to_string(),
        function_name: "f".to_string(),
        line: 1,
        column: 1,
    };
    let tree = CallTree::new(CallTreeNode::new(Some(location), 1, 10));
    let mut report = ProjectReport::new(ExecutionDetails::default());

    let err = report.insert_cpu_profile(&tree, resolver()).unwrap_err();
    assert!(matches!(
        err,
        InsertError::Resolve(ResolveError::Unclassifiable { ref file, .. })
            if file == "/elsewhere/x.js"
    ));
}

#[test]
fn test_deep_mutual_recursion_from_json() {
    // A -> B -> A -> B ... 10,000 frames, one sample each
    const DEPTH: usize = 10_000;
    let nodes: Vec<String> = (0..DEPTH)
        .map(|i| {
            let function = if i % 2 == 0 { "A" } else { "B" };
            let children = if i + 1 < DEPTH { format!("[{}]", i + 1) } else { "[]".to_string() };
            format!(
                r#"{{"id":{i},"location":{{"file":"/app/src/deep.js","functionName":"{function}","line":1,"column":1}},"profilerHits":1,"selfTime":1,"children":{children}}}"#
            )
        })
        .collect();
    let json = format!(r#"{{"nodes":[{}]}}"#, nodes.join(","));
    let tree = CallTree::from_reader(json.as_bytes()).unwrap();

    let mut report = ProjectReport::new(ExecutionDetails::default());
    report.insert_cpu_profile(&tree, resolver()).unwrap();
    let a = function_id(&report, &project(), "src/deep.js", "A");
    let b = function_id(&report, &project(), "src/deep.js", "B");

    assert_eq!(triple(&record(&report, a).sensor_values), values(5_000, 5_000, 10_000));
    assert_eq!(triple(&record(&report, b).sensor_values), values(5_000, 5_000, 9_999));

    let a_to_b = &record(&report, a).references(ReferenceKind::Intern).unwrap()[&b];
    assert_eq!(triple(&a_to_b.sensor_values), values(5_000, 5_000, 9_999));
    let b_to_a = &record(&report, b).references(ReferenceKind::Intern).unwrap()[&a];
    assert_eq!(triple(&b_to_a.sensor_values), values(4_999, 4_999, 9_998));
    assert_channels_match_edges(&report);
}
