//! Hotspot ranking for project reports.
//!
//! Flattens every report of a [`ProjectReport`] into one list of source
//! nodes ranked by self time, answering "where was the CPU actually spent".
//!
//! # Architecture
//!
//! - **`HotspotStats`** - accumulates sensor values per source node id
//! - **`analyze_hotspots()`** - batch analysis of a whole project report
//!
//! ## Data Flow
//!
//! ```text
//! ProjectReport
//!     │
//!     ├──► Report::reports()          ← project + every module report
//!     │        │
//!     │        └──► HotspotStats.record()
//!     │
//!     └──► GlobalIndex                ← names, modules and paths
//!              │
//!              └──► HotspotStats.to_hotspots()
//! ```
//!
//! A language-internal node can live in several reports (one per calling
//! module); its values are summed across them.

// Percentage calculations intentionally convert i64 to f64
#![allow(clippy::cast_precision_loss)]

use crate::domain::{MicroSeconds, ModuleIdentifier, SourceNodeId};
use crate::index::GlobalIndex;
use crate::model::{MetaDataKind, ProjectReport};
use std::collections::HashMap;
use tracewatt_common::SensorValues;

// =============================================================================
// SOURCE NODE HOTSPOT (OUTPUT TYPE)
// =============================================================================

/// A source node with its statistics summed over every report.
///
/// ```text
///  SELF %   SELF(us)   AGG(us)  HITS  NODE
///   42.3%     423000    512000   423  src/crypto.js {root}.{function:encrypt}
///   18.7%     187000    187000   187  {lang} node:internal/timers ...
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SourceNodeHotspot {
    pub id: SourceNodeId,

    /// Dotted identifier, or the id if the index doesn't know it.
    pub name: String,

    /// Owning module; `None` if the index doesn't know the node.
    pub module: Option<ModuleIdentifier>,

    /// File path relative to the module.
    pub path: Option<String>,

    pub kind: MetaDataKind,

    pub sensor_values: SensorValues,

    /// Share of the total self time (0.0 - 100.0), headless time included.
    pub percentage: f64,
}

// =============================================================================
// HOTSPOT STATS (AGGREGATOR)
// =============================================================================

/// Per-node accumulator.
#[derive(Debug, Default)]
pub struct HotspotStats {
    nodes: HashMap<SourceNodeId, (MetaDataKind, SensorValues)>,

    /// Denominator for percentages.
    total_self_time: MicroSeconds,
}

impl HotspotStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one node record.
    pub fn record(&mut self, id: SourceNodeId, kind: MetaDataKind, values: &SensorValues) {
        self.total_self_time += values.self_cpu_time;
        let entry = self.nodes.entry(id).or_insert((kind, SensorValues::default()));
        entry.1 += *values;
    }

    /// Add self time that belongs to no node.
    pub fn record_headless(&mut self, values: &SensorValues) {
        self.total_self_time += values.self_cpu_time;
    }

    #[must_use]
    pub fn total_self_time(&self) -> MicroSeconds {
        self.total_self_time
    }

    /// Ranked hotspots, names resolved through `index`.
    ///
    /// Sorted by self time (descending); ties by id so the order is stable.
    #[must_use]
    pub fn to_hotspots(&self, index: &GlobalIndex) -> Vec<SourceNodeHotspot> {
        let mut hotspots: Vec<SourceNodeHotspot> = self
            .nodes
            .iter()
            .map(|(id, (kind, values))| {
                let percentage = if self.total_self_time > 0 {
                    (values.self_cpu_time as f64 / self.total_self_time as f64) * 100.0
                } else {
                    0.0
                };
                let locator = index.source_node_locator(*id);
                SourceNodeHotspot {
                    id: *id,
                    name: locator.map_or_else(|| id.to_string(), |l| l.identifier.to_string()),
                    module: locator.map(|l| l.module.clone()),
                    path: locator.map(|l| l.path.to_string()),
                    kind: *kind,
                    sensor_values: *values,
                    percentage,
                }
            })
            .collect();

        hotspots.sort_unstable_by_key(|h| {
            (std::cmp::Reverse(h.sensor_values.self_cpu_time), h.id)
        });
        hotspots
    }
}

/// Rank every source node of `project` by self time.
#[must_use]
pub fn analyze_hotspots(project: &ProjectReport) -> Vec<SourceNodeHotspot> {
    let mut stats = HotspotStats::new();
    for (_, report) in project.report.reports() {
        stats.record_headless(&report.headless_sensor_values);
        let files = report.intern.values().chain(report.lang_internal.values());
        for function in files.flat_map(|file| file.functions.values()) {
            stats.record(function.id, function.kind, &function.sensor_values);
        }
    }
    stats.to_hotspots(&project.global_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceNodeIdentifier;
    use crate::model::{ExecutionDetails, FileScope};

    fn create_test_report() -> ProjectReport {
        let mut project = ProjectReport::new(ExecutionDetails::default());
        let lodash = ModuleIdentifier::external("lodash", "4.17.21");

        for (module, path, name, values) in [
            (ModuleIdentifier::project(), "src/a.js", "a", SensorValues::sampled(2, 20)),
            (ModuleIdentifier::project(), "src/b.js", "b", SensorValues::sampled(1, 10)),
            (lodash, "map.js", "map", SensorValues::sampled(5, 50)),
        ] {
            let identifier =
                SourceNodeIdentifier::parse(format!("{{root}}.{{function:{name}}}")).unwrap();
            let ids = project
                .global_index
                .upsert_source_node(&module, path, &identifier)
                .unwrap();
            let report = if module.is_project() {
                &mut project.report
            } else {
                &mut project.report.module_report_mut(ids.module_id).report
            };
            report
                .file_mut(FileScope::Intern, ids.path_id, path)
                .function_mut(MetaDataKind::SourceNode, ids.source_node_id)
                .sensor_values = values;
        }
        project.report.headless_sensor_values = SensorValues::sampled(2, 20);
        project
    }

    #[test]
    fn test_analyze_hotspots_ranks_by_self_time() {
        let hotspots = analyze_hotspots(&create_test_report());

        assert_eq!(hotspots.len(), 3);
        assert_eq!(hotspots[0].name, "{root}.{function:map}"); // Highest self time first
        assert_eq!(hotspots[1].name, "{root}.{function:a}");
        assert_eq!(hotspots[2].name, "{root}.{function:b}");
    }

    #[test]
    fn test_analyze_hotspots_calculates_percentages() {
        let hotspots = analyze_hotspots(&create_test_report());

        // 80us in nodes + 20us headless
        assert!((hotspots[0].percentage - 50.0).abs() < 0.01);
        assert!((hotspots[2].percentage - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_analyze_hotspots_preserves_source_location() {
        let hotspots = analyze_hotspots(&create_test_report());

        assert_eq!(hotspots[0].module, Some(ModuleIdentifier::external("lodash", "4.17.21")));
        assert_eq!(hotspots[0].path.as_deref(), Some("map.js"));
        assert_eq!(hotspots[1].module, Some(ModuleIdentifier::project()));
    }

    #[test]
    fn test_same_node_in_two_reports_is_summed() {
        let mut stats = HotspotStats::new();
        let kind = MetaDataKind::LangInternalSourceNode;
        stats.record(SourceNodeId(4), kind, &SensorValues::sampled(1, 10));
        stats.record(SourceNodeId(4), kind, &SensorValues::sampled(2, 30));

        let hotspots = stats.to_hotspots(&GlobalIndex::new());
        assert_eq!(hotspots.len(), 1);
        assert_eq!(hotspots[0].sensor_values, SensorValues::sampled(3, 40));
        assert_eq!(hotspots[0].name, "node#4");
        assert!(hotspots[0].module.is_none());
        assert_eq!(stats.total_self_time(), 40);
    }

    #[test]
    fn test_empty_report_has_no_hotspots() {
        let project = ProjectReport::new(ExecutionDetails::default());
        assert!(analyze_hotspots(&project).is_empty());
    }
}
