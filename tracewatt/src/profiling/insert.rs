//! Profile insertion engine.
//!
//! Walks one sampled call tree and accumulates per-source-node statistics
//! into a [`ProjectReport`].
//!
//! # Walk
//!
//! The tree is walked with an explicit stack of `Enter`/`Exit` steps, so
//! arbitrarily deep profiles never recurse. Every entered call-tree node
//! opens an entry; resolved nodes additionally open a frame:
//!
//! ```text
//! Enter(node) ─► resolve ─► upsert ids ─► hits/self on node + incoming edge
//!                                         push Exit, children (reversed)
//! Exit        ─► aggregated on node (outermost occurrence only)
//!                aggregated on incoming edge + caller channel (outermost pair only)
//!                subtree time bubbles up to the parent entry
//! ```
//!
//! # Counting rules
//!
//! - `profilerHits` / `selfCPUTime` are added on every occurrence, for nodes
//!   and edges alike.
//! - A record's `aggregatedCPUTime` counts an occurrence only if no open
//!   ancestor frame writes to the same record.
//! - An edge's `aggregatedCPUTime` counts an occurrence only if the same
//!   (caller record, callee record) pair is not open higher up; the caller's
//!   intern/extern/langInternal channel grows by exactly the same amount.
//!
//! # Placement
//!
//! Project frames live in the project report, frames of module `M` in `M`'s
//! module report, language-internal frames in the `lang_internal` map of the
//! nearest enclosing non-internal frame's report. A language-internal
//! function can therefore have one record per report. Location-less nodes
//! are headless at the top of the tree and transparent beneath a resolved
//! frame.

use super::call_tree::{CallTree, CallTreeNode};
use crate::domain::{
    CodeLocation, InsertError, MicroSeconds, ModuleId, PathId, ReferenceKind, SourceNodeId,
};
use crate::model::{FileScope, MetaDataKind, ProjectReport, Report, SourceNodeMetaData};
use crate::resolution::{FrameScope, LocationResolver};
use log::{debug, info};
use std::collections::HashMap;
use std::hash::Hash;
use tracewatt_common::SensorValues;

/// Report a frame's record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ReportSlot {
    Project,
    Module(ModuleId),
}

/// Address of one source-node record.
#[derive(Debug, Clone, Copy)]
struct NodeSlot {
    report: ReportSlot,
    scope: FileScope,
    path_id: PathId,
    id: SourceNodeId,
}

impl NodeSlot {
    /// Identity of the record, for recursion bookkeeping.
    fn record(&self) -> (ReportSlot, SourceNodeId) {
        (self.report, self.id)
    }
}

type RecordKey = (ReportSlot, SourceNodeId);

/// Edge from the nearest resolved ancestor into an open frame.
#[derive(Debug, Clone, Copy)]
struct IncomingEdge {
    caller: NodeSlot,
    kind: ReferenceKind,
    counts_aggregate: bool,
}

#[derive(Debug, Clone, Copy)]
struct OpenFrame {
    node: NodeSlot,
    counts_aggregate: bool,
    incoming: Option<IncomingEdge>,
}

/// One entered call-tree node.
#[derive(Debug)]
struct OpenEntry {
    /// `None` for location-less nodes.
    frame: Option<OpenFrame>,
    /// This entry's frame, or the nearest resolved ancestor's.
    nearest: Option<OpenFrame>,
    /// Report language-internal frames opened below this entry go to.
    enclosing_report: ReportSlot,
    subtree_time: MicroSeconds,
}

enum Step {
    Enter(usize),
    Exit,
}

fn sampled(node: &CallTreeNode) -> SensorValues {
    SensorValues {
        profiler_hits: node.profiler_hits,
        self_cpu_time: node.self_time,
        ..SensorValues::default()
    }
}

/// Returns true if `key` was not open yet.
fn acquire<K: Hash + Eq>(open: &mut HashMap<K, usize>, key: K) -> bool {
    let count = open.entry(key).or_insert(0);
    *count += 1;
    *count == 1
}

fn release<K: Hash + Eq>(open: &mut HashMap<K, usize>, key: K) {
    if let Some(count) = open.get_mut(&key) {
        *count -= 1;
        if *count == 0 {
            open.remove(&key);
        }
    }
}

/// Walk state for inserting one call tree into one report.
pub struct InsertCpuProfileStateMachine<'r, R> {
    report: &'r mut ProjectReport,
    resolver: R,
    open: Vec<OpenEntry>,
    open_nodes: HashMap<RecordKey, usize>,
    open_edges: HashMap<(RecordKey, RecordKey), usize>,
    frames_entered: usize,
}

impl<'r, R: LocationResolver> InsertCpuProfileStateMachine<'r, R> {
    pub fn new(report: &'r mut ProjectReport, resolver: R) -> Self {
        Self {
            report,
            resolver,
            open: Vec::new(),
            open_nodes: HashMap::new(),
            open_edges: HashMap::new(),
            frames_entered: 0,
        }
    }

    /// Insert every node of `tree`.
    ///
    /// # Errors
    ///
    /// Fails on the first unresolvable location, index error or malformed
    /// node. The report is left partially updated and should be discarded.
    pub fn insert(mut self, tree: &CallTree) -> Result<(), InsertError> {
        let mut steps = vec![Step::Enter(CallTree::ROOT)];
        while let Some(step) = steps.pop() {
            match step {
                Step::Enter(position) => {
                    let node = tree.node(position).ok_or_else(|| {
                        InsertError::MalformedCallTree(format!("no node at position {position}"))
                    })?;
                    self.enter(node)?;
                    steps.push(Step::Exit);
                    steps.extend(node.children().iter().rev().map(|c| Step::Enter(*c)));
                }
                Step::Exit => self.exit()?,
            }
        }

        let uncommitted = self.report.global_index.has_uncommitted_changes();
        self.report.execution_details.uncommitted_changes |= uncommitted;
        debug!(
            "insert: {} frames entered, headless self time {}",
            self.frames_entered, self.report.report.headless_sensor_values.self_cpu_time
        );
        Ok(())
    }

    fn report_mut(&mut self, slot: ReportSlot) -> &mut Report {
        match slot {
            ReportSlot::Project => &mut self.report.report,
            ReportSlot::Module(id) => &mut self.report.report.module_report_mut(id).report,
        }
    }

    fn node_mut(&mut self, slot: NodeSlot) -> Result<&mut SourceNodeMetaData, InsertError> {
        self.report_mut(slot.report)
            .function_mut(slot.scope, slot.path_id, slot.id)
            .ok_or(InsertError::MissingRecord(slot.id))
    }

    fn nearest_frame(&self) -> Option<OpenFrame> {
        self.open.last().and_then(|entry| entry.nearest)
    }

    fn enclosing_report(&self) -> ReportSlot {
        self.open
            .last()
            .map_or(ReportSlot::Project, |entry| entry.enclosing_report)
    }

    fn enter(&mut self, node: &CallTreeNode) -> Result<(), InsertError> {
        if node.profiler_hits < 0 || node.self_time < 0 {
            return Err(InsertError::MalformedCallTree(format!(
                "negative sample values (profilerHits={}, selfTime={})",
                node.profiler_hits, node.self_time
            )));
        }

        let entry = match &node.location {
            Some(location) => {
                let frame = self.enter_frame(location, node)?;
                let enclosing_report = if frame.node.scope == FileScope::LangInternal {
                    self.enclosing_report()
                } else {
                    frame.node.report
                };
                OpenEntry {
                    frame: Some(frame),
                    nearest: Some(frame),
                    enclosing_report,
                    subtree_time: node.self_time,
                }
            }
            None => {
                self.enter_location_less(node)?;
                OpenEntry {
                    frame: None,
                    nearest: self.nearest_frame(),
                    enclosing_report: self.enclosing_report(),
                    subtree_time: node.self_time,
                }
            }
        };
        self.open.push(entry);
        Ok(())
    }

    fn enter_location_less(&mut self, node: &CallTreeNode) -> Result<(), InsertError> {
        let values = sampled(node);
        match self.nearest_frame() {
            Some(frame) => {
                self.node_mut(frame.node)?.sensor_values += values;
                if let Some(edge) = frame.incoming {
                    self.node_mut(edge.caller)?
                        .reference_mut(edge.kind, frame.node.id)
                        .sensor_values += values;
                }
            }
            None => {
                self.report.report.headless_sensor_values +=
                    SensorValues::sampled(node.profiler_hits, node.self_time);
            }
        }
        Ok(())
    }

    fn enter_frame(
        &mut self,
        location: &CodeLocation,
        node: &CallTreeNode,
    ) -> Result<OpenFrame, InsertError> {
        let resolved = self.resolver.resolve(location)?;
        let module = resolved.scope.module();
        let ids = self.report.global_index.upsert_source_node(
            &module,
            &resolved.path,
            &resolved.identifier,
        )?;
        if resolved.scope == FrameScope::ProjectIntern
            && self.resolver.has_uncommitted_changes(&resolved.path)
        {
            self.report
                .global_index
                .mark_uncommitted_changes(&module, &resolved.path);
        }

        let (report, scope, kind) = match &resolved.scope {
            FrameScope::ProjectIntern => (
                ReportSlot::Project,
                FileScope::Intern,
                MetaDataKind::SourceNode,
            ),
            FrameScope::ExternModule(_) => (
                ReportSlot::Module(ids.module_id),
                FileScope::Intern,
                MetaDataKind::SourceNode,
            ),
            FrameScope::LangInternal => (
                self.enclosing_report(),
                FileScope::LangInternal,
                MetaDataKind::LangInternalSourceNode,
            ),
        };
        let slot = NodeSlot {
            report,
            scope,
            path_id: ids.path_id,
            id: ids.source_node_id,
        };
        let values = sampled(node);

        self.report_mut(report)
            .file_mut(scope, ids.path_id, &resolved.path)
            .function_mut(kind, slot.id)
            .sensor_values += values;
        let counts_aggregate = acquire(&mut self.open_nodes, slot.record());

        let incoming = match self.nearest_frame() {
            Some(caller) if caller.node.id != slot.id => {
                let kind = if scope == FileScope::LangInternal {
                    ReferenceKind::LangInternal
                } else if caller.node.report == report {
                    ReferenceKind::Intern
                } else {
                    ReferenceKind::Extern
                };
                let counts_aggregate = acquire(
                    &mut self.open_edges,
                    (caller.node.record(), slot.record()),
                );
                self.node_mut(caller.node)?
                    .reference_mut(kind, slot.id)
                    .sensor_values += values;
                Some(IncomingEdge {
                    caller: caller.node,
                    kind,
                    counts_aggregate,
                })
            }
            _ => None,
        };

        self.frames_entered += 1;
        Ok(OpenFrame {
            node: slot,
            counts_aggregate,
            incoming,
        })
    }

    fn exit(&mut self) -> Result<(), InsertError> {
        let Some(entry) = self.open.pop() else {
            return Err(InsertError::MalformedCallTree(
                "exit without matching enter".to_string(),
            ));
        };
        let time = entry.subtree_time;

        if let Some(frame) = entry.frame {
            if frame.counts_aggregate {
                self.node_mut(frame.node)?.sensor_values.aggregated_cpu_time += time;
            }
            release(&mut self.open_nodes, frame.node.record());

            if let Some(edge) = frame.incoming {
                if edge.counts_aggregate {
                    let caller = self.node_mut(edge.caller)?;
                    caller
                        .reference_mut(edge.kind, frame.node.id)
                        .sensor_values
                        .aggregated_cpu_time += time;
                    caller.sensor_values.add_reference_time(edge.kind, time);
                }
                release(
                    &mut self.open_edges,
                    (edge.caller.record(), frame.node.record()),
                );
            }
        }

        if let Some(parent) = self.open.last_mut() {
            parent.subtree_time += time;
        }
        Ok(())
    }
}

impl ProjectReport {
    /// Insert one sampled call tree, resolving locations with `resolver`.
    ///
    /// # Errors
    ///
    /// See [`InsertCpuProfileStateMachine::insert`].
    pub fn insert_cpu_profile<R: LocationResolver>(
        &mut self,
        tree: &CallTree,
        resolver: R,
    ) -> Result<(), InsertError> {
        InsertCpuProfileStateMachine::new(self, resolver).insert(tree)?;
        info!(
            "Inserted call tree ({} ids indexed, {} module reports)",
            self.global_index.current_id(),
            self.report.extern_.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModuleIdentifier, ResolveError, SourceNodeIdentifier};
    use crate::model::ExecutionDetails;
    use crate::resolution::ResolvedFrame;

    /// `lang/...` files are language-internal, `mod/<name>/...` belong to
    /// module `<name>@1.0.0`, everything else is project code.
    struct PrefixResolver;

    impl LocationResolver for PrefixResolver {
        fn resolve(&self, location: &CodeLocation) -> Result<ResolvedFrame, ResolveError> {
            let scope = if location.file.starts_with("lang/") {
                FrameScope::LangInternal
            } else if let Some(rest) = location.file.strip_prefix("mod/") {
                let name = rest.split('/').next().unwrap_or_default();
                FrameScope::ExternModule(ModuleIdentifier::external(name, "1.0.0"))
            } else {
                FrameScope::ProjectIntern
            };
            Ok(ResolvedFrame {
                scope,
                path: location.file.clone(),
                identifier: SourceNodeIdentifier::parse(format!(
                    "{{root}}.{{function:{}}}",
                    location.function_name
                ))?,
            })
        }
    }

    fn frame(file: &str, function: &str, hits: i64, self_time: i64) -> CallTreeNode {
        let location = CodeLocation {
            file: file.to_string(),
            function_name: function.to_string(),
            line: 1,
            column: 1,
        };
        CallTreeNode::new(Some(location), hits, self_time)
    }

    fn insert(tree: &CallTree) -> ProjectReport {
        let mut report = ProjectReport::new(ExecutionDetails::default());
        report.insert_cpu_profile(tree, PrefixResolver).unwrap();
        report
    }

    fn node_id(
        report: &ProjectReport,
        module: &ModuleIdentifier,
        file: &str,
        function: &str,
    ) -> SourceNodeId {
        let identifier =
            SourceNodeIdentifier::parse(format!("{{root}}.{{function:{function}}}")).unwrap();
        report
            .global_index
            .module(module)
            .unwrap()
            .path(file)
            .unwrap()
            .source_node_id(&identifier)
            .unwrap()
    }

    fn module_report<'a>(report: &'a ProjectReport, module: &ModuleIdentifier) -> &'a Report {
        let module_id = report.global_index.module(module).unwrap().id();
        &report.module_report(module_id).unwrap().report
    }

    #[test]
    fn test_self_recursion_counts_aggregate_once() {
        // A -> A: aggregated equals self
        let mut tree = CallTree::new(frame("src/a.js", "A", 2, 20));
        tree.add_child(CallTree::ROOT, frame("src/a.js", "A", 1, 10));
        let report = insert(&tree);
        let a = node_id(&report, &ModuleIdentifier::project(), "src/a.js", "A");
        let a_meta = report.report.function(FileScope::Intern, a).unwrap();

        assert_eq!(a_meta.sensor_values.profiler_hits, 3);
        assert_eq!(a_meta.sensor_values.self_cpu_time, 30);
        assert_eq!(a_meta.sensor_values.aggregated_cpu_time, 30);
        assert!(a_meta.intern.is_none());
    }

    #[test]
    fn test_headless_root_goes_to_headless_values() {
        let mut tree = CallTree::new(CallTreeNode::new(None, 2, 15));
        tree.add_child(CallTree::ROOT, frame("src/a.js", "A", 1, 10));
        let report = insert(&tree);

        assert_eq!(
            report.report.headless_sensor_values,
            SensorValues::sampled(2, 15)
        );
        let a = node_id(&report, &ModuleIdentifier::project(), "src/a.js", "A");
        let a_meta = report.report.function(FileScope::Intern, a).unwrap();
        assert_eq!(a_meta.sensor_values.aggregated_cpu_time, 10);
    }

    #[test]
    fn test_location_less_child_is_transparent() {
        // A -> (gc) -> B: gc time is A's self time, B is still A's callee
        let mut tree = CallTree::new(frame("src/a.js", "A", 1, 10));
        let gc = tree.add_child(CallTree::ROOT, CallTreeNode::new(None, 1, 5));
        tree.add_child(gc, frame("src/b.js", "B", 1, 7));
        let report = insert(&tree);
        let a = node_id(&report, &ModuleIdentifier::project(), "src/a.js", "A");
        let b = node_id(&report, &ModuleIdentifier::project(), "src/b.js", "B");
        let a_meta = report.report.function(FileScope::Intern, a).unwrap();

        assert_eq!(a_meta.sensor_values.profiler_hits, 2);
        assert_eq!(a_meta.sensor_values.self_cpu_time, 15);
        assert_eq!(a_meta.sensor_values.aggregated_cpu_time, 22);
        assert_eq!(a_meta.sensor_values.intern_cpu_time, 7);
        let edge = &a_meta.intern.as_ref().unwrap()[&b];
        assert_eq!(edge.sensor_values.aggregated_cpu_time, 7);
        assert!(report.report.headless_sensor_values.is_empty());
    }

    #[test]
    fn test_lang_internal_frames_live_in_enclosing_module_report() {
        // project A -> module m.F -> lang T
        let mut tree = CallTree::new(frame("src/a.js", "A", 1, 10));
        let f = tree.add_child(CallTree::ROOT, frame("mod/m/index.js", "F", 1, 10));
        tree.add_child(f, frame("lang/timers", "T", 1, 5));
        let report = insert(&tree);

        let module = ModuleIdentifier::external("m", "1.0.0");
        let module_report = module_report(&report, &module);
        let t = node_id(&report, &ModuleIdentifier::lang_internal(), "lang/timers", "T");
        let f = node_id(&report, &module, "mod/m/index.js", "F");

        assert!(report.report.lang_internal.is_empty());
        assert_eq!(
            module_report.function(FileScope::LangInternal, t).unwrap().kind,
            MetaDataKind::LangInternalSourceNode
        );
        let f_meta = module_report.function(FileScope::Intern, f).unwrap();
        assert_eq!(f_meta.sensor_values.lang_internal_cpu_time, 5);
        assert_eq!(f_meta.sensor_values.aggregated_cpu_time, 15);
    }

    #[test]
    fn test_lang_function_reentered_in_another_report_keeps_own_aggregate() {
        // project P -> lang T -> module m.F -> lang T
        let mut tree = CallTree::new(frame("src/p.js", "P", 1, 10));
        let outer_t = tree.add_child(CallTree::ROOT, frame("lang/timers", "T", 1, 10));
        let f = tree.add_child(outer_t, frame("mod/m/index.js", "F", 1, 10));
        tree.add_child(f, frame("lang/timers", "T", 1, 10));
        let report = insert(&tree);

        let module = ModuleIdentifier::external("m", "1.0.0");
        let t = node_id(&report, &ModuleIdentifier::lang_internal(), "lang/timers", "T");
        let f = node_id(&report, &module, "mod/m/index.js", "F");

        let project_t = report.report.function(FileScope::LangInternal, t).unwrap();
        assert_eq!(project_t.sensor_values.self_cpu_time, 10);
        assert_eq!(project_t.sensor_values.aggregated_cpu_time, 30);
        assert_eq!(project_t.sensor_values.extern_cpu_time, 20);

        let module_report = module_report(&report, &module);
        let module_t = module_report.function(FileScope::LangInternal, t).unwrap();
        assert_eq!(module_t.sensor_values.self_cpu_time, 10);
        assert_eq!(module_t.sensor_values.aggregated_cpu_time, 10);

        let f_meta = module_report.function(FileScope::Intern, f).unwrap();
        let f_to_t = &f_meta.lang_internal.as_ref().unwrap()[&t];
        assert_eq!(f_to_t.sensor_values.aggregated_cpu_time, 10);
        assert_eq!(f_meta.sensor_values.lang_internal_cpu_time, 10);
        assert_eq!(f_meta.sensor_values.aggregated_cpu_time, 20);
    }

    #[test]
    fn test_negative_values_are_rejected() {
        let mut report = ProjectReport::new(ExecutionDetails::default());
        let tree = CallTree::new(frame("src/a.js", "A", -1, 10));
        let err = report.insert_cpu_profile(&tree, PrefixResolver).unwrap_err();
        assert!(matches!(err, InsertError::MalformedCallTree(_)));
    }

    #[test]
    fn test_edge_hits_are_additive_per_occurrence() {
        let mut tree = CallTree::new(frame("src/a.js", "A", 0, 0));
        tree.add_child(CallTree::ROOT, frame("src/b.js", "B", 2, 20));
        tree.add_child(CallTree::ROOT, frame("src/b.js", "B", 3, 30));
        let report = insert(&tree);
        let a = node_id(&report, &ModuleIdentifier::project(), "src/a.js", "A");
        let b = node_id(&report, &ModuleIdentifier::project(), "src/b.js", "B");
        let a_meta = report.report.function(FileScope::Intern, a).unwrap();
        let edge = a_meta.intern.as_ref().unwrap()[&b].sensor_values;

        assert_eq!(edge.profiler_hits, 5);
        assert_eq!(edge.self_cpu_time, 50);
        assert_eq!(edge.aggregated_cpu_time, 50);
    }

    #[test]
    fn test_deep_location_less_chain_stays_attributed() {
        // A -> 5000 location-less frames -> B
        let mut tree = CallTree::new(frame("src/a.js", "A", 0, 0));
        let mut parent = CallTree::ROOT;
        for _ in 0..5_000 {
            parent = tree.add_child(parent, CallTreeNode::new(None, 1, 1));
        }
        tree.add_child(parent, frame("src/b.js", "B", 1, 3));
        let report = insert(&tree);
        let a = node_id(&report, &ModuleIdentifier::project(), "src/a.js", "A");
        let a_meta = report.report.function(FileScope::Intern, a).unwrap();

        assert_eq!(a_meta.sensor_values.self_cpu_time, 5_000);
        assert_eq!(a_meta.sensor_values.aggregated_cpu_time, 5_003);
        assert_eq!(a_meta.sensor_values.intern_cpu_time, 3);
    }
}
