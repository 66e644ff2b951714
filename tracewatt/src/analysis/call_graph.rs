//! Call graph over every report of a [`ProjectReport`].
//!
//! Nodes live in an arena and are addressed by [`GraphNodeKey`], the pair of
//! the owning report's position and the node's id. The same id can occur in
//! several reports (a language-internal function called from two modules),
//! so the id alone is not a key.
//!
//! ```text
//! report#0 (project)        report#1 (lodash@4.17.21)
//!   main ──intern──► run       map ──lang_internal──► Array.map
//!     │                         ▲
//!     └───────extern────────────┘
//! ```
//!
//! # Reachability
//!
//! [`SourceNodeGraph::reachability_for_node`] runs an explicit-stack DFS and
//! memoizes the result per start node. A traversal that meets a node with a
//! cached set takes the whole set without walking it again.

use crate::domain::{GraphError, ModuleId, ReferenceKind, ReportInternId, SourceNodeId};
use crate::model::{MetaDataKind, ProjectReport, Report};
use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracewatt_common::SensorValues;

/// Address of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphNodeKey {
    pub report: ReportInternId,
    pub id: SourceNodeId,
}

impl GraphNodeKey {
    #[must_use]
    pub fn new(report: ReportInternId, id: SourceNodeId) -> Self {
        Self { report, id }
    }
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub key: GraphNodeKey,
    pub kind: MetaDataKind,
    pub sensor_values: SensorValues,
    /// Arena index of the callee → edge values
    outgoing: BTreeMap<usize, SensorValues>,
    /// Arena index of the caller → edge values
    incoming: BTreeMap<usize, SensorValues>,
}

impl GraphNode {
    #[must_use]
    pub fn out_degree(&self) -> usize {
        self.outgoing.len()
    }

    #[must_use]
    pub fn in_degree(&self) -> usize {
        self.incoming.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceNodeGraph {
    nodes: Vec<GraphNode>,
    lookup: HashMap<GraphNodeKey, usize>,
    report_ids: HashMap<ModuleId, ReportInternId>,
    reachable: HashMap<usize, BTreeSet<usize>>,
}

impl SourceNodeGraph {
    /// Build the graph of `project` and all nested module reports.
    ///
    /// # Errors
    ///
    /// - [`GraphError::UnknownModule`] if a module report is not in the index
    /// - [`GraphError::UnresolvedReference`] if an edge points at a node no
    ///   report contains
    /// - [`GraphError::MissingModuleReport`] if an extern edge points into a
    ///   module that has no report
    pub fn from_report(project: &ProjectReport) -> Result<Self, GraphError> {
        let mut graph = Self::default();
        let reports = project.report.reports();

        for (position, (module, _)) in reports.iter().enumerate() {
            let report_id = ReportInternId(u32::try_from(position).unwrap_or(u32::MAX));
            if let Some(module_id) = module {
                if project.global_index.module_identifier(*module_id).is_none() {
                    return Err(GraphError::UnknownModule(*module_id));
                }
                graph.report_ids.insert(*module_id, report_id);
            }
        }

        let mut positioned = Vec::with_capacity(reports.len());
        for (position, (_, report)) in reports.iter().enumerate() {
            let report_id = ReportInternId(u32::try_from(position).unwrap_or(u32::MAX));
            graph.add_nodes(report_id, report);
            positioned.push((report_id, *report));
        }
        for (report_id, report) in positioned {
            graph.add_edges(project, report_id, report)?;
        }

        debug!(
            "call graph: {} nodes from {} reports",
            graph.nodes.len(),
            reports.len()
        );
        Ok(graph)
    }

    fn add_nodes(&mut self, report_id: ReportInternId, report: &Report) {
        let files = report.intern.values().chain(report.lang_internal.values());
        for function in files.flat_map(|file| file.functions.values()) {
            let key = GraphNodeKey::new(report_id, function.id);
            self.lookup.insert(key, self.nodes.len());
            self.nodes.push(GraphNode {
                key,
                kind: function.kind,
                sensor_values: function.sensor_values,
                outgoing: BTreeMap::new(),
                incoming: BTreeMap::new(),
            });
        }
    }

    fn add_edges(
        &mut self,
        project: &ProjectReport,
        report_id: ReportInternId,
        report: &Report,
    ) -> Result<(), GraphError> {
        let files = report.intern.values().chain(report.lang_internal.values());
        for function in files.flat_map(|file| file.functions.values()) {
            let key = GraphNodeKey::new(report_id, function.id);
            let Some(from) = self.lookup.get(&key).copied() else {
                continue;
            };

            for (kind, target, values) in function.all_references() {
                let target_report = match kind {
                    ReferenceKind::Intern | ReferenceKind::LangInternal => report_id,
                    ReferenceKind::Extern => self.extern_report(project, function.id, target)?,
                };
                let to = self
                    .lookup
                    .get(&GraphNodeKey::new(target_report, target))
                    .copied()
                    .ok_or(GraphError::UnresolvedReference {
                        from: function.id,
                        target,
                    })?;

                *self.nodes[from].outgoing.entry(to).or_default() += *values;
                *self.nodes[to].incoming.entry(from).or_default() += *values;
            }
        }
        Ok(())
    }

    /// Report holding the target of an extern edge.
    fn extern_report(
        &self,
        project: &ProjectReport,
        from: SourceNodeId,
        target: SourceNodeId,
    ) -> Result<ReportInternId, GraphError> {
        let locator = project
            .global_index
            .source_node_locator(target)
            .ok_or(GraphError::UnresolvedReference { from, target })?;
        if locator.module.is_project() {
            return Ok(ReportInternId::PROJECT);
        }
        if locator.module.is_lang_internal() {
            return Err(GraphError::UnresolvedReference { from, target });
        }
        self.report_ids
            .get(&locator.module_id)
            .copied()
            .ok_or_else(|| GraphError::MissingModuleReport(locator.module.clone()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter()
    }

    #[must_use]
    pub fn node(&self, key: GraphNodeKey) -> Option<&GraphNode> {
        self.lookup.get(&key).map(|index| &self.nodes[*index])
    }

    /// Position of a module's report in this graph.
    #[must_use]
    pub fn report_intern_id_for_module(&self, module: ModuleId) -> Option<ReportInternId> {
        self.report_ids.get(&module).copied()
    }

    /// Values of the edge `from → to`, if the call happened.
    #[must_use]
    pub fn edge(&self, from: GraphNodeKey, to: GraphNodeKey) -> Option<&SensorValues> {
        let from = self.lookup.get(&from)?;
        let to = self.lookup.get(&to)?;
        self.nodes[*from].outgoing.get(to)
    }

    /// Callees of `key` with the edge values.
    pub fn callees(
        &self,
        key: GraphNodeKey,
    ) -> impl Iterator<Item = (GraphNodeKey, &SensorValues)> {
        self.neighbours(key, |node| &node.outgoing)
    }

    /// Callers of `key` with the edge values.
    pub fn callers(
        &self,
        key: GraphNodeKey,
    ) -> impl Iterator<Item = (GraphNodeKey, &SensorValues)> {
        self.neighbours(key, |node| &node.incoming)
    }

    fn neighbours<'g>(
        &'g self,
        key: GraphNodeKey,
        edges: impl Fn(&'g GraphNode) -> &'g BTreeMap<usize, SensorValues>,
    ) -> impl Iterator<Item = (GraphNodeKey, &'g SensorValues)> {
        self.lookup
            .get(&key)
            .map(|index| edges(&self.nodes[*index]))
            .into_iter()
            .flat_map(move |map| {
                map.iter()
                    .map(move |(other, values)| (self.nodes[*other].key, values))
            })
    }

    // ========================================================================
    // Reachability
    // ========================================================================

    /// Every node reachable from `key` over one or more edges.
    ///
    /// `key` itself is part of the result only if it lies on a cycle.
    /// Returns `None` for unknown keys.
    pub fn reachability_for_node(
        &mut self,
        key: GraphNodeKey,
    ) -> Option<BTreeSet<GraphNodeKey>> {
        let start = *self.lookup.get(&key)?;
        let reached = self.reachable_from(start);
        Some(reached.into_iter().map(|index| self.nodes[index].key).collect())
    }

    /// Reachability of every node.
    pub fn reachability(&mut self) -> BTreeMap<GraphNodeKey, BTreeSet<GraphNodeKey>> {
        if self.reachable.len() < self.nodes.len() {
            for index in 0..self.nodes.len() {
                if !self.reachable.contains_key(&index) {
                    self.reachable_from(index);
                }
            }
        }
        self.reachable
            .iter()
            .map(|(index, reached)| {
                let keys = reached.iter().map(|other| self.nodes[*other].key).collect();
                (self.nodes[*index].key, keys)
            })
            .collect()
    }

    /// The entries plus everything reachable from them; unknown keys are
    /// ignored.
    pub fn reachable_from_entries(&mut self, entries: &[GraphNodeKey]) -> BTreeSet<GraphNodeKey> {
        let mut out = BTreeSet::new();
        for entry in entries {
            if let Some(reached) = self.reachability_for_node(*entry) {
                out.insert(*entry);
                out.extend(reached);
            }
        }
        out
    }

    fn reachable_from(&mut self, start: usize) -> BTreeSet<usize> {
        if let Some(cached) = self.reachable.get(&start) {
            return cached.clone();
        }

        let mut reached = BTreeSet::new();
        let mut stack: Vec<usize> = self.nodes[start].outgoing.keys().copied().collect();
        while let Some(index) = stack.pop() {
            if !reached.insert(index) {
                continue;
            }
            if let Some(cached) = self.reachable.get(&index) {
                reached.extend(cached.iter().copied());
                continue;
            }
            stack.extend(
                self.nodes[index]
                    .outgoing
                    .keys()
                    .copied()
                    .filter(|next| !reached.contains(next)),
            );
        }

        self.reachable.insert(start, reached.clone());
        reached
    }
}
