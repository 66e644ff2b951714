//! Directory tree of source files with aggregated statistics.
//!
//! ```text
//! (root)
//! ├── src/                    Directory
//! │   └── main.js             File       (project report)
//! ├── {lang}/                 LangInternal
//! │   └── node:internal/
//! │       └── timers          File
//! └── lodash@4.17.21/         Module
//!     ├── map.js              File       (module report)
//!     └── {lang}/             LangInternal
//! ```
//!
//! Every node carries `total` (field-wise sum) and `max` (field-wise
//! maximum) over the functions of all files below it. Both are updated on
//! every ancestor when a file is inserted. The tree is derived from a report
//! and never changes it.

use super::call_graph::{GraphNodeKey, SourceNodeGraph};
use crate::domain::{
    GraphError, ModuleId, ModuleIdentifier, PathId, ReportInternId, SourceNodeId, ValidationError,
};
use crate::model::{FileScope, ProjectReport, SourceFileMetaData};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracewatt_common::SensorValues;

/// Aggregate of a whole (sub)tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "aggregate")]
pub struct AggregateMetaData {
    pub total: SensorValues,
    pub max: SensorValues,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNodeKind {
    Root,
    Directory,
    /// One file of one report
    File {
        report: ReportInternId,
        scope: FileScope,
        path_id: PathId,
        path: String,
    },
    Module {
        module_id: ModuleId,
    },
    /// Language-internal files of the enclosing report
    LangInternal,
}

impl TreeNodeKind {
    fn is_container(&self) -> bool {
        !matches!(self, TreeNodeKind::File { .. })
    }
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub name: String,
    pub kind: TreeNodeKind,
    pub total: SensorValues,
    pub max: SensorValues,
    /// Sensor values per function; empty for everything but files
    pub functions: BTreeMap<SourceNodeId, SensorValues>,
    /// Files at or below this node
    files: usize,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl TreeNode {
    fn new(name: impl Into<String>, kind: TreeNodeKind, parent: Option<usize>) -> Self {
        Self {
            name: name.into(),
            kind,
            total: SensorValues::default(),
            max: SensorValues::default(),
            functions: BTreeMap::new(),
            files: 0,
            parent,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    #[must_use]
    pub fn aggregate(&self) -> AggregateMetaData {
        AggregateMetaData {
            total: self.total,
            max: self.max,
        }
    }
}

/// Arena-backed file tree; index 0 is the root.
#[derive(Debug, Clone)]
pub struct SourceFileMetaDataTree {
    nodes: Vec<TreeNode>,
    /// (parent, name, is directory) → container
    containers: HashMap<(usize, String, bool), usize>,
}

const ROOT: usize = 0;

impl Default for SourceFileMetaDataTree {
    fn default() -> Self {
        Self {
            nodes: vec![TreeNode::new("", TreeNodeKind::Root, None)],
            containers: HashMap::new(),
        }
    }
}

impl SourceFileMetaDataTree {
    /// Build the tree of `project` and all nested module reports.
    ///
    /// Report positions follow the same order as
    /// [`SourceNodeGraph::from_report`], so file nodes and graph nodes agree
    /// on [`ReportInternId`]s.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownModule`] if a module report is not in the
    /// index.
    pub fn from_report(project: &ProjectReport) -> Result<Self, GraphError> {
        let mut tree = Self::default();

        for (position, (module, report)) in project.report.reports().into_iter().enumerate() {
            let report_id = ReportInternId(u32::try_from(position).unwrap_or(u32::MAX));
            let base = match module {
                None => ROOT,
                Some(module_id) => {
                    let identifier = project
                        .global_index
                        .module_identifier(module_id)
                        .ok_or(GraphError::UnknownModule(module_id))?;
                    tree.container(ROOT, identifier.as_str(), TreeNodeKind::Module { module_id })
                }
            };

            for file in report.intern.values() {
                tree.insert_file(
                    base,
                    report_id,
                    FileScope::Intern,
                    file.path.as_str(),
                    file.path_id,
                    file_functions(file),
                );
            }
            if !report.lang_internal.is_empty() {
                let lang = tree.container(
                    base,
                    ModuleIdentifier::LANG_INTERNAL,
                    TreeNodeKind::LangInternal,
                );
                for file in report.lang_internal.values() {
                    tree.insert_file(
                        lang,
                        report_id,
                        FileScope::LangInternal,
                        file.path.as_str(),
                        file.path_id,
                        file_functions(file),
                    );
                }
            }
        }
        Ok(tree)
    }

    /// Existing container `name` below `parent`, created on first use.
    fn container(&mut self, parent: usize, name: &str, kind: TreeNodeKind) -> usize {
        let key = (parent, name.to_string(), kind == TreeNodeKind::Directory);
        if let Some(existing) = self.containers.get(&key) {
            return *existing;
        }
        let index = self.push(TreeNode::new(name, kind, Some(parent)));
        self.containers.insert(key, index);
        index
    }

    fn push(&mut self, node: TreeNode) -> usize {
        let index = self.nodes.len();
        if let Some(parent) = node.parent {
            self.nodes[parent].children.push(index);
        }
        self.nodes.push(node);
        index
    }

    /// Insert a file at its directory position below `base` and update the
    /// aggregates of every ancestor.
    fn insert_file(
        &mut self,
        base: usize,
        report: ReportInternId,
        scope: FileScope,
        path: &str,
        path_id: PathId,
        functions: BTreeMap<SourceNodeId, SensorValues>,
    ) {
        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let name = segments.pop().unwrap_or(path);

        let mut parent = base;
        for directory in segments {
            parent = self.container(parent, directory, TreeNodeKind::Directory);
        }

        let mut file = TreeNode::new(
            name,
            TreeNodeKind::File {
                report,
                scope,
                path_id,
                path: path.to_string(),
            },
            Some(parent),
        );
        file.total = functions.values().copied().sum();
        file.max = SensorValues::max_of(functions.values());
        file.functions = functions;
        file.files = 1;
        let (total, max) = (file.total, file.max);
        self.push(file);

        let mut ancestor = Some(parent);
        while let Some(index) = ancestor {
            let node = &mut self.nodes[index];
            node.total += total;
            node.max = if node.files == 0 {
                max
            } else {
                node.max.max(&max)
            };
            node.files += 1;
            ancestor = node.parent;
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[must_use]
    pub fn root(&self) -> &TreeNode {
        &self.nodes[ROOT]
    }

    #[must_use]
    pub fn node(&self, index: usize) -> Option<&TreeNode> {
        self.nodes.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the tree holds no file.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Aggregate over every file of every report.
    #[must_use]
    pub fn total_aggregated_source_meta_data(&self) -> AggregateMetaData {
        self.root().aggregate()
    }

    /// Pre-order traversal as `(depth, index, node)`; children in insertion
    /// order.
    #[must_use]
    pub fn depth_first(&self) -> Vec<(usize, usize, &TreeNode)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(0, ROOT)];
        while let Some((depth, index)) = stack.pop() {
            let node = &self.nodes[index];
            out.push((depth, index, node));
            stack.extend(node.children.iter().rev().map(|child| (depth + 1, *child)));
        }
        out
    }

    /// Names from the root down to `index`, joined by `/`.
    #[must_use]
    pub fn display_path(&self, index: usize) -> String {
        let mut names = Vec::new();
        let mut current = Some(index);
        while let Some(i) = current {
            let node = &self.nodes[i];
            if node.kind != TreeNodeKind::Root {
                names.push(node.name.as_str());
            }
            current = node.parent;
        }
        names.reverse();
        names.join("/")
    }

    /// Recompute every aggregate and compare with the stored values.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::AggregateMismatch`] for the first node whose
    /// stored `total` or `max` differs from the recomputed one.
    pub fn validate(&self) -> Result<(), ValidationError> {
        // `None` for subtrees without files
        let mut recomputed: Vec<Option<AggregateMetaData>> = vec![None; self.nodes.len()];

        // Children always come after their parent
        for index in (0..self.nodes.len()).rev() {
            let node = &self.nodes[index];
            let expected = if node.kind.is_container() {
                node.children
                    .iter()
                    .filter_map(|child| recomputed[*child])
                    .reduce(|acc, child| AggregateMetaData {
                        total: acc.total + child.total,
                        max: acc.max.max(&child.max),
                    })
            } else {
                Some(AggregateMetaData {
                    total: node.functions.values().copied().sum(),
                    max: SensorValues::max_of(node.functions.values()),
                })
            };

            let found = expected.unwrap_or_default();
            for (channel, expected, actual) in [
                ("total", found.total, node.total),
                ("max", found.max, node.max),
            ] {
                if expected != actual {
                    return Err(ValidationError::AggregateMismatch {
                        node: self.display_path(index),
                        channel,
                        expected,
                        actual,
                    });
                }
            }
            recomputed[index] = expected;
        }
        Ok(())
    }

    /// A new tree holding only the functions that are an entry or reachable
    /// from one. Files and directories left without functions are dropped.
    #[must_use]
    pub fn filter(&self, graph: &mut SourceNodeGraph, entries: &[GraphNodeKey]) -> Self {
        let kept = graph.reachable_from_entries(entries);
        let mut filtered = Self::default();

        for node in &self.nodes {
            let TreeNodeKind::File {
                report,
                scope,
                path_id,
                path,
            } = &node.kind
            else {
                continue;
            };
            let functions: BTreeMap<_, _> = node
                .functions
                .iter()
                .filter(|(id, _)| kept.contains(&GraphNodeKey::new(*report, **id)))
                .map(|(id, values)| (*id, *values))
                .collect();
            if functions.is_empty() {
                continue;
            }

            let base = filtered.copy_containers(self, node.parent.unwrap_or(ROOT));
            filtered.insert_file(base, *report, *scope, path, *path_id, functions);
        }
        filtered
    }

    /// Recreate the module and `{lang}` containers above `parent` of
    /// `source`; directories are rebuilt from the file path.
    fn copy_containers(&mut self, source: &Self, parent: usize) -> usize {
        let mut chain = Vec::new();
        let mut current = Some(parent);
        while let Some(index) = current {
            let node = &source.nodes[index];
            if matches!(node.kind, TreeNodeKind::Module { .. } | TreeNodeKind::LangInternal) {
                chain.push(index);
            }
            current = node.parent;
        }

        let mut base = ROOT;
        for index in chain.into_iter().rev() {
            let node = &source.nodes[index];
            base = self.container(base, &node.name, node.kind.clone());
        }
        base
    }
}

fn file_functions(file: &SourceFileMetaData) -> BTreeMap<SourceNodeId, SensorValues> {
    file.functions
        .iter()
        .map(|(id, function)| (*id, function.sensor_values))
        .collect()
}
