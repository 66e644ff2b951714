//! Cleaned sampled call tree, the input of the insertion engine.
//!
//! Nodes are stored flat and children refer to other nodes by id, the same
//! way `.cpuprofile` does, so trees of any depth load without recursion:
//!
//! ```text
//! { "nodes": [
//!     { "id": 1, "location": { "file", "functionName", "line", "column" } | null,
//!       "profilerHits": 3, "selfTime": 30, "children": [2, 5] },
//!     ...
//! ] }
//! ```
//!
//! The first node is the root. `selfTime` is in microseconds. `children` is
//! required on every node.

use crate::domain::{CodeLocation, ImportError, MicroSeconds};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTreeNode {
    pub location: Option<CodeLocation>,
    pub profiler_hits: i64,
    pub self_time: MicroSeconds,
    children: Vec<usize>,
}

impl CallTreeNode {
    pub fn new(
        location: Option<CodeLocation>,
        profiler_hits: i64,
        self_time: MicroSeconds,
    ) -> Self {
        Self {
            location,
            profiler_hits,
            self_time,
            children: Vec::new(),
        }
    }

    /// Positions of the children in [`CallTree::nodes`], in call order.
    #[must_use]
    pub fn children(&self) -> &[usize] {
        &self.children
    }
}

/// Arena of call-tree nodes; position [`CallTree::ROOT`] is the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCallTree", into = "RawCallTree")]
pub struct CallTree {
    nodes: Vec<CallTreeNode>,
}

impl CallTree {
    pub const ROOT: usize = 0;

    pub fn new(root: CallTreeNode) -> Self {
        let root = CallTreeNode {
            children: Vec::new(),
            ..root
        };
        Self { nodes: vec![root] }
    }

    /// Append `node` as the last child of `parent`, returning its position.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not a position in this tree.
    pub fn add_child(&mut self, parent: usize, node: CallTreeNode) -> usize {
        let position = self.nodes.len();
        self.nodes[parent].children.push(position);
        self.nodes.push(CallTreeNode {
            children: Vec::new(),
            ..node
        });
        position
    }

    #[must_use]
    pub fn root(&self) -> &CallTreeNode {
        &self.nodes[Self::ROOT]
    }

    #[must_use]
    pub fn node(&self, position: usize) -> Option<&CallTreeNode> {
        self.nodes.get(position)
    }

    #[must_use]
    pub fn nodes(&self) -> &[CallTreeNode] {
        &self.nodes
    }

    /// Sum of self times over the whole tree.
    #[must_use]
    pub fn total_time(&self) -> MicroSeconds {
        self.nodes.iter().map(|node| node.self_time).sum()
    }

    /// Parse a call-tree JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Io`] if the file can't be read and
    /// [`ImportError::Json`] if it is not a well-formed call tree.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// # Errors
    ///
    /// Returns [`ImportError::Json`] if the input is not a well-formed call
    /// tree (unknown child ids, shared children, unreachable nodes).
    pub fn from_reader(reader: impl Read) -> Result<Self, ImportError> {
        Ok(serde_json::from_reader(reader)?)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    id: u64,
    #[serde(default)]
    location: Option<CodeLocation>,
    #[serde(default)]
    profiler_hits: i64,
    #[serde(default)]
    self_time: MicroSeconds,
    children: Vec<u64>,
}

#[derive(Serialize, Deserialize)]
struct RawCallTree {
    nodes: Vec<RawNode>,
}

impl TryFrom<RawCallTree> for CallTree {
    type Error = ImportError;

    fn try_from(raw: RawCallTree) -> Result<Self, ImportError> {
        if raw.nodes.is_empty() {
            return Err(ImportError::InvalidProfile("call tree has no nodes".to_string()));
        }

        let mut positions: HashMap<u64, usize> = HashMap::with_capacity(raw.nodes.len());
        for (position, node) in raw.nodes.iter().enumerate() {
            if positions.insert(node.id, position).is_some() {
                return Err(ImportError::InvalidProfile(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
        }

        let mut has_parent = vec![false; raw.nodes.len()];
        let mut nodes = Vec::with_capacity(raw.nodes.len());
        for node in raw.nodes {
            let id = node.id;
            let mut children = Vec::with_capacity(node.children.len());
            for child in node.children {
                let position = *positions.get(&child).ok_or_else(|| {
                    ImportError::InvalidProfile(format!("node {id} has unknown child {child}"))
                })?;
                if position == Self::ROOT || std::mem::replace(&mut has_parent[position], true) {
                    return Err(ImportError::InvalidProfile(format!(
                        "node {child} has several parents"
                    )));
                }
                children.push(position);
            }
            nodes.push(CallTreeNode {
                location: node.location,
                profiler_hits: node.profiler_hits,
                self_time: node.self_time,
                children,
            });
        }

        // Single parents only, so a walk from the root visits each node once
        let mut reached = 0usize;
        let mut stack = vec![Self::ROOT];
        while let Some(position) = stack.pop() {
            reached += 1;
            stack.extend(nodes[position].children.iter().copied());
        }
        if reached != nodes.len() {
            return Err(ImportError::InvalidProfile(format!(
                "{} nodes are not reachable from the root",
                nodes.len() - reached
            )));
        }

        Ok(Self { nodes })
    }
}

impl From<CallTree> for RawCallTree {
    fn from(tree: CallTree) -> Self {
        let nodes = tree
            .nodes
            .into_iter()
            .enumerate()
            .map(|(position, node)| RawNode {
                id: position as u64,
                location: node.location,
                profiler_hits: node.profiler_hits,
                self_time: node.self_time,
                children: node.children.into_iter().map(|c| c as u64).collect(),
            })
            .collect();
        Self { nodes }
    }
}
