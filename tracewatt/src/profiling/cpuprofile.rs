//! V8 `.cpuprofile` import.
//!
//! Converts the standalone DevTools format (`nodes`, `samples`,
//! `timeDeltas`) into a cleaned [`CallTree`]:
//!
//! - each sample lasts until the next sample, i.e. its duration is the
//!   *following* time delta; the last sample runs until `endTime`
//! - negative deltas (clock adjustments) are clamped to zero
//! - frames without a url (`(root)`, `(program)`, `(garbage collector)`,
//!   native builtins) carry no location
//! - V8's 0-based line/column numbers become 1-based

use super::call_tree::{CallTree, CallTreeNode};
use crate::domain::{CodeLocation, ImportError, MicroSeconds};
use log::{debug, warn};
use serde::{Deserialize, Deserializer};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

/// Standalone V8 CPU profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuProfile {
    pub nodes: Vec<ProfileNode>,
    /// Profile start time in microseconds
    pub start_time: i64,
    /// Profile end time in microseconds
    pub end_time: i64,
    /// Node id at the top of the stack for each sample
    #[serde(default)]
    pub samples: Vec<u64>,
    /// Microseconds between consecutive samples
    #[serde(default)]
    pub time_deltas: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileNode {
    pub id: u64,
    pub call_frame: CallFrame,
    #[serde(default)]
    pub hit_count: u64,
    #[serde(default)]
    pub children: Vec<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    #[serde(default)]
    pub function_name: String,
    #[serde(default, deserialize_with = "deserialize_script_id")]
    pub script_id: String,
    #[serde(default)]
    pub url: String,
    /// 0-based, -1 if unknown
    #[serde(default = "unknown_position")]
    pub line_number: i64,
    /// 0-based, -1 if unknown
    #[serde(default = "unknown_position")]
    pub column_number: i64,
}

fn unknown_position() -> i64 {
    -1
}

// Older profiles write scriptId as a number, newer ones as a string
fn deserialize_script_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

impl CallFrame {
    fn location(&self) -> Option<CodeLocation> {
        if self.url.is_empty() {
            return None;
        }
        let one_based = |n: i64| u32::try_from(n + 1).unwrap_or(0);
        Some(CodeLocation {
            file: self.url.clone(),
            function_name: self.function_name.clone(),
            line: one_based(self.line_number),
            column: one_based(self.column_number),
        })
    }
}

impl CpuProfile {
    /// Parse a `.cpuprofile` file.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Io`] or [`ImportError::Json`] if the file
    /// can't be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// # Errors
    ///
    /// Returns [`ImportError::Json`] if the input is not a cpuprofile.
    pub fn from_reader(reader: impl Read) -> Result<Self, ImportError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Per-sample durations, clamped to be non-negative.
    fn sample_durations(&self) -> Vec<MicroSeconds> {
        let mut clamped = 0usize;
        let mut clamp = |delta: i64| {
            if delta < 0 {
                clamped += 1;
                0
            } else {
                delta
            }
        };

        let mut durations = Vec::with_capacity(self.samples.len());
        let mut timestamp = self.start_time;
        for i in 0..self.samples.len() {
            timestamp += self.time_deltas.get(i).copied().unwrap_or(0);
            let duration = match self.time_deltas.get(i + 1) {
                Some(next) => *next,
                None => self.end_time - timestamp,
            };
            durations.push(clamp(duration));
        }

        if clamped > 0 {
            warn!("cpuprofile: clamped {clamped} negative sample durations to zero");
        }
        durations
    }

    /// Convert into a cleaned call tree.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::InvalidProfile`] for empty profiles, unknown
    /// node ids, nodes with several parents and cycles.
    pub fn to_call_tree(&self) -> Result<CallTree, ImportError> {
        let nodes: HashMap<u64, &ProfileNode> = self.nodes.iter().map(|n| (n.id, n)).collect();
        if nodes.len() != self.nodes.len() {
            return Err(ImportError::InvalidProfile("duplicate node ids".to_string()));
        }

        // Self time and hits per node
        let mut samples: HashMap<u64, (i64, MicroSeconds)> = HashMap::new();
        for (id, duration) in self.samples.iter().zip(self.sample_durations()) {
            if !nodes.contains_key(id) {
                return Err(ImportError::InvalidProfile(format!(
                    "sample references unknown node {id}"
                )));
            }
            let entry = samples.entry(*id).or_default();
            entry.0 += 1;
            entry.1 += duration;
        }

        let root = self.root(&nodes)?;
        let sampled_node = |id: u64, node: &ProfileNode| {
            let (hits, self_time) = samples.get(&id).copied().unwrap_or_default();
            CallTreeNode::new(node.call_frame.location(), hits, self_time)
        };

        // Children are appended in call order when their parent is popped
        let mut tree = CallTree::new(sampled_node(root.id, root));
        let mut visited: HashSet<u64> = HashSet::from([root.id]);
        let mut stack = vec![(root, CallTree::ROOT)];
        while let Some((parent, position)) = stack.pop() {
            for child in &parent.children {
                let node = nodes.get(child).ok_or_else(|| {
                    ImportError::InvalidProfile(format!("unknown child node {child}"))
                })?;
                if !visited.insert(*child) {
                    return Err(ImportError::InvalidProfile(format!(
                        "node {child} has several parents or forms a cycle"
                    )));
                }
                let child_position = tree.add_child(position, sampled_node(*child, *node));
                stack.push((*node, child_position));
            }
        }
        if visited.len() != nodes.len() {
            return Err(ImportError::InvalidProfile(format!(
                "{} nodes are not reachable from the root",
                nodes.len() - visited.len()
            )));
        }

        debug!(
            "cpuprofile: {} nodes, {} samples, {}us sampled",
            self.nodes.len(),
            self.samples.len(),
            tree.total_time()
        );
        Ok(tree)
    }

    /// The single node that is nobody's child.
    fn root<'a>(
        &'a self,
        nodes: &HashMap<u64, &ProfileNode>,
    ) -> Result<&'a ProfileNode, ImportError> {
        let parented: HashSet<u64> =
            nodes.values().flat_map(|n| n.children.iter().copied()).collect();
        let mut roots = self.nodes.iter().filter(|n| !parented.contains(&n.id));
        match (roots.next(), roots.next()) {
            (Some(root), None) => Ok(root),
            (None, _) => Err(ImportError::InvalidProfile("no root node".to_string())),
            (Some(_), Some(_)) => Err(ImportError::InvalidProfile(
                "several root nodes".to_string(),
            )),
        }
    }
}
