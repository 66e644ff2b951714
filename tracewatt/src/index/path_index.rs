//! Per-path index: dotted identifiers → source-node ids.

use super::source_node_index::{SourceNodeChildren, SourceNodeIndex};
use super::{IdAllocator, IdClaims, IndexMode};
use crate::domain::{IndexError, PathId, SourceNodeId, SourceNodeIdentifier};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Index of one file path inside a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathIndex {
    id: PathId,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    contains_uncommitted_changes: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    nodes: SourceNodeChildren,

    /// Reverse map, rebuilt on load
    #[serde(skip)]
    node_ids: HashMap<SourceNodeId, SourceNodeIdentifier>,
}

impl PathIndex {
    pub(crate) fn new(id: PathId) -> Self {
        Self {
            id,
            contains_uncommitted_changes: false,
            nodes: BTreeMap::new(),
            node_ids: HashMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> PathId {
        self.id
    }

    #[must_use]
    pub fn contains_uncommitted_changes(&self) -> bool {
        self.contains_uncommitted_changes
    }

    pub(crate) fn set_uncommitted_changes(&mut self, value: bool) {
        self.contains_uncommitted_changes = value;
    }

    /// Look up (`Get`) or create (`Upsert`) the id of `identifier`.
    ///
    /// Upsert creates missing intermediate segments without ids and assigns
    /// an id to the terminal segment only. Repeated upserts return the same
    /// id.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::IdSpaceExhausted`] if the counter overflows.
    pub fn get_source_node_index(
        &mut self,
        allocator: &mut IdAllocator,
        mode: IndexMode,
        identifier: &SourceNodeIdentifier,
    ) -> Result<Option<SourceNodeId>, IndexError> {
        if mode == IndexMode::Get {
            return Ok(self.source_node_id(identifier));
        }

        let segments = identifier.segments();
        let Some((last, parents)) = segments.split_last() else {
            return Err(IndexError::InvalidIdentifier(identifier.to_string()));
        };

        let mut level = &mut self.nodes;
        for segment in parents {
            level = level
                .entry((*segment).to_string())
                .or_insert_with(SourceNodeIndex::intermediate)
                .children_mut();
        }
        let node = level.entry((*last).to_string()).or_insert_with(SourceNodeIndex::intermediate);

        if let Some(id) = node.id() {
            return Ok(Some(id));
        }
        let id = SourceNodeId(allocator.next_id()?);
        node.assign_id(id);
        self.node_ids.insert(id, identifier.clone());
        Ok(Some(id))
    }

    /// Read-only lookup of an identifier's id.
    #[must_use]
    pub fn source_node_id(&self, identifier: &SourceNodeIdentifier) -> Option<SourceNodeId> {
        let mut level = &self.nodes;
        let mut found = None;
        for segment in identifier.segments() {
            let node = level.get(segment)?;
            found = Some(node);
            level = node.children();
        }
        found.and_then(SourceNodeIndex::id)
    }

    /// Reverse lookup: the identifier owning `id`.
    #[must_use]
    pub fn source_node_identifier(&self, id: SourceNodeId) -> Option<&SourceNodeIdentifier> {
        self.node_ids.get(&id)
    }

    /// All id-bearing source nodes of this path.
    pub fn source_nodes(&self) -> impl Iterator<Item = (SourceNodeId, &SourceNodeIdentifier)> {
        self.node_ids.iter().map(|(id, identifier)| (*id, identifier))
    }

    /// Rebuild the reverse map after deserialization.
    pub(crate) fn rebuild(&mut self, claims: &mut IdClaims) -> Result<(), IndexError> {
        self.node_ids.clear();
        let mut stack: Vec<(Vec<&str>, &SourceNodeIndex)> =
            self.nodes.iter().map(|(segment, node)| (vec![segment.as_str()], node)).collect();

        while let Some((segments, node)) = stack.pop() {
            if let Some(id) = node.id() {
                claims.claim(id.get())?;
                let joined = segments.join(".");
                let identifier = SourceNodeIdentifier::parse(joined.as_str())?;
                if identifier.segments() != segments {
                    return Err(IndexError::InvalidIdentifier(joined));
                }
                self.node_ids.insert(id, identifier);
            }
            for (segment, child) in node.children() {
                let mut child_segments = segments.clone();
                child_segments.push(segment.as_str());
                stack.push((child_segments, child));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(s: &str) -> SourceNodeIdentifier {
        SourceNodeIdentifier::parse(s).unwrap()
    }

    #[test]
    fn test_upsert_assigns_only_terminal_segment() {
        let mut allocator = IdAllocator::default();
        let mut path = PathIndex::new(PathId(allocator.next_id().unwrap()));

        let id = path
            .get_source_node_index(
                &mut allocator,
                IndexMode::Upsert,
                &ident("{root}.{class:C}.{method:m}"),
            )
            .unwrap()
            .unwrap();

        assert_eq!(id, SourceNodeId(1));
        assert_eq!(path.source_node_id(&ident("{root}.{class:C}")), None);
        assert_eq!(path.source_node_id(&ident("{root}")), None);
        assert_eq!(allocator.current_id(), 2);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut allocator = IdAllocator::default();
        let mut path = PathIndex::new(PathId(allocator.next_id().unwrap()));
        let identifier = ident("{root}.{function:f}");

        let first = path
            .get_source_node_index(&mut allocator, IndexMode::Upsert, &identifier)
            .unwrap();
        let second = path
            .get_source_node_index(&mut allocator, IndexMode::Upsert, &identifier)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(allocator.current_id(), 2);
    }

    #[test]
    fn test_get_never_allocates() {
        let mut allocator = IdAllocator::default();
        let mut path = PathIndex::new(PathId(allocator.next_id().unwrap()));

        let missing = path
            .get_source_node_index(&mut allocator, IndexMode::Get, &ident("{root}"))
            .unwrap();

        assert_eq!(missing, None);
        assert_eq!(allocator.current_id(), 1);
        assert!(path.nodes.is_empty());
    }

    #[test]
    fn test_intermediate_is_promoted_when_requested() {
        let mut allocator = IdAllocator::default();
        let mut path = PathIndex::new(PathId(allocator.next_id().unwrap()));

        let inner = path
            .get_source_node_index(&mut allocator, IndexMode::Upsert, &ident("{root}.{function:f}"))
            .unwrap();
        let outer = path
            .get_source_node_index(&mut allocator, IndexMode::Upsert, &ident("{root}"))
            .unwrap();

        assert_eq!(inner, Some(SourceNodeId(1)));
        assert_eq!(outer, Some(SourceNodeId(2)));
        assert_eq!(path.source_node_id(&ident("{root}.{function:f}")), inner);
        assert_eq!(path.source_node_identifier(SourceNodeId(2)).unwrap().as_str(), "{root}");
    }
}
