//! Segment tree of dotted source-node identifiers inside one path.
//!
//! `{root}.{class:C}.{method:m}` is stored as three nested entries. Only the
//! entry for a requested identifier carries an id; the segments above it stay
//! [`SourceNodeIndex::Intermediate`] until they are requested themselves.

use crate::domain::SourceNodeId;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

pub type SourceNodeChildren = BTreeMap<String, SourceNodeIndex>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "SourceNodeIndexRepr")]
pub enum SourceNodeIndex {
    /// Segment that has only been walked through, never requested
    Intermediate { children: SourceNodeChildren },
    /// Segment that was requested and owns an id
    SourceNode {
        id: SourceNodeId,
        children: SourceNodeChildren,
    },
}

impl SourceNodeIndex {
    pub(crate) fn intermediate() -> Self {
        SourceNodeIndex::Intermediate {
            children: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<SourceNodeId> {
        match self {
            SourceNodeIndex::Intermediate { .. } => None,
            SourceNodeIndex::SourceNode { id, .. } => Some(*id),
        }
    }

    #[must_use]
    pub fn children(&self) -> &SourceNodeChildren {
        match self {
            SourceNodeIndex::Intermediate { children }
            | SourceNodeIndex::SourceNode { children, .. } => children,
        }
    }

    pub(crate) fn children_mut(&mut self) -> &mut SourceNodeChildren {
        match self {
            SourceNodeIndex::Intermediate { children }
            | SourceNodeIndex::SourceNode { children, .. } => children,
        }
    }

    /// Promote an intermediate entry, keeping its children.
    pub(crate) fn assign_id(&mut self, id: SourceNodeId) {
        let children = std::mem::take(self.children_mut());
        *self = SourceNodeIndex::SourceNode { id, children };
    }
}

// ============================================================================
// Serialized form: `{ "id": 7, "children": { ... } }`, both fields optional
// ============================================================================

#[derive(Deserialize)]
struct SourceNodeIndexRepr {
    #[serde(default)]
    id: Option<SourceNodeId>,
    #[serde(default)]
    children: SourceNodeChildren,
}

impl From<SourceNodeIndexRepr> for SourceNodeIndex {
    fn from(repr: SourceNodeIndexRepr) -> Self {
        match repr.id {
            Some(id) => SourceNodeIndex::SourceNode {
                id,
                children: repr.children,
            },
            None => SourceNodeIndex::Intermediate {
                children: repr.children,
            },
        }
    }
}

#[derive(Serialize)]
struct SourceNodeIndexRef<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<SourceNodeId>,
    #[serde(skip_serializing_if = "no_children")]
    children: &'a SourceNodeChildren,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if passes by reference
fn no_children(children: &&SourceNodeChildren) -> bool {
    children.is_empty()
}

impl Serialize for SourceNodeIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SourceNodeIndexRef {
            id: self.id(),
            children: self.children(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_id_keeps_children() {
        let mut node = SourceNodeIndex::intermediate();
        node.children_mut().insert("{function:f}".to_string(), SourceNodeIndex::intermediate());
        node.assign_id(SourceNodeId(4));

        assert_eq!(node.id(), Some(SourceNodeId(4)));
        assert!(node.children().contains_key("{function:f}"));
    }

    #[test]
    fn test_serialized_form_omits_empty_fields() {
        let mut node = SourceNodeIndex::intermediate();
        assert_eq!(serde_json::to_string(&node).unwrap(), "{}");

        node.assign_id(SourceNodeId(2));
        assert_eq!(serde_json::to_string(&node).unwrap(), r#"{"id":2}"#);

        let back: SourceNodeIndex = serde_json::from_str(r#"{"id":2}"#).unwrap();
        assert_eq!(back, node);
    }
}
