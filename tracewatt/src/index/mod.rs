//! Hierarchical identifier index
//!
//! Turns `(module, file path, dotted source-node identifier)` triples into
//! small integers:
//!
//! ```text
//! GlobalIndex ──► ModuleIndex ──► PathIndex ──► SourceNodeIndex (segment tree)
//!   "{self}"        "src/a.rs"      "{root}" ─► "{function:f}"
//! ```
//!
//! All ids come from one [`IdAllocator`] owned by the [`GlobalIndex`], so
//! module, path and source-node ids never collide and are never reused.
//! Lower levels borrow the allocator mutably for the duration of an upsert.

pub mod module_index;
pub mod path_index;
pub mod source_node_index;

pub use module_index::ModuleIndex;
pub use path_index::PathIndex;
pub use source_node_index::SourceNodeIndex;

use crate::domain::{
    IndexError, ModuleId, ModuleIdentifier, PathId, SourceNodeId, SourceNodeIdentifier,
};
use log::debug;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Lookup behaviour for the `get_*_index` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Read only; absent entries yield `None`
    Get,
    /// Create missing entries; ids are assigned to requested entries only
    Upsert,
}

/// Monotonic id counter shared by every level of one index.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    current_id: u32,
}

impl IdAllocator {
    /// Hand out the next id.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::IdSpaceExhausted`] once `u32::MAX` is reached.
    pub fn next_id(&mut self) -> Result<u32, IndexError> {
        let id = self.current_id;
        self.current_id = id.checked_add(1).ok_or(IndexError::IdSpaceExhausted)?;
        Ok(id)
    }

    /// The next id that would be handed out.
    #[must_use]
    pub fn current_id(&self) -> u32 {
        self.current_id
    }
}

/// Bookkeeping for validating a deserialized index.
pub(crate) struct IdClaims {
    current_id: u32,
    seen: HashSet<u32>,
}

impl IdClaims {
    fn new(current_id: u32) -> Self {
        Self {
            current_id,
            seen: HashSet::new(),
        }
    }

    pub(crate) fn claim(&mut self, id: u32) -> Result<(), IndexError> {
        if id >= self.current_id {
            return Err(IndexError::IdOutOfRange {
                id,
                current_id: self.current_id,
            });
        }
        if !self.seen.insert(id) {
            return Err(IndexError::DuplicateId(id));
        }
        Ok(())
    }
}

/// Module + path of a [`PathId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathLocator<'a> {
    pub module_id: ModuleId,
    pub module: &'a ModuleIdentifier,
    pub path: &'a str,
}

/// Module + path + identifier of a [`SourceNodeId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceNodeLocator<'a> {
    pub module_id: ModuleId,
    pub module: &'a ModuleIdentifier,
    pub path_id: PathId,
    pub path: &'a str,
    pub identifier: &'a SourceNodeIdentifier,
}

/// Ids assigned by [`GlobalIndex::upsert_source_node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertedSourceNode {
    pub module_id: ModuleId,
    pub path_id: PathId,
    pub source_node_id: SourceNodeId,
}

/// Root of the identifier index.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "GlobalIndexRepr")]
pub struct GlobalIndex {
    allocator: IdAllocator,
    modules: BTreeMap<ModuleIdentifier, ModuleIndex>,
    module_ids: HashMap<ModuleId, ModuleIdentifier>,
    path_owners: HashMap<PathId, ModuleId>,
    node_owners: HashMap<SourceNodeId, PathId>,
}

impl GlobalIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The next id the index would assign.
    #[must_use]
    pub fn current_id(&self) -> u32 {
        self.allocator.current_id()
    }

    /// Look up (`Get`) or create (`Upsert`) a module's id.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::IdSpaceExhausted`] if the counter overflows.
    pub fn get_module_index(
        &mut self,
        mode: IndexMode,
        module: &ModuleIdentifier,
    ) -> Result<Option<ModuleId>, IndexError> {
        if let Some(existing) = self.modules.get(module) {
            return Ok(Some(existing.id()));
        }
        if mode == IndexMode::Get {
            return Ok(None);
        }

        let id = ModuleId(self.allocator.next_id()?);
        debug!("index: module {module} -> {id}");
        self.modules.insert(module.clone(), ModuleIndex::new(id));
        self.module_ids.insert(id, module.clone());
        Ok(Some(id))
    }

    /// Look up (`Get`) or create (`Upsert`) a path's id inside `module`.
    ///
    /// Upsert creates the module first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::IdSpaceExhausted`] if the counter overflows.
    pub fn get_file_path_index(
        &mut self,
        mode: IndexMode,
        module: &ModuleIdentifier,
        path: &str,
    ) -> Result<Option<PathId>, IndexError> {
        let Some(module_id) = self.get_module_index(mode, module)? else {
            return Ok(None);
        };
        let Some(module_index) = self.modules.get_mut(module) else {
            return Ok(None);
        };

        let path_id = module_index.get_file_path_index(&mut self.allocator, mode, path)?;
        if let Some(path_id) = path_id {
            self.path_owners.insert(path_id, module_id);
        }
        Ok(path_id)
    }

    /// Look up (`Get`) or create (`Upsert`) a source node's id.
    ///
    /// Upsert creates the module and path first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::IdSpaceExhausted`] if the counter overflows.
    pub fn get_source_node_index(
        &mut self,
        mode: IndexMode,
        module: &ModuleIdentifier,
        path: &str,
        identifier: &SourceNodeIdentifier,
    ) -> Result<Option<SourceNodeId>, IndexError> {
        let Some(path_id) = self.get_file_path_index(mode, module, path)? else {
            return Ok(None);
        };
        let Some(path_index) = self.modules.get_mut(module).and_then(|m| m.path_mut(path)) else {
            return Ok(None);
        };

        let node_id = path_index.get_source_node_index(&mut self.allocator, mode, identifier)?;
        if let Some(node_id) = node_id {
            self.node_owners.insert(node_id, path_id);
        }
        Ok(node_id)
    }

    /// Upsert a full `(module, path, identifier)` triple and return all three ids.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::IdSpaceExhausted`] if the counter overflows.
    pub fn upsert_source_node(
        &mut self,
        module: &ModuleIdentifier,
        path: &str,
        identifier: &SourceNodeIdentifier,
    ) -> Result<UpsertedSourceNode, IndexError> {
        let source_node_id = self
            .get_source_node_index(IndexMode::Upsert, module, path, identifier)?
            .ok_or(IndexError::UnknownId(self.current_id()))?;
        let path_id = self
            .node_owners
            .get(&source_node_id)
            .copied()
            .ok_or(IndexError::UnknownId(source_node_id.get()))?;
        let module_id = self
            .path_owners
            .get(&path_id)
            .copied()
            .ok_or(IndexError::UnknownId(path_id.get()))?;
        Ok(UpsertedSourceNode {
            module_id,
            path_id,
            source_node_id,
        })
    }

    #[must_use]
    pub fn module(&self, module: &ModuleIdentifier) -> Option<&ModuleIndex> {
        self.modules.get(module)
    }

    pub fn modules(&self) -> impl Iterator<Item = (&ModuleIdentifier, &ModuleIndex)> {
        self.modules.iter()
    }

    #[must_use]
    pub fn module_identifier(&self, id: ModuleId) -> Option<&ModuleIdentifier> {
        self.module_ids.get(&id)
    }

    #[must_use]
    pub fn path_locator(&self, id: PathId) -> Option<PathLocator<'_>> {
        let module_id = *self.path_owners.get(&id)?;
        let module = self.module_ids.get(&module_id)?;
        let (path, _) = self.modules.get(module)?.path_by_id(id)?;
        Some(PathLocator {
            module_id,
            module,
            path,
        })
    }

    #[must_use]
    pub fn source_node_locator(&self, id: SourceNodeId) -> Option<SourceNodeLocator<'_>> {
        let path_id = *self.node_owners.get(&id)?;
        let PathLocator {
            module_id,
            module,
            path,
        } = self.path_locator(path_id)?;
        let identifier = self
            .modules
            .get(module)?
            .path(path)?
            .source_node_identifier(id)?;
        Some(SourceNodeLocator {
            module_id,
            module,
            path_id,
            path,
            identifier,
        })
    }

    /// Flag a path as containing uncommitted changes.
    ///
    /// Returns false if the path is not indexed.
    pub fn mark_uncommitted_changes(&mut self, module: &ModuleIdentifier, path: &str) -> bool {
        match self.modules.get_mut(module).and_then(|m| m.path_mut(path)) {
            Some(path_index) => {
                path_index.set_uncommitted_changes(true);
                true
            }
            None => false,
        }
    }

    /// True if any indexed path carries uncommitted changes.
    #[must_use]
    pub fn has_uncommitted_changes(&self) -> bool {
        self.modules
            .values()
            .flat_map(ModuleIndex::paths)
            .any(|(_, path)| path.contains_uncommitted_changes())
    }
}

// ============================================================================
// Serialized form: `{ "currentId": n, "modules": { ... } }`
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GlobalIndexRef<'a> {
    current_id: u32,
    modules: &'a BTreeMap<ModuleIdentifier, ModuleIndex>,
}

impl Serialize for GlobalIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        GlobalIndexRef {
            current_id: self.current_id(),
            modules: &self.modules,
        }
        .serialize(serializer)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GlobalIndexRepr {
    current_id: u32,
    #[serde(default)]
    modules: BTreeMap<ModuleIdentifier, ModuleIndex>,
}

impl TryFrom<GlobalIndexRepr> for GlobalIndex {
    type Error = IndexError;

    fn try_from(repr: GlobalIndexRepr) -> Result<Self, IndexError> {
        let mut claims = IdClaims::new(repr.current_id);
        let mut index = GlobalIndex {
            allocator: IdAllocator {
                current_id: repr.current_id,
            },
            modules: repr.modules,
            ..GlobalIndex::default()
        };

        for (identifier, module) in &mut index.modules {
            claims.claim(module.id().get())?;
            index.module_ids.insert(module.id(), identifier.clone());
            module.rebuild(&mut claims)?;

            for (_, path) in module.paths() {
                index.path_owners.insert(path.id(), module.id());
                for (node_id, _) in path.source_nodes() {
                    index.node_owners.insert(node_id, path.id());
                }
            }
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(s: &str) -> SourceNodeIdentifier {
        SourceNodeIdentifier::parse(s).unwrap()
    }

    #[test]
    fn test_ids_share_one_counter() {
        let mut index = GlobalIndex::new();
        let ids = index
            .upsert_source_node(&ModuleIdentifier::project(), "src/a.js", &ident("{root}"))
            .unwrap();

        assert_eq!(ids.module_id, ModuleId(0));
        assert_eq!(ids.path_id, PathId(1));
        assert_eq!(ids.source_node_id, SourceNodeId(2));
        assert_eq!(index.current_id(), 3);
    }

    #[test]
    fn test_get_mode_does_not_create() {
        let mut index = GlobalIndex::new();
        let module = ModuleIdentifier::project();

        assert_eq!(index.get_module_index(IndexMode::Get, &module).unwrap(), None);
        assert_eq!(
            index
                .get_source_node_index(IndexMode::Get, &module, "a.js", &ident("{root}"))
                .unwrap(),
            None
        );
        assert_eq!(index.current_id(), 0);
    }

    #[test]
    fn test_reverse_lookups() {
        let mut index = GlobalIndex::new();
        let module = ModuleIdentifier::external("lodash", "4.17.21");
        let ids = index
            .upsert_source_node(&module, "lodash.js", &ident("{root}.{function:map}"))
            .unwrap();

        assert_eq!(index.module_identifier(ids.module_id), Some(&module));
        let path = index.path_locator(ids.path_id).unwrap();
        assert_eq!(path.path, "lodash.js");
        let node = index.source_node_locator(ids.source_node_id).unwrap();
        assert_eq!(node.module, &module);
        assert_eq!(node.identifier.as_str(), "{root}.{function:map}");
    }

    #[test]
    fn test_mark_uncommitted_changes() {
        let mut index = GlobalIndex::new();
        let module = ModuleIdentifier::project();
        index
            .get_file_path_index(IndexMode::Upsert, &module, "src/a.js")
            .unwrap();

        assert!(!index.has_uncommitted_changes());
        assert!(index.mark_uncommitted_changes(&module, "src/a.js"));
        assert!(!index.mark_uncommitted_changes(&module, "src/missing.js"));
        assert!(index.has_uncommitted_changes());
    }

    #[test]
    fn test_round_trip_rebuilds_reverse_maps() {
        let mut index = GlobalIndex::new();
        let module = ModuleIdentifier::project();
        let ids = index
            .upsert_source_node(&module, "src/a.js", &ident("{root}.{function:f}"))
            .unwrap();
        index.mark_uncommitted_changes(&module, "src/a.js");

        let json = serde_json::to_string(&index).unwrap();
        let mut loaded: GlobalIndex = serde_json::from_str(&json).unwrap();

        assert_eq!(loaded.current_id(), index.current_id());
        assert!(loaded.has_uncommitted_changes());
        let node = loaded.source_node_locator(ids.source_node_id).unwrap();
        assert_eq!(node.identifier.as_str(), "{root}.{function:f}");

        // Counter continues where it left off
        let next = loaded
            .upsert_source_node(&module, "src/b.js", &ident("{root}"))
            .unwrap();
        assert_eq!(next.path_id, PathId(index.current_id()));
    }

    #[test]
    fn test_load_rejects_duplicate_ids() {
        let json = r#"{"currentId":5,"modules":{"{self}":{"id":0,"paths":{"a.js":{"id":0}}}}}"#;
        let err = serde_json::from_str::<GlobalIndex>(json).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_load_rejects_ids_at_or_above_counter() {
        let json = r#"{"currentId":2,"modules":{"{self}":{"id":0,
            "paths":{"a.js":{"id":1,"nodes":{"{root}":{"id":2}}}}}}}"#;
        let err = serde_json::from_str::<GlobalIndex>(json).unwrap_err();
        assert!(err.to_string().contains("not below the index counter"));
    }
}
