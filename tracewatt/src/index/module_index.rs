//! Per-module index: file paths → path indices.

use super::path_index::PathIndex;
use super::{IdAllocator, IdClaims, IndexMode};
use crate::domain::{IndexError, ModuleId, PathId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleIndex {
    id: ModuleId,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    paths: BTreeMap<String, PathIndex>,

    /// Reverse map, rebuilt on load
    #[serde(skip)]
    path_ids: HashMap<PathId, String>,
}

impl ModuleIndex {
    pub(crate) fn new(id: ModuleId) -> Self {
        Self {
            id,
            paths: BTreeMap::new(),
            path_ids: HashMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Look up (`Get`) or create (`Upsert`) the id of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::IdSpaceExhausted`] if the counter overflows.
    pub fn get_file_path_index(
        &mut self,
        allocator: &mut IdAllocator,
        mode: IndexMode,
        path: &str,
    ) -> Result<Option<PathId>, IndexError> {
        if let Some(existing) = self.paths.get(path) {
            return Ok(Some(existing.id()));
        }
        if mode == IndexMode::Get {
            return Ok(None);
        }

        let id = PathId(allocator.next_id()?);
        self.paths.insert(path.to_string(), PathIndex::new(id));
        self.path_ids.insert(id, path.to_string());
        Ok(Some(id))
    }

    #[must_use]
    pub fn path(&self, path: &str) -> Option<&PathIndex> {
        self.paths.get(path)
    }

    pub(crate) fn path_mut(&mut self, path: &str) -> Option<&mut PathIndex> {
        self.paths.get_mut(path)
    }

    /// Reverse lookup: path string and index owning `id`.
    #[must_use]
    pub fn path_by_id(&self, id: PathId) -> Option<(&str, &PathIndex)> {
        let path = self.path_ids.get(&id)?;
        self.paths.get(path).map(|index| (path.as_str(), index))
    }

    pub fn paths(&self) -> impl Iterator<Item = (&str, &PathIndex)> {
        self.paths.iter().map(|(path, index)| (path.as_str(), index))
    }

    /// Rebuild reverse maps below this module after deserialization.
    pub(crate) fn rebuild(&mut self, claims: &mut IdClaims) -> Result<(), IndexError> {
        self.path_ids.clear();
        for (path, index) in &mut self.paths {
            claims.claim(index.id().get())?;
            self.path_ids.insert(index.id(), path.clone());
            index.rebuild(claims)?;
        }
        Ok(())
    }
}
