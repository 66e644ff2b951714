//! Per-node and per-file statistics.

use crate::domain::{PathId, ReferenceKind, SourceNodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracewatt_common::SensorValues;

/// Type tag of a [`SourceNodeMetaData`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaDataKind {
    /// Function/method/scope of the project or of an external module
    SourceNode,
    /// Language/runtime-internal frame
    LangInternalSourceNode,
    /// Edge record inside a reference map
    Reference,
}

/// Reference edges keyed by the callee's globally unique id.
pub type ReferenceMap = BTreeMap<SourceNodeId, SourceNodeMetaData>;

/// Statistics of one source node plus its outgoing reference edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceNodeMetaData {
    #[serde(rename = "type")]
    pub kind: MetaDataKind,

    pub id: SourceNodeId,

    #[serde(default)]
    pub sensor_values: SensorValues,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intern: Option<ReferenceMap>,

    #[serde(rename = "extern", default, skip_serializing_if = "Option::is_none")]
    pub extern_: Option<ReferenceMap>,

    #[serde(rename = "lang_internal", default, skip_serializing_if = "Option::is_none")]
    pub lang_internal: Option<ReferenceMap>,
}

impl SourceNodeMetaData {
    #[must_use]
    pub fn new(kind: MetaDataKind, id: SourceNodeId) -> Self {
        Self {
            kind,
            id,
            sensor_values: SensorValues::default(),
            intern: None,
            extern_: None,
            lang_internal: None,
        }
    }

    /// Edge record for a callee; carries sensor values only.
    #[must_use]
    pub fn reference(target: SourceNodeId) -> Self {
        Self::new(MetaDataKind::Reference, target)
    }

    #[must_use]
    pub fn references(&self, kind: ReferenceKind) -> Option<&ReferenceMap> {
        match kind {
            ReferenceKind::Intern => self.intern.as_ref(),
            ReferenceKind::Extern => self.extern_.as_ref(),
            ReferenceKind::LangInternal => self.lang_internal.as_ref(),
        }
    }

    fn references_mut(&mut self, kind: ReferenceKind) -> &mut ReferenceMap {
        let map = match kind {
            ReferenceKind::Intern => &mut self.intern,
            ReferenceKind::Extern => &mut self.extern_,
            ReferenceKind::LangInternal => &mut self.lang_internal,
        };
        map.get_or_insert_with(BTreeMap::new)
    }

    /// Edge record towards `target`, created on first use.
    pub fn reference_mut(
        &mut self,
        kind: ReferenceKind,
        target: SourceNodeId,
    ) -> &mut SourceNodeMetaData {
        self.references_mut(kind)
            .entry(target)
            .or_insert_with(|| SourceNodeMetaData::reference(target))
    }

    /// Every outgoing edge as `(kind, callee, values)`.
    pub fn all_references(
        &self,
    ) -> impl Iterator<Item = (ReferenceKind, SourceNodeId, &SensorValues)> {
        ReferenceKind::ALL.into_iter().flat_map(move |kind| {
            self.references(kind).into_iter().flat_map(move |map| {
                map.iter()
                    .map(move |(id, edge)| (kind, *id, &edge.sensor_values))
            })
        })
    }

    /// Field-wise sum of another record for the same node, edges included.
    ///
    /// Both records must already use the same id space.
    pub fn merge(&mut self, other: &SourceNodeMetaData) {
        self.sensor_values += other.sensor_values;
        for (kind, target, values) in other.all_references() {
            self.reference_mut(kind, target).sensor_values += *values;
        }
    }
}

/// Statistics of every source node of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFileMetaData {
    pub path: String,
    pub path_id: PathId,
    #[serde(default)]
    pub functions: BTreeMap<SourceNodeId, SourceNodeMetaData>,
}

impl SourceFileMetaData {
    #[must_use]
    pub fn new(path: impl Into<String>, path_id: PathId) -> Self {
        Self {
            path: path.into(),
            path_id,
            functions: BTreeMap::new(),
        }
    }

    /// Record for `id`, created with `kind` on first use.
    pub fn function_mut(
        &mut self,
        kind: MetaDataKind,
        id: SourceNodeId,
    ) -> &mut SourceNodeMetaData {
        self.functions
            .entry(id)
            .or_insert_with(|| SourceNodeMetaData::new(kind, id))
    }

    /// Field-wise sum over all functions.
    #[must_use]
    pub fn total_sensor_values(&self) -> SensorValues {
        self.functions.values().map(|f| f.sensor_values).sum()
    }

    /// Field-wise maximum over all functions.
    #[must_use]
    pub fn max_sensor_values(&self) -> SensorValues {
        SensorValues::max_of(self.functions.values().map(|f| &f.sensor_values))
    }
}
