//! Merging independently produced project reports.
//!
//! Every input carries its own [`GlobalIndex`], so ids are translated through
//! the `(module, path, identifier)` triples they stand for into one fresh
//! index before statistics are summed.

use super::metadata::{ReferenceMap, SourceNodeMetaData};
use super::report::{ExecutionDetails, FileScope, ProjectReport, Report};
use crate::domain::{IndexError, ModuleId, PathId, SourceNodeId};
use crate::index::{GlobalIndex, IndexMode};
use log::{debug, info};
use std::collections::HashMap;

/// Translates ids of one source index into a target index.
struct IdRemap<'a> {
    source: &'a GlobalIndex,
    target: &'a mut GlobalIndex,
    modules: HashMap<ModuleId, ModuleId>,
    paths: HashMap<PathId, PathId>,
    nodes: HashMap<SourceNodeId, SourceNodeId>,
}

impl<'a> IdRemap<'a> {
    fn new(source: &'a GlobalIndex, target: &'a mut GlobalIndex) -> Self {
        Self {
            source,
            target,
            modules: HashMap::new(),
            paths: HashMap::new(),
            nodes: HashMap::new(),
        }
    }

    fn module(&mut self, id: ModuleId) -> Result<ModuleId, IndexError> {
        if let Some(mapped) = self.modules.get(&id) {
            return Ok(*mapped);
        }
        let identifier = self
            .source
            .module_identifier(id)
            .ok_or(IndexError::UnknownId(id.get()))?;
        let mapped = self
            .target
            .get_module_index(IndexMode::Upsert, identifier)?
            .ok_or(IndexError::UnknownId(id.get()))?;
        self.modules.insert(id, mapped);
        Ok(mapped)
    }

    fn path(&mut self, id: PathId) -> Result<PathId, IndexError> {
        if let Some(mapped) = self.paths.get(&id) {
            return Ok(*mapped);
        }
        let locator = self
            .source
            .path_locator(id)
            .ok_or(IndexError::UnknownId(id.get()))?;
        let mapped = self
            .target
            .get_file_path_index(IndexMode::Upsert, locator.module, locator.path)?
            .ok_or(IndexError::UnknownId(id.get()))?;
        if let Some(path_index) = self
            .source
            .module(locator.module)
            .and_then(|m| m.path(locator.path))
        {
            if path_index.contains_uncommitted_changes() {
                self.target.mark_uncommitted_changes(locator.module, locator.path);
            }
        }
        self.paths.insert(id, mapped);
        Ok(mapped)
    }

    fn node(&mut self, id: SourceNodeId) -> Result<SourceNodeId, IndexError> {
        if let Some(mapped) = self.nodes.get(&id) {
            return Ok(*mapped);
        }
        let locator = self
            .source
            .source_node_locator(id)
            .ok_or(IndexError::UnknownId(id.get()))?;
        let mapped = self
            .target
            .upsert_source_node(locator.module, locator.path, locator.identifier)?
            .source_node_id;
        self.nodes.insert(id, mapped);
        Ok(mapped)
    }

    fn references(
        &mut self,
        map: Option<&ReferenceMap>,
    ) -> Result<Option<ReferenceMap>, IndexError> {
        let Some(map) = map else {
            return Ok(None);
        };
        let mut out = ReferenceMap::new();
        for (target, edge) in map {
            let mapped = self.node(*target)?;
            out.insert(
                mapped,
                SourceNodeMetaData {
                    id: mapped,
                    ..edge.clone()
                },
            );
        }
        Ok(Some(out))
    }

    fn metadata(&mut self, node: &SourceNodeMetaData) -> Result<SourceNodeMetaData, IndexError> {
        Ok(SourceNodeMetaData {
            kind: node.kind,
            id: self.node(node.id)?,
            sensor_values: node.sensor_values,
            intern: self.references(node.intern.as_ref())?,
            extern_: self.references(node.extern_.as_ref())?,
            lang_internal: self.references(node.lang_internal.as_ref())?,
        })
    }
}

fn merge_report_into(
    source: &Report,
    target: &mut Report,
    remap: &mut IdRemap<'_>,
) -> Result<(), IndexError> {
    target.headless_sensor_values += source.headless_sensor_values;

    for scope in [FileScope::Intern, FileScope::LangInternal] {
        for (path_id, file) in source.files(scope) {
            let mapped_path = remap.path(*path_id)?;
            for function in file.functions.values() {
                let remapped = remap.metadata(function)?;
                target
                    .file_mut(scope, mapped_path, &file.path)
                    .function_mut(remapped.kind, remapped.id)
                    .merge(&remapped);
            }
            // Keep files that exist without functions
            target.file_mut(scope, mapped_path, &file.path);
        }
    }

    for (module_id, nested) in &source.extern_ {
        let mapped = remap.module(*module_id)?;
        merge_report_into(&nested.report, &mut target.module_report_mut(mapped).report, remap)?;
    }
    Ok(())
}

impl ProjectReport {
    /// Merge reports into one.
    ///
    /// Inputs are ordered by execution start time; the merged details keep
    /// the earliest start time (and that report's origin and commit) and OR
    /// the uncommitted-changes flags. Node, edge and headless statistics are
    /// summed field-wise.
    ///
    /// # Errors
    ///
    /// Returns an [`IndexError`] if an input references an id its own index
    /// does not know.
    pub fn merge(mut reports: Vec<ProjectReport>) -> Result<ProjectReport, IndexError> {
        reports.sort_by_key(|r| r.execution_details.timestamp);

        let details = match reports.first() {
            Some(first) => ExecutionDetails {
                uncommitted_changes: reports
                    .iter()
                    .any(|r| r.execution_details.uncommitted_changes),
                ..first.execution_details.clone()
            },
            None => ExecutionDetails::default(),
        };
        let mut merged = ProjectReport::new(details);

        for (i, report) in reports.iter().enumerate() {
            debug!(
                "merge: folding report {i} (start {})",
                report.execution_details.timestamp
            );
            let mut remap = IdRemap::new(&report.global_index, &mut merged.global_index);
            merge_report_into(&report.report, &mut merged.report, &mut remap)?;
        }

        info!(
            "Merged {} reports ({} ids)",
            reports.len(),
            merged.global_index.current_id()
        );
        Ok(merged)
    }
}
