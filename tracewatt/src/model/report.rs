//! Report containers.
//!
//! ```text
//! ProjectReport
//!   ├── executionDetails
//!   ├── globalIndex
//!   └── report: Report
//!         ├── lang_internal: PathId → SourceFileMetaData
//!         ├── intern:        PathId → SourceFileMetaData
//!         ├── extern:        ModuleId → ModuleReport { moduleId, report: Report }
//!         └── headlessSensorValues
//! ```

use super::metadata::{SourceFileMetaData, SourceNodeMetaData};
use crate::domain::{ModuleId, PathId, SourceNodeId};
use crate::index::GlobalIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracewatt_common::SensorValues;

/// Current on-disk report format.
pub const REPORT_VERSION: u32 = 1;

/// Which file map of a report a file lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileScope {
    Intern,
    LangInternal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(rename = "lang_internal", default)]
    pub lang_internal: BTreeMap<PathId, SourceFileMetaData>,

    #[serde(default)]
    pub intern: BTreeMap<PathId, SourceFileMetaData>,

    #[serde(rename = "extern", default)]
    pub extern_: BTreeMap<ModuleId, ModuleReport>,

    #[serde(default)]
    pub headless_sensor_values: SensorValues,
}

/// Report of one external module, registered under the project report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleReport {
    pub module_id: ModuleId,
    pub report: Report,
}

impl Report {
    #[must_use]
    pub fn files(&self, scope: FileScope) -> &BTreeMap<PathId, SourceFileMetaData> {
        match scope {
            FileScope::Intern => &self.intern,
            FileScope::LangInternal => &self.lang_internal,
        }
    }

    /// File record for `path_id`, created on first use.
    pub fn file_mut(
        &mut self,
        scope: FileScope,
        path_id: PathId,
        path: &str,
    ) -> &mut SourceFileMetaData {
        let files = match scope {
            FileScope::Intern => &mut self.intern,
            FileScope::LangInternal => &mut self.lang_internal,
        };
        files
            .entry(path_id)
            .or_insert_with(|| SourceFileMetaData::new(path, path_id))
    }

    /// Module report for `module_id`, created on first use.
    pub fn module_report_mut(&mut self, module_id: ModuleId) -> &mut ModuleReport {
        self.extern_
            .entry(module_id)
            .or_insert_with(|| ModuleReport {
                module_id,
                report: Report::default(),
            })
    }

    /// Existing function record `id` of file `path_id`.
    pub fn function_mut(
        &mut self,
        scope: FileScope,
        path_id: PathId,
        id: SourceNodeId,
    ) -> Option<&mut SourceNodeMetaData> {
        let files = match scope {
            FileScope::Intern => &mut self.intern,
            FileScope::LangInternal => &mut self.lang_internal,
        };
        files.get_mut(&path_id)?.functions.get_mut(&id)
    }

    /// Function record `id` in any file of `scope`.
    #[must_use]
    pub fn function(&self, scope: FileScope, id: SourceNodeId) -> Option<&SourceNodeMetaData> {
        self.files(scope).values().find_map(|file| file.functions.get(&id))
    }

    /// This report and every nested module report, depth first, with the
    /// owning module (`None` for the receiver itself).
    #[must_use]
    pub fn reports(&self) -> Vec<(Option<ModuleId>, &Report)> {
        let mut out = Vec::new();
        let mut stack = vec![(None, self)];
        while let Some((module, report)) = stack.pop() {
            out.push((module, report));
            // Reversed so the lowest module id is visited first
            for (id, nested) in report.extern_.iter().rev() {
                stack.push((Some(*id), &nested.report));
            }
        }
        out
    }

    /// Field-wise sum of every function in both file maps, nested reports
    /// excluded.
    #[must_use]
    pub fn local_sensor_values(&self) -> SensorValues {
        self.intern
            .values()
            .chain(self.lang_internal.values())
            .map(SourceFileMetaData::total_sensor_values)
            .sum()
    }
}

/// Where and when a profile was captured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDetails {
    /// Free-form origin label (command line, test name, ...)
    #[serde(default)]
    pub origin: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,

    /// Commit time, unix milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<i64>,

    /// Profile start time, unix milliseconds
    #[serde(default)]
    pub timestamp: i64,

    #[serde(default)]
    pub uncommitted_changes: bool,
}

/// Top-level report: execution details, the identifier index and the
/// project report with its nested module reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectReport {
    pub report_version: u32,
    pub execution_details: ExecutionDetails,
    pub global_index: GlobalIndex,
    pub report: Report,
}

impl ProjectReport {
    #[must_use]
    pub fn new(execution_details: ExecutionDetails) -> Self {
        Self {
            report_version: REPORT_VERSION,
            execution_details,
            global_index: GlobalIndex::new(),
            report: Report::default(),
        }
    }

    /// Module report of `module_id`, if one was created.
    #[must_use]
    pub fn module_report(&self, module_id: ModuleId) -> Option<&ModuleReport> {
        self.report.extern_.get(&module_id)
    }
}
