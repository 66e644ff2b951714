//! Lookup-table resolver.
//!
//! Reads the output of an external static-analysis step that already knows
//! which source node every `(file, line, column)` belongs to:
//!
//! ```text
//! {
//!   "entries": [
//!     { "file": "file:///app/src/a.js", "line": 3, "column": 10,
//!       "frame": { "scope": "project_intern", "path": "src/a.js",
//!                  "identifier": "{root}.{class:A}.{method:run}" } }
//!   ],
//!   "uncommittedChanges": ["src/a.js"]
//! }
//! ```
//!
//! `scope` is `"project_intern"`, `"lang_internal"` or
//! `{ "extern_module": "name@version" }`.

use super::{LocationResolver, ResolvedFrame};
use crate::domain::{CodeLocation, ResolveError};
use log::{info, warn};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct TableEntry {
    file: String,
    line: u32,
    column: u32,
    frame: ResolvedFrame,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableFile {
    entries: Vec<TableEntry>,
    #[serde(default)]
    uncommitted_changes: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TableResolver {
    frames: HashMap<(String, u32, u32), ResolvedFrame>,
    uncommitted: HashSet<String>,
}

impl TableResolver {
    /// Load a lookup table from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Io`] or [`ResolveError::Json`] if the file
    /// can't be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ResolveError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// # Errors
    ///
    /// Returns [`ResolveError::Json`] if the input is not a lookup table.
    pub fn from_reader(reader: impl Read) -> Result<Self, ResolveError> {
        let table: TableFile = serde_json::from_reader(reader)?;
        let mut resolver = Self::default();
        for entry in table.entries {
            let location = CodeLocation {
                file: entry.file,
                function_name: String::new(),
                line: entry.line,
                column: entry.column,
            };
            resolver.insert(location, entry.frame);
        }
        resolver.uncommitted.extend(table.uncommitted_changes);
        info!("Loaded lookup table with {} locations", resolver.frames.len());
        Ok(resolver)
    }

    /// Add or replace the frame for a location; the function name is ignored.
    pub fn insert(&mut self, location: CodeLocation, frame: ResolvedFrame) {
        let key = (location.file, location.line, location.column);
        if let Some(previous) = self.frames.insert(key.clone(), frame) {
            warn!(
                "lookup table: {}:{}:{} listed twice, replacing {}",
                key.0, key.1, key.2, previous.identifier
            );
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl LocationResolver for TableResolver {
    fn resolve(&self, location: &CodeLocation) -> Result<ResolvedFrame, ResolveError> {
        self.frames
            .get(&(location.file.clone(), location.line, location.column))
            .cloned()
            .ok_or_else(|| ResolveError::NotInTable {
                file: location.file.clone(),
                line: location.line,
                column: location.column,
            })
    }

    fn has_uncommitted_changes(&self, path: &str) -> bool {
        self.uncommitted.contains(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModuleIdentifier;
    use crate::resolution::FrameScope;

    const TABLE: &str = r#"{
        "entries": [
            {"file": "/app/a.js", "line": 3, "column": 10,
             "frame": {"scope": "project_intern", "path": "a.js", "identifier": "{root}.{class:A}.{method:run}"}},
            {"file": "/app/node_modules/m/i.js", "line": 1, "column": 1,
             "frame": {"scope": {"extern_module": "m@1.0.0"}, "path": "i.js", "identifier": "{root}"}}
        ],
        "uncommittedChanges": ["a.js"]
    }"#;

    fn location(file: &str, line: u32, column: u32) -> CodeLocation {
        CodeLocation {
            file: file.to_string(),
            function_name: "ignored".to_string(),
            line,
            column,
        }
    }

    #[test]
    fn test_lookup() {
        let resolver = TableResolver::from_reader(TABLE.as_bytes()).unwrap();
        assert_eq!(resolver.len(), 2);

        let frame = resolver.resolve(&location("/app/a.js", 3, 10)).unwrap();
        assert_eq!(frame.scope, FrameScope::ProjectIntern);
        assert_eq!(frame.identifier.segments(), vec!["{root}", "{class:A}", "{method:run}"]);

        let frame = resolver.resolve(&location("/app/node_modules/m/i.js", 1, 1)).unwrap();
        assert_eq!(frame.scope, FrameScope::ExternModule(ModuleIdentifier::external("m", "1.0.0")));
    }

    #[test]
    fn test_missing_location_is_an_error() {
        let resolver = TableResolver::from_reader(TABLE.as_bytes()).unwrap();
        let err = resolver.resolve(&location("/app/a.js", 4, 10)).unwrap_err();
        assert!(matches!(err, ResolveError::NotInTable { line: 4, .. }));
    }

    #[test]
    fn test_uncommitted_paths() {
        let resolver = TableResolver::from_reader(TABLE.as_bytes()).unwrap();
        assert!(resolver.has_uncommitted_changes("a.js"));
        assert!(!resolver.has_uncommitted_changes("i.js"));
    }

    #[test]
    fn test_invalid_identifier_is_rejected() {
        let table = r#"{"entries": [{"file": "a", "line": 1, "column": 1,
            "frame": {"scope": "lang_internal", "path": "a", "identifier": "{root}.."}}]}"#;
        assert!(matches!(TableResolver::from_reader(table.as_bytes()), Err(ResolveError::Json(_))));
    }
}
