//! Frame origin classification for distinguishing project code from
//! dependencies and the language runtime.
//!
//! Profilers report a file path or URL per frame; where that file lives is
//! the only reliable hint about who owns the code. This module turns such
//! paths into a [`FrameOrigin`] using a set of [`ClassificationRules`].
//!
//! # Classification Strategy
//!
//! 1. **Native frames** - empty path with a function name → language-internal
//! 2. **Language-internal markers** - checked first, most specific
//!    - `/rustc/`, `.rustup/toolchains/` → Rust standard library
//!    - `node:` → Node.js built-in modules
//! 3. **Extern markers** - package manager install locations
//!    - `.cargo/registry/src/<index>/<crate>-<version>/` → crate `crate@version`
//!    - `node_modules/<pkg>/`, `node_modules/@scope/pkg/` → package `pkg`
//! 4. **Project root** - anything below it is project code; without a
//!    configured root, relative paths are project code
//!
//! Everything else is [`FrameOrigin::Unknown`].

use crate::domain::ModuleIdentifier;

/// Origin of a frame, with the path relative to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FrameOrigin {
    /// Project code, path relative to the project root
    Project { path: String },
    /// Dependency code, path relative to the package directory
    Extern {
        module: ModuleIdentifier,
        path: String,
    },
    /// Language/runtime-internal code, path as reported
    LangInternal { path: String },
    /// Could not determine origin
    #[default]
    Unknown,
}

impl FrameOrigin {
    /// Returns true if this frame represents project code.
    #[must_use]
    pub fn is_project(&self) -> bool {
        matches!(self, FrameOrigin::Project { .. })
    }
}

// =============================================================================
// CLASSIFICATION TABLES
// =============================================================================

/// Package install locations: (marker, directories to skip before the package)
///
/// Cargo puts an index directory between `src/` and the crate directory.
const DEFAULT_EXTERN_MARKERS: &[(&str, usize)] = &[
    (".cargo/registry/src/", 1),
    (".cargo/git/checkouts/", 1),
    ("node_modules/", 0),
];

/// Language and runtime internals
const DEFAULT_LANG_INTERNAL_MARKERS: &[&str] = &["/rustc/", ".rustup/toolchains/", "node:"];

/// URL schemes stripped before matching
const URL_SCHEMES: &[&str] = &["file://"];

/// Pseudo-path of native frames that report no file
pub const NATIVE_PATH: &str = "<native>";

// =============================================================================
// RULES
// =============================================================================

/// A package install location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternMarker {
    pub marker: String,
    /// Directories between the marker and the package directory
    pub skip: usize,
}

/// Path patterns used by [`ClassificationRules::classify_frame`].
///
/// `Default` carries the built-in tables; CLI flags extend them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRules {
    pub project_root: Option<String>,
    pub extern_markers: Vec<ExternMarker>,
    pub lang_internal_markers: Vec<String>,
}

impl Default for ClassificationRules {
    fn default() -> Self {
        Self {
            project_root: None,
            extern_markers: DEFAULT_EXTERN_MARKERS
                .iter()
                .map(|(marker, skip)| ExternMarker {
                    marker: (*marker).to_string(),
                    skip: *skip,
                })
                .collect(),
            lang_internal_markers: DEFAULT_LANG_INTERNAL_MARKERS
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
        }
    }
}

impl ClassificationRules {
    #[must_use]
    pub fn with_project_root(mut self, root: impl Into<String>) -> Self {
        let root = normalize(&root.into());
        self.project_root = Some(root.trim_end_matches('/').to_string());
        self
    }

    /// Add a package install location whose next directory is the package.
    #[must_use]
    pub fn with_extern_marker(mut self, marker: impl Into<String>) -> Self {
        self.extern_markers.push(ExternMarker {
            marker: marker.into(),
            skip: 0,
        });
        self
    }

    #[must_use]
    pub fn with_lang_internal_marker(mut self, marker: impl Into<String>) -> Self {
        self.lang_internal_markers.push(marker.into());
        self
    }

    /// Classify a frame by its file path.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let rules = ClassificationRules::default().with_project_root("/app");
    ///
    /// rules.classify_frame("file:///app/src/main.js", "main");
    /// // → FrameOrigin::Project { path: "src/main.js" }
    ///
    /// rules.classify_frame("/app/node_modules/lodash/map.js", "map");
    /// // → FrameOrigin::Extern { module: "lodash", path: "map.js" }
    ///
    /// rules.classify_frame("node:internal/timers", "listOnTimeout");
    /// // → FrameOrigin::LangInternal { path: "node:internal/timers" }
    /// ```
    #[must_use]
    pub fn classify_frame(&self, file: &str, function: &str) -> FrameOrigin {
        // === NATIVE FRAMES ===
        if file.is_empty() {
            if function.is_empty() {
                return FrameOrigin::Unknown;
            }
            return FrameOrigin::LangInternal {
                path: NATIVE_PATH.to_string(),
            };
        }

        let path = normalize(file);

        // === LANGUAGE INTERNALS ===
        if self.lang_internal_markers.iter().any(|m| path.contains(m.as_str())) {
            return FrameOrigin::LangInternal { path };
        }

        // === PACKAGE INSTALL LOCATIONS ===
        // Last occurrence wins for nested node_modules
        let extern_hit = self
            .extern_markers
            .iter()
            .filter_map(|m| {
                path.rfind(m.marker.as_str())
                    .map(|pos| (pos + m.marker.len(), m.skip))
            })
            .max_by_key(|(end, _)| *end);
        if let Some((end, skip)) = extern_hit {
            return classify_package(&path[end..], skip).unwrap_or_default();
        }

        // === PROJECT ROOT ===
        match &self.project_root {
            Some(root) => match path
                .strip_prefix(root.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
            {
                Some(relative) if !relative.is_empty() => FrameOrigin::Project {
                    path: relative.to_string(),
                },
                _ => FrameOrigin::Unknown,
            },
            None if !path.starts_with('/') => FrameOrigin::Project {
                path: path.trim_start_matches("./").to_string(),
            },
            None => FrameOrigin::Unknown,
        }
    }
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Strip URL schemes and unify separators.
fn normalize(file: &str) -> String {
    let stripped = URL_SCHEMES
        .iter()
        .find_map(|scheme| file.strip_prefix(scheme))
        .unwrap_or(file);
    stripped.replace('\\', "/")
}

/// Split `<skip dirs>/<package dir>/<path>` into module and relative path.
fn classify_package(rest: &str, skip: usize) -> Option<FrameOrigin> {
    let mut parts = rest.split('/').skip(skip);
    let first = parts.next().filter(|p| !p.is_empty())?;
    let package = if first.starts_with('@') {
        format!("{first}/{}", parts.next()?)
    } else {
        first.to_string()
    };
    let path = parts.collect::<Vec<_>>().join("/");
    if path.is_empty() {
        return None;
    }
    Some(FrameOrigin::Extern {
        module: module_identifier(&package),
        path,
    })
}

/// `serde_json-1.0.0` → `serde_json@1.0.0`; names without a version suffix
/// are used as-is.
fn module_identifier(package: &str) -> ModuleIdentifier {
    let split = package
        .char_indices()
        .filter(|(i, c)| *c == '-' && package[i + 1..].starts_with(|n: char| n.is_ascii_digit()))
        .map(|(i, _)| i)
        .last();
    match split {
        Some(i) => ModuleIdentifier::external(&package[..i], &package[i + 1..]),
        None => ModuleIdentifier::new(package),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> ClassificationRules {
        ClassificationRules::default().with_project_root("/home/user/app")
    }

    #[test]
    fn test_project_code_under_root() {
        let origin = rules().classify_frame("file:///home/user/app/src/main.js", "main");
        assert_eq!(
            origin,
            FrameOrigin::Project {
                path: "src/main.js".to_string()
            }
        );
        assert!(origin.is_project());
    }

    #[test]
    fn test_relative_path_without_root_is_project() {
        let origin = ClassificationRules::default().classify_frame("./src/lib.rs", "run");
        assert_eq!(
            origin,
            FrameOrigin::Project {
                path: "src/lib.rs".to_string()
            }
        );
    }

    #[test]
    fn test_absolute_path_outside_root_is_unknown() {
        assert_eq!(rules().classify_frame("/opt/other/x.js", "f"), FrameOrigin::Unknown);
        assert!(!FrameOrigin::Unknown.is_project());
    }

    #[test]
    fn test_std_by_rustc_path() {
        let origin =
            rules().classify_frame("/rustc/abc123def/library/std/src/io/mod.rs", "read");
        assert!(matches!(origin, FrameOrigin::LangInternal { .. }));
    }

    #[test]
    fn test_node_builtin() {
        let origin = rules().classify_frame("node:internal/timers", "listOnTimeout");
        assert_eq!(
            origin,
            FrameOrigin::LangInternal {
                path: "node:internal/timers".to_string()
            }
        );
    }

    #[test]
    fn test_native_frame() {
        let origin = rules().classify_frame("", "Math.random");
        assert_eq!(
            origin,
            FrameOrigin::LangInternal {
                path: NATIVE_PATH.to_string()
            }
        );
        assert_eq!(rules().classify_frame("", ""), FrameOrigin::Unknown);
    }

    #[test]
    fn test_cargo_registry_crate() {
        let origin = rules().classify_frame(
            "/home/user/.cargo/registry/src/index.crates.io-6f17d22bba15001f/\
             serde_json-1.0.108/src/de.rs",
            "from_str",
        );
        assert_eq!(
            origin,
            FrameOrigin::Extern {
                module: ModuleIdentifier::external("serde_json", "1.0.108"),
                path: "src/de.rs".to_string()
            }
        );
    }

    #[test]
    fn test_nested_and_scoped_node_modules() {
        let origin = rules().classify_frame(
            "/home/user/app/node_modules/a/node_modules/@babel/core/lib/index.js",
            "transform",
        );
        assert_eq!(
            origin,
            FrameOrigin::Extern {
                module: ModuleIdentifier::new("@babel/core"),
                path: "lib/index.js".to_string()
            }
        );
    }

    #[test]
    fn test_custom_markers() {
        let rules = rules()
            .with_extern_marker("vendor/")
            .with_lang_internal_marker("/usr/lib/jvm/");

        assert_eq!(
            rules.classify_frame("/home/user/app/vendor/left-pad-1.3.0/index.js", "pad"),
            FrameOrigin::Extern {
                module: ModuleIdentifier::external("left-pad", "1.3.0"),
                path: "index.js".to_string()
            }
        );
        assert!(matches!(
            rules.classify_frame("/usr/lib/jvm/java-17/lib/src.zip", "run"),
            FrameOrigin::LangInternal { .. }
        ));
    }

    #[test]
    fn test_package_directory_without_file_is_unknown() {
        assert_eq!(
            rules().classify_frame("/home/user/app/node_modules/lodash", "f"),
            FrameOrigin::Unknown
        );
    }
}
