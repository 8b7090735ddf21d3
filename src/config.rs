//! Validation settings supplied by the editor.
//!
//! The editor pushes a fully-resolved record with
//! `workspace/didChangeConfiguration`. The record is immutable for the
//! lifetime of one validation; changes replace the whole record (never
//! mutate it in place) so concurrent validations see a consistent snapshot.

use std::path::PathBuf;

use serde::Deserialize;

/// phpcs' built-in severity threshold. The severity flags are only
/// emitted when a configured value differs from this.
pub const DEFAULT_SEVERITY: u32 = 5;

/// Per-validation settings, as configured in the editor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Master switch. Disabled clears diagnostics instead of validating.
    pub enable: bool,

    /// Explicit path to the phpcs executable. Overrides all other
    /// resolution strategies. Relative paths resolve against the
    /// workspace root.
    pub executable_path: Option<String>,

    /// Workspace root directory, if the editor opened a folder.
    pub workspace_root: Option<PathBuf>,

    /// Coding standard name or ruleset path. `None` means the tool default.
    pub standard: Option<String>,

    /// Append the rule source identifier to each message.
    pub show_sources: bool,

    /// Report warnings at all. Disabled forces `--warning-severity=0`.
    pub show_warnings: bool,

    /// Glob patterns for files that should not be linted.
    pub ignore_patterns: Vec<String>,

    /// Minimum severity an issue needs to be reported as an error.
    pub error_severity: u32,

    /// Minimum severity an issue needs to be reported as a warning.
    pub warning_severity: u32,

    /// Look for a ruleset file near the document and prefer it over the
    /// configured standard.
    pub auto_config_search: bool,

    /// Location of the composer manifest, relative to the workspace root.
    pub composer_json_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            enable: true,
            executable_path: None,
            workspace_root: None,
            standard: None,
            show_sources: false,
            show_warnings: true,
            ignore_patterns: Vec::new(),
            error_severity: DEFAULT_SEVERITY,
            warning_severity: DEFAULT_SEVERITY,
            auto_config_search: true,
            composer_json_path: "composer.json".to_string(),
        }
    }
}

impl Settings {
    /// Extract settings from a `workspace/didChangeConfiguration` payload.
    ///
    /// Editors wrap the record in a section object (`{"phpcs": {...}}`);
    /// a bare record is accepted too.
    pub fn from_configuration(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let section = match value {
            serde_json::Value::Object(mut map) if map.contains_key("phpcs") => {
                map.remove("phpcs").unwrap_or(serde_json::Value::Null)
            }
            other => other,
        };
        serde_json::from_value(section)
    }
}
