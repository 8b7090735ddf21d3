//! Building the phpcs invocation.
//!
//! phpcs' flag surface changed across releases, so every
//! version-dependent behavior is gated by a declarative table rather than
//! scattered branching. A build call either yields the argument list plus
//! stdin payload, or short-circuits the whole lint (empty document, or an
//! ignore pattern matching on a tool too old to ignore natively).

use std::path::{Path, PathBuf};

use globset::Glob;

use crate::config::{DEFAULT_SEVERITY, Settings};
use crate::version::ToolVersion;

/// Inclusive lower / exclusive upper version bound for a CLI feature.
#[derive(Debug, Clone, Copy)]
pub struct Gate {
    min: Option<ToolVersion>,
    max: Option<ToolVersion>,
}

impl Gate {
    const fn at_least(major: u32, minor: u32, patch: u32) -> Self {
        Gate {
            min: Some(ToolVersion::new(major, minor, patch)),
            max: None,
        }
    }

    const fn below(major: u32, minor: u32, patch: u32) -> Self {
        Gate {
            min: None,
            max: Some(ToolVersion::new(major, minor, patch)),
        }
    }

    const fn between(min: ToolVersion, max: ToolVersion) -> Self {
        Gate {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Whether a tool of `version` has this feature.
    pub fn admits(&self, version: ToolVersion) -> bool {
        if let Some(min) = self.min
            && version < min
        {
            return false;
        }
        if let Some(max) = self.max
            && version >= max
        {
            return false;
        }
        true
    }
}

/// Version gates for phpcs CLI features.
pub mod gates {
    use super::Gate;
    use crate::version::ToolVersion;

    /// `-q`: suppress progress noise ahead of the report.
    pub const QUIET: Gate = Gate::at_least(2, 6, 2);
    /// `--encoding=UTF-8`.
    pub const ENCODING: Gate = Gate::at_least(1, 3, 0);
    /// `--ignore=<csv>` handled natively by the tool.
    pub const NATIVE_IGNORE: Gate = Gate::at_least(3, 0, 0);
    /// Ignore patterns evaluated locally because the tool cannot.
    pub const LOCAL_IGNORE: Gate = Gate::below(3, 0, 0);
    /// `--stdin-path=<path>`.
    pub const STDIN_PATH: Gate = Gate::at_least(2, 6, 0);
    /// `phpcs_input_file:` marker line ahead of the document text.
    pub const INPUT_FILE_PREAMBLE: Gate =
        Gate::between(ToolVersion::new(2, 0, 0), ToolVersion::new(2, 6, 0));
    /// Whether the filename can be communicated at all.
    pub const FILENAME: Gate = Gate::at_least(2, 0, 0);
}

/// Ruleset file names phpcs discovers on its own, in precedence order.
const RULESET_FILES: &[&str] = &[
    ".phpcs.xml",
    "phpcs.xml",
    "phpcs.xml.dist",
    "phpcs.ruleset.xml",
    "ruleset.xml",
];

/// A fully-built invocation, or the reason the lint short-circuits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPlan {
    /// Spawn the tool with these arguments and stdin payload.
    Invoke { args: Vec<String>, stdin: String },
    /// Skip the run entirely and publish zero diagnostics.
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The document is empty; there is nothing to analyze.
    EmptyDocument,
    /// An ignore pattern matched and the tool cannot ignore natively.
    Ignored,
}

/// Build the argument list and stdin payload for one validation.
///
/// `standard` is the effective standard for this run (auto-config-search
/// already applied, see [`effective_standard`]). `file_path` is `None`
/// for unsaved documents, which disables every filename-dependent
/// behavior including ignore evaluation.
pub fn build(
    version: ToolVersion,
    settings: &Settings,
    file_path: Option<&Path>,
    standard: Option<&str>,
    text: &str,
) -> CommandPlan {
    if text.is_empty() {
        return CommandPlan::Skip(SkipReason::EmptyDocument);
    }

    let mut args = vec!["--report=json".to_string()];

    if gates::QUIET.admits(version) {
        args.push("-q".to_string());
    }
    if settings.show_sources {
        args.push("-s".to_string());
    }
    if gates::ENCODING.admits(version) {
        args.push("--encoding=UTF-8".to_string());
    }
    if let Some(standard) = standard {
        args.push(format!("--standard={standard}"));
    }

    if !settings.ignore_patterns.is_empty() {
        if gates::NATIVE_IGNORE.admits(version) {
            args.push(format!("--ignore={}", settings.ignore_patterns.join(",")));
        } else if gates::LOCAL_IGNORE.admits(version)
            && let Some(path) = file_path
            && matches_ignore(
                &settings.ignore_patterns,
                path,
                settings.workspace_root.as_deref(),
            )
        {
            return CommandPlan::Skip(SkipReason::Ignored);
        }
    }

    if settings.error_severity != DEFAULT_SEVERITY {
        args.push(format!("--error-severity={}", settings.error_severity));
    }
    if !settings.show_warnings {
        args.push("--warning-severity=0".to_string());
    } else if settings.warning_severity != DEFAULT_SEVERITY {
        args.push(format!("--warning-severity={}", settings.warning_severity));
    }

    let stdin = match filename_channel(version, file_path) {
        FilenameChannel::Flag(path) => {
            args.push(format!("--stdin-path={}", path.display()));
            text.to_string()
        }
        FilenameChannel::Preamble(path) => {
            format!("phpcs_input_file: {}\n{text}", path.display())
        }
        FilenameChannel::None => text.to_string(),
    };

    args.push("-".to_string());

    CommandPlan::Invoke { args, stdin }
}

/// How the document's filename travels to the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FilenameChannel {
    /// `--stdin-path=<path>` flag.
    Flag(PathBuf),
    /// Marker line ahead of the document text on stdin.
    Preamble(PathBuf),
    /// Not communicated: tool too old, or the document is unsaved.
    None,
}

fn filename_channel(version: ToolVersion, file_path: Option<&Path>) -> FilenameChannel {
    match file_path {
        Some(path) if gates::STDIN_PATH.admits(version) => {
            FilenameChannel::Flag(path.to_path_buf())
        }
        Some(path) if gates::INPUT_FILE_PREAMBLE.admits(version) => {
            FilenameChannel::Preamble(path.to_path_buf())
        }
        _ => FilenameChannel::None,
    }
}

/// The standard flag value for this run.
///
/// With auto-config-search on, a ruleset file near the document overrides
/// the configured standard: the flag is suppressed so the tool discovers
/// the local ruleset itself.
pub fn effective_standard(settings: &Settings, file_path: Option<&Path>) -> Option<String> {
    if settings.auto_config_search
        && let Some(path) = file_path
        && let Some(root) = settings.workspace_root.as_deref()
        && find_local_ruleset(path, root).is_some()
    {
        return None;
    }
    settings.standard.clone()
}

/// Search the document's directory and its ancestors, up to and including
/// the workspace root, for a local ruleset file.
pub fn find_local_ruleset(file_path: &Path, workspace_root: &Path) -> Option<PathBuf> {
    if !file_path.starts_with(workspace_root) {
        return None;
    }
    for dir in file_path.parent()?.ancestors() {
        for name in RULESET_FILES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        if dir == workspace_root {
            break;
        }
    }
    None
}

/// Evaluate ignore globs against the document path. Both the absolute
/// path and the workspace-relative form count as a match.
fn matches_ignore(patterns: &[String], path: &Path, workspace_root: Option<&Path>) -> bool {
    let absolute = path.to_string_lossy();
    let relative = workspace_root
        .and_then(|root| path.strip_prefix(root).ok())
        .map(|p| p.to_string_lossy().into_owned());

    patterns.iter().any(|pattern| {
        let Ok(glob) = Glob::new(pattern) else {
            tracing::warn!(%pattern, "ignoring invalid glob pattern");
            return false;
        };
        let matcher = glob.compile_matcher();
        matcher.is_match(absolute.as_ref())
            || relative.as_deref().is_some_and(|rel| matcher.is_match(rel))
    })
}
