//! Probing the phpcs version.
//!
//! phpcs prints a banner like `PHP_CodeSniffer version 3.5.0 (stable) by
//! Squiz and Contributors`. The probe takes the first semantic-version
//! pattern from the combined output; the result drives every
//! version-gated flag in the command builder.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::LintError;
use crate::process;

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\.(\d+)\.(\d+)").expect("version regex"));

/// A phpcs semantic version, ordered by (major, minor, patch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ToolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ToolVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        ToolVersion {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for ToolVersion {
    type Err = LintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        extract_version(s).ok_or_else(|| LintError::ProbeFailed(s.to_string()))
    }
}

/// Find the first `N.N.N` pattern in tool output.
pub fn extract_version(output: &str) -> Option<ToolVersion> {
    let caps = VERSION_RE.captures(output)?;
    // The regex only admits digits, so the captures parse unless the
    // component overflows u32; treat overflow as no match.
    let component = |i: usize| caps[i].parse::<u32>().ok();
    Some(ToolVersion::new(component(1)?, component(2)?, component(3)?))
}

/// Run `<executable> --version` and parse the reported version.
///
/// Non-zero exit or a banner without a version pattern both mean the
/// configured binary is not really phpcs; the tool's own output is folded
/// into the error for the user to inspect.
pub async fn probe(executable: &Path, timeout: Duration) -> Result<ToolVersion, LintError> {
    let output = process::run(executable, &["--version".to_string()], "", None, timeout)
        .await
        .map_err(|e| LintError::ProbeFailed(e.to_string()))?;

    let combined = if output.stderr.is_empty() {
        output.stdout.clone()
    } else if output.stdout.is_empty() {
        output.stderr.clone()
    } else {
        format!("{} {}", output.stdout, output.stderr)
    };

    if !output.status.success() {
        return Err(LintError::ProbeFailed(combined));
    }

    extract_version(&combined).ok_or(LintError::ProbeFailed(combined))
}
