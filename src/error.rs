//! Error taxonomy for the lint pipeline.
//!
//! Fatal errors (`NotFound`, `Configuration`, `ProbeFailed`) poison the
//! executable cache and block validation for the whole workspace until a
//! settings change forces re-resolution. Everything else is scoped to a
//! single document and leaves other documents' diagnostics untouched.

use std::time::Duration;

use thiserror::Error;

/// Errors produced anywhere in the lint pipeline.
#[derive(Debug, Clone, Error)]
pub enum LintError {
    /// No resolver could locate the phpcs executable.
    #[error(
        "Unable to locate phpcs. Please add phpcs to your global path or \
         install it in your project with composer."
    )]
    NotFound,

    /// A dependency manifest declares phpcs but the installation is unmet.
    #[error("{0}")]
    Configuration(String),

    /// The resolved executable did not report a parseable version.
    #[error("Unable to determine phpcs version: {0}")]
    ProbeFailed(String),

    /// phpcs ran and reported a semantic problem (bad config, fatal error).
    #[error("{0}")]
    Tool(String),

    /// The requested coding standard is not installed.
    #[error("The \"{0}\" coding standard is not installed.")]
    CodingStandardNotInstalled(String),

    /// The subprocess produced stderr matching no known error pattern.
    #[error("Unknown error while executing `{command}`: {stderr}")]
    UnknownExecution { command: String, stderr: String },

    /// stdout was not a valid phpcs JSON report.
    #[error("The phpcs report contains invalid json: {0}")]
    MalformedReport(String),

    /// The subprocess exceeded its wall-clock budget and was killed.
    #[error("phpcs did not finish within {}s and was terminated", .0.as_secs())]
    Timeout(Duration),

    /// The subprocess could not be spawned at all.
    #[error("Failed to spawn phpcs: {0}")]
    Spawn(String),
}

impl LintError {
    /// Fatal errors block all validation until settings change.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LintError::NotFound | LintError::Configuration(_) | LintError::ProbeFailed(_)
        )
    }

    /// Render for a `window/showMessage` popup: newlines collapsed to
    /// spaces and a leading "ERROR: " prefix stripped.
    pub fn user_message(&self) -> String {
        let text = self.to_string().replace(['\r', '\n'], " ");
        let trimmed = text.trim();
        let stripped = trimmed
            .get(..6)
            .filter(|prefix| prefix.eq_ignore_ascii_case("error:"))
            .map(|_| trimmed[6..].trim_start())
            .unwrap_or(trimmed);
        stripped.to_string()
    }
}
