//! Parsing phpcs output into analysis messages.
//!
//! Tool-level failures are classified before any JSON parsing is
//! attempted: a fatal error on stderr, unrecognized stderr, or a leading
//! `ERROR:`/`FATAL ERROR:` line on stdout each map to their own error.
//! Only clean output is treated as a JSON report.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::command::gates;
use crate::error::LintError;
use crate::version::ToolVersion;

/// Report key phpcs uses for text received on stdin without a path.
pub const STDIN_KEY: &str = "STDIN";

static FATAL_STDERR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:php\s+)?fatal\s+error").expect("fatal regex"));
static EMBEDDED_EXCEPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)uncaught\s+exception\s+'[^']*'\s+with\s+message\s+'([^']+)'")
        .expect("exception regex")
});
static LEADING_ERROR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^error:\s*(.+)").expect("error regex"));
static LEADING_FATAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^fatal\s+error:\s*(.+)").expect("fatal stdout regex"));
static STANDARD_NOT_INSTALLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)the\s+"([^"]+)"\s+coding\s+standard\s+is\s+not\s+installed"#)
        .expect("standard regex")
});

/// One normalized message from the tool's JSON report.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisMessage {
    /// Human-readable message text.
    pub message: String,
    /// Severity class as reported: `"ERROR"` or `"WARNING"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// 1-based source line.
    pub line: u32,
    /// 1-based source column.
    pub column: u32,
    /// Rule identifier that produced the message, when the tool reports it.
    #[serde(default)]
    pub source: Option<String>,
    /// Whether `phpcbf` could fix this automatically. Informational only.
    #[serde(default)]
    pub fixable: bool,
}

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(default)]
    totals: Totals,
    #[serde(default)]
    files: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct Totals {
    #[serde(default)]
    errors: u64,
    #[serde(default)]
    warnings: u64,
}

#[derive(Debug, Default, Deserialize)]
struct FileReport {
    #[serde(default)]
    messages: Vec<AnalysisMessage>,
}

/// Pick the report key for this run: the symlink-resolved document path
/// when the tool was told about it, the stdin pseudo-file otherwise.
pub fn report_key(file_path: Option<&Path>, version: ToolVersion) -> String {
    if let Some(path) = file_path
        && gates::FILENAME.admits(version)
    {
        let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        return resolved.to_string_lossy().into_owned();
    }
    STDIN_KEY.to_string()
}

/// Classify raw tool output and extract the message list under `key`.
///
/// `command` is the rendered command line, used only to make unknown
/// execution failures diagnosable.
pub fn parse(
    stdout: &str,
    stderr: &str,
    key: &str,
    command: &str,
) -> Result<Vec<AnalysisMessage>, LintError> {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        if FATAL_STDERR.is_match(stderr) {
            return Err(LintError::Tool(extract_fatal_message(stderr)));
        }
        return Err(LintError::UnknownExecution {
            command: command.to_string(),
            stderr: stderr.to_string(),
        });
    }

    let stdout = stdout.trim();
    if let Some(caps) = LEADING_ERROR.captures(stdout) {
        let text = caps[1].trim().to_string();
        if let Some(std_caps) = STANDARD_NOT_INSTALLED.captures(&text) {
            return Err(LintError::CodingStandardNotInstalled(std_caps[1].to_string()));
        }
        return Err(LintError::Tool(text));
    }
    if let Some(caps) = LEADING_FATAL.captures(stdout) {
        return Err(LintError::Tool(extract_fatal_message(caps[1].trim())));
    }

    let report: Report =
        serde_json::from_str(stdout).map_err(|e| LintError::MalformedReport(e.to_string()))?;

    // A clean run needs no per-file records at all; skipping them also
    // avoids resolving real paths for zero-result runs.
    if report.totals.errors == 0 && report.totals.warnings == 0 {
        return Ok(Vec::new());
    }

    let files: HashMap<String, FileReport> = serde_json::from_value(report.files)
        .map_err(|e| LintError::MalformedReport(e.to_string()))?;

    // A missing key means the tool filed the messages elsewhere (or
    // nowhere); that is an empty result, not a failure.
    Ok(files.get(key).map(|f| f.messages.clone()).unwrap_or_default())
}

fn extract_fatal_message(text: &str) -> String {
    match EMBEDDED_EXCEPTION.captures(text) {
        Some(caps) => caps[1].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CMD: &str = "/usr/bin/phpcs --report=json -";

    fn report_with_messages() -> String {
        r#"{
            "totals": {"errors": 1, "warnings": 1, "fixable": 1},
            "files": {
                "STDIN": {
                    "errors": 1,
                    "warnings": 1,
                    "messages": [
                        {
                            "message": "Missing file doc comment",
                            "source": "PEAR.Commenting.FileComment.Missing",
                            "severity": 5,
                            "type": "ERROR",
                            "line": 2,
                            "column": 1,
                            "fixable": false
                        },
                        {
                            "message": "Line exceeds 85 characters",
                            "source": "Generic.Files.LineLength.TooLong",
                            "severity": 5,
                            "type": "WARNING",
                            "line": 5,
                            "column": 86,
                            "fixable": true
                        }
                    ]
                }
            }
        }"#
        .to_string()
    }

    #[test]
    fn parses_stdin_keyed_report() {
        let messages = parse(&report_with_messages(), "", STDIN_KEY, CMD).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].kind, "ERROR");
        assert_eq!(messages[0].line, 2);
        assert_eq!(messages[0].column, 1);
        assert_eq!(
            messages[0].source.as_deref(),
            Some("PEAR.Commenting.FileComment.Missing")
        );
        assert_eq!(messages[1].kind, "WARNING");
        assert!(messages[1].fixable);
    }

    #[test]
    fn missing_key_is_empty_not_an_error() {
        let messages = parse(&report_with_messages(), "", "/other/file.php", CMD).unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn zero_totals_short_circuit_even_with_malformed_files() {
        // files is a string here, which would fail strict parsing.
        let stdout = r#"{"totals":{"errors":0,"warnings":0,"fixable":0},"files":"garbage"}"#;
        let messages = parse(stdout, "", STDIN_KEY, CMD).unwrap();
        assert!(messages.is_empty());

        // files absent entirely.
        let stdout = r#"{"totals":{"errors":0,"warnings":0}}"#;
        let messages = parse(stdout, "", STDIN_KEY, CMD).unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn nonzero_totals_with_malformed_files_is_malformed_report() {
        let stdout = r#"{"totals":{"errors":2,"warnings":0},"files":"garbage"}"#;
        assert!(matches!(
            parse(stdout, "", STDIN_KEY, CMD),
            Err(LintError::MalformedReport(_))
        ));
    }

    #[test]
    fn invalid_json_is_malformed_report() {
        assert!(matches!(
            parse("not json at all", "", STDIN_KEY, CMD),
            Err(LintError::MalformedReport(_))
        ));
    }

    #[test]
    fn missing_standard_is_classified_with_its_name() {
        let stdout = r#"ERROR: the "Foo" coding standard is not installed. The installed coding standards are PEAR, PSR1 and PSR2."#;
        match parse(stdout, "", STDIN_KEY, CMD) {
            Err(LintError::CodingStandardNotInstalled(name)) => assert_eq!(name, "Foo"),
            other => panic!("expected CodingStandardNotInstalled, got {other:?}"),
        }
    }

    #[test]
    fn leading_error_is_a_tool_error() {
        let stdout = "ERROR: Ruleset phpcs.xml is not valid";
        match parse(stdout, "", STDIN_KEY, CMD) {
            Err(LintError::Tool(msg)) => assert_eq!(msg, "Ruleset phpcs.xml is not valid"),
            other => panic!("expected Tool error, got {other:?}"),
        }
    }

    #[test]
    fn fatal_stderr_extracts_embedded_exception() {
        let stderr = "PHP Fatal error:  Uncaught exception 'RuntimeException' with message 'Config file is missing' in /usr/share/phpcs/CLI.php:42";
        match parse("", stderr, STDIN_KEY, CMD) {
            Err(LintError::Tool(msg)) => assert_eq!(msg, "Config file is missing"),
            other => panic!("expected Tool error, got {other:?}"),
        }
    }

    #[test]
    fn fatal_stderr_without_exception_keeps_full_text() {
        let stderr = "Fatal error: Allowed memory size exhausted";
        match parse("", stderr, STDIN_KEY, CMD) {
            Err(LintError::Tool(msg)) => assert_eq!(msg, stderr),
            other => panic!("expected Tool error, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_stderr_carries_the_command_line() {
        let stderr = "sh: php: command not found";
        match parse("", stderr, STDIN_KEY, CMD) {
            Err(LintError::UnknownExecution { command, stderr: captured }) => {
                assert_eq!(command, CMD);
                assert_eq!(captured, stderr);
            }
            other => panic!("expected UnknownExecution, got {other:?}"),
        }
    }

    #[test]
    fn fatal_stdout_extracts_embedded_exception() {
        let stdout = "FATAL ERROR: Uncaught exception 'Exception' with message 'boom' in CLI.php";
        match parse(stdout, "", STDIN_KEY, CMD) {
            Err(LintError::Tool(msg)) => assert_eq!(msg, "boom"),
            other => panic!("expected Tool error, got {other:?}"),
        }
    }

    #[test]
    fn report_key_prefers_stdin_for_old_tools_and_unsaved_documents() {
        let version_old = ToolVersion::new(1, 5, 0);
        let version_new = ToolVersion::new(3, 5, 0);

        assert_eq!(report_key(None, version_new), STDIN_KEY);
        assert_eq!(
            report_key(Some(Path::new("/p/file.php")), version_old),
            STDIN_KEY
        );
    }

    #[test]
    fn report_key_resolves_symlinks_for_modern_tools() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real.php");
        std::fs::write(&real, "<?php\n").unwrap();

        let key = report_key(Some(&real), ToolVersion::new(3, 0, 0));
        assert_eq!(key, real.canonicalize().unwrap().to_string_lossy());
    }
}
