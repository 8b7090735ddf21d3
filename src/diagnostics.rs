//! Mapping analysis messages onto document ranges.
//!
//! phpcs positions are 1-based line/column anchors; LSP wants 0-based
//! character ranges. The anchor is widened against the live document
//! text so the editor underlines something meaningful: a whitespace run,
//! the identifier around the anchor, or a single punctuation character.

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, NumberOrString, Position, Range};

use crate::report::AnalysisMessage;

/// Characters that may lead an identifier besides letters and digits.
/// `$` marks variables in the analyzed language.
const WORD_SIGILS: &[char] = &['$'];

/// Map one tool message onto the document text.
pub fn map(text: &str, message: &AnalysisMessage, show_sources: bool) -> Diagnostic {
    let line_index = message.line.saturating_sub(1);
    let anchor = message.column.saturating_sub(1) as usize;

    let line = text.lines().nth(line_index as usize).unwrap_or("");
    let (start_col, end_col) = expand(line, anchor);

    // The tool tags severity as a string; anything that is not exactly
    // WARNING counts as an error.
    let severity = if message.kind == "WARNING" {
        DiagnosticSeverity::WARNING
    } else {
        DiagnosticSeverity::ERROR
    };

    let mut rendered = message.message.clone();
    if show_sources && let Some(source) = &message.source {
        rendered.push_str("\n(");
        rendered.push_str(source);
        rendered.push(')');
    }

    Diagnostic {
        range: Range {
            start: Position {
                line: line_index,
                character: start_col as u32,
            },
            end: Position {
                line: line_index,
                character: end_col as u32,
            },
        },
        severity: Some(severity),
        code: message.source.clone().map(NumberOrString::String),
        source: Some("phpcs".to_string()),
        message: rendered,
        ..Diagnostic::default()
    }
}

/// Expand a 0-based column anchor into a `[start, end)` range on one line.
fn expand(line: &str, anchor: usize) -> (usize, usize) {
    let chars: Vec<char> = line.chars().collect();
    let Some(&ch) = chars.get(anchor) else {
        // Anchor past the end of the line: highlight one notional column.
        return (anchor, anchor + 1);
    };

    if ch.is_whitespace() {
        // Whole contiguous whitespace run, end exclusive.
        let mut end = anchor + 1;
        while chars.get(end).is_some_and(|c| c.is_whitespace()) {
            end += 1;
        }
        (anchor, end)
    } else if is_word_char(ch) {
        // Whole identifier around the anchor.
        let mut end = anchor + 1;
        while chars
            .get(end)
            .is_some_and(|c| c.is_alphanumeric() || *c == '_')
        {
            end += 1;
        }
        let mut start = anchor;
        while start > 0 && is_word_char(chars[start - 1]) {
            start -= 1;
        }
        (start, end)
    } else {
        (anchor, anchor + 1)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || WORD_SIGILS.contains(&c)
}
