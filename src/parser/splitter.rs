//! Quote-aware statement splitter
//!
//! Dashboard scripts are plain SQL: an ordered list of statements separated
//! by semicolons. Semicolons and comment markers inside single- or
//! double-quoted text are literal, and a doubled quote inside a quoted
//! literal is an escaped quote character.

use super::error::{ParseError, QuoteKind};
use super::Statement;

/// Tracks which literal (if any) the scanner is inside
#[derive(Debug, Default)]
struct QuoteState {
    open: Option<(QuoteKind, usize, usize)>,
}

impl QuoteState {
    fn inside(&self) -> bool {
        self.open.is_some()
    }

    /// Feed a quote character. Returns true when the character was consumed
    /// as part of the state machine (i.e. it is a quote of a relevant kind).
    fn toggle(&mut self, kind: QuoteKind, line: usize, column: usize) -> bool {
        match self.open {
            None => {
                self.open = Some((kind, line, column));
                true
            }
            Some((open_kind, _, _)) if open_kind == kind => {
                self.open = None;
                true
            }
            Some(_) => false,
        }
    }
}

fn push(current: &mut String, statements: &mut Vec<Statement>) {
    let sql = current.trim();
    if !sql.is_empty() {
        statements.push(Statement::new(statements.len(), sql));
    }
    current.clear();
}

fn quote_kind(c: char) -> Option<QuoteKind> {
    match c {
        '\'' => Some(QuoteKind::Single),
        '"' => Some(QuoteKind::Double),
        _ => None,
    }
}

/// Remove `--` line comments from a script
///
/// Comment markers inside quoted literals are kept. Newlines are preserved so
/// line numbers reported by [`split_statements`] still match the author's file.
pub fn strip_comments(script: &str) -> String {
    let mut out = String::with_capacity(script.len());
    let mut quotes = QuoteState::default();
    let mut chars = script.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(kind) = quote_kind(c) {
            if chars.peek() == Some(&c) {
                out.push(c);
                out.push(c);
                chars.next();
                continue;
            }
            quotes.toggle(kind, 0, 0);
            out.push(c);
            continue;
        }

        if c == '-' && !quotes.inside() && chars.peek() == Some(&'-') {
            // Skip to end of line, keep the newline itself
            for skipped in chars.by_ref() {
                if skipped == '\n' {
                    out.push('\n');
                    break;
                }
            }
            continue;
        }

        out.push(c);
    }

    out
}

/// Split a dashboard script into its statements
///
/// Comments are stripped first. Each returned statement is trimmed and has its
/// terminating semicolon removed; empty statements are skipped. Text after the
/// last semicolon is kept as a final statement unless it is blank.
///
/// # Errors
///
/// Returns a [`ParseError`] pointing at the line and column where a quote was
/// opened if the script ends inside a quoted literal.
pub fn split_statements(script: &str) -> Result<Vec<Statement>, ParseError> {
    let clean = strip_comments(script);

    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quotes = QuoteState::default();
    let mut line = 0usize;
    let mut column = 0usize;
    let mut chars = clean.chars().peekable();

    while let Some(c) = chars.next() {
        let (at_line, at_column) = (line, column);
        if c == '\n' {
            line += 1;
            column = 0;
        } else {
            column += 1;
        }

        if let Some(kind) = quote_kind(c) {
            let same_kind_open = matches!(quotes.open, Some((k, _, _)) if k == kind);
            if (same_kind_open || !quotes.inside()) && chars.peek() == Some(&c) {
                // Doubled quote: escaped literal quote (or an empty literal)
                current.push(c);
                current.push(c);
                chars.next();
                column += 1;
                continue;
            }
            quotes.toggle(kind, at_line, at_column);
            current.push(c);
            continue;
        }

        if c == ';' && !quotes.inside() {
            push(&mut current, &mut statements);
            continue;
        }

        current.push(c);
    }

    if let Some((kind, open_line, open_column)) = quotes.open {
        return Err(ParseError::unterminated_quote(kind, open_line, open_column));
    }

    push(&mut current, &mut statements);

    Ok(statements)
}
