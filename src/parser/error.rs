//! Parser error types
//!
//! Provides location information for script parsing failures so authors can
//! find the offending line in their dashboard file.

use std::fmt;

/// Kind of quote left open at the end of a script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteKind {
    Single,
    Double,
}

impl QuoteKind {
    pub fn as_char(self) -> char {
        match self {
            QuoteKind::Single => '\'',
            QuoteKind::Double => '"',
        }
    }

    fn describe(self) -> &'static str {
        match self {
            QuoteKind::Single => "single",
            QuoteKind::Double => "double",
        }
    }
}

/// Detailed parse error with location information
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Line number where error occurred (0-based)
    pub line: usize,
    /// Column number where error occurred (0-based)
    pub column: usize,
    /// Set when the script ended inside a quoted literal
    pub unterminated: Option<QuoteKind>,
}

impl ParseError {
    /// Create a new parse error
    pub fn new(message: String, line: usize, column: usize) -> Self {
        Self {
            message,
            line,
            column,
            unterminated: None,
        }
    }

    /// A quote opened at `line`/`column` (0-based) was never closed
    pub fn unterminated_quote(kind: QuoteKind, line: usize, column: usize) -> Self {
        Self {
            message: format!("Unclosed {} quote", kind.describe()),
            line,
            column,
            unterminated: Some(kind),
        }
    }

    /// 1-based line number, as shown to authors
    pub fn line_number(&self) -> usize {
        self.line + 1
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} starting at line {}, column {}",
            self.message,
            self.line + 1,   // Display as 1-based
            self.column + 1  // Display as 1-based
        )
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for crate::ShaperError {
    fn from(err: ParseError) -> Self {
        crate::ShaperError::ParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_one_based() {
        let err = ParseError::unterminated_quote(QuoteKind::Single, 2, 7);
        assert_eq!(err.line_number(), 3);
        assert_eq!(
            err.to_string(),
            "Unclosed single quote starting at line 3, column 8"
        );
    }

    #[test]
    fn test_converts_into_crate_error() {
        let err: crate::ShaperError = ParseError::unterminated_quote(QuoteKind::Double, 0, 0).into();
        assert!(matches!(err, crate::ShaperError::ParseError(ref m) if m.contains("double quote")));
    }
}
