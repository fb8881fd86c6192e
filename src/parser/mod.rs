/*!
Dashboard Script Parser

A dashboard is a single SQL script. Parsing is deliberately shallow: the
script is split into statements and each statement is kept as text. The SQL
itself is only interpreted by the database.

## Example Usage

```rust
# use shaper::parser::split_statements;
# fn main() -> Result<(), Box<dyn std::error::Error>> {
let script = r#"
    SELECT 'Revenue'::LABEL;
    SELECT sum(amount) FROM sales; -- a comment; with a semicolon
"#;

let statements = split_statements(script)?;
assert_eq!(statements.len(), 2);
assert_eq!(statements[1].sql, "SELECT sum(amount) FROM sales");
# Ok(())
# }
```
*/

pub mod error;
pub mod splitter;

pub use error::{ParseError, QuoteKind};
pub use splitter::{split_statements, strip_comments};

/// One SQL statement of a dashboard script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// 0-based position in the script
    pub index: usize,
    /// Trimmed statement text without the terminating semicolon
    pub sql: String,
}

impl Statement {
    pub fn new(index: usize, sql: impl Into<String>) -> Self {
        Self {
            index,
            sql: sql.into(),
        }
    }

    /// Whether the statement only exists for its side effects
    ///
    /// These statements are executed but never rendered.
    pub fn is_side_effect(&self) -> bool {
        is_side_effect(&self.sql)
    }
}

/// Statement prefixes (keyword sequences) that are run but not rendered
const SIDE_EFFECT_PREFIXES: &[&[&str]] = &[
    &["ATTACH"],
    &["DETACH"],
    &["USE"],
    &["SET", "VARIABLE"],
    &["RESET", "VARIABLE"],
    &["CREATE", "TEMPORARY", "TABLE"],
    &["CREATE", "TEMPORARY", "VIEW"],
    &["CREATE", "TEMP", "TABLE"],
    &["CREATE", "TEMP", "VIEW"],
    &["CREATE", "OR", "REPLACE", "TEMPORARY", "TABLE"],
    &["CREATE", "OR", "REPLACE", "TEMPORARY", "VIEW"],
    &["CREATE", "OR", "REPLACE", "TEMP", "TABLE"],
    &["CREATE", "OR", "REPLACE", "TEMP", "VIEW"],
    &["CREATE", "TEMP", "MACRO"],
    &["CREATE", "TEMP", "FUNCTION"],
    &["CREATE", "TEMPORARY", "MACRO"],
    &["CREATE", "TEMPORARY", "FUNCTION"],
    &["CREATE", "OR", "REPLACE", "TEMP", "MACRO"],
    &["CREATE", "OR", "REPLACE", "TEMP", "FUNCTION"],
    &["CREATE", "OR", "REPLACE", "TEMPORARY", "MACRO"],
    &["CREATE", "OR", "REPLACE", "TEMPORARY", "FUNCTION"],
];

/// Case- and whitespace-insensitive check against [`SIDE_EFFECT_PREFIXES`]
pub fn is_side_effect(sql: &str) -> bool {
    let words: Vec<String> = sql
        .split_whitespace()
        .take(6)
        .map(|w| w.to_uppercase())
        .collect();

    SIDE_EFFECT_PREFIXES.iter().any(|prefix| {
        prefix.len() <= words.len() && prefix.iter().zip(&words).all(|(p, w)| *p == w.as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_effect_statements() {
        assert!(is_side_effect("create temp table t AS SELECT 1"));
        assert!(is_side_effect("CREATE   OR REPLACE\nTEMPORARY VIEW v AS SELECT 1"));
        assert!(is_side_effect("ATTACH 'other.db'"));
        assert!(is_side_effect("set variable x = 1"));
        assert!(is_side_effect("CREATE TEMP MACRO m(a) AS a + 1"));
    }

    #[test]
    fn test_regular_statements_are_rendered() {
        assert!(!is_side_effect("SELECT 1"));
        assert!(!is_side_effect("CREATE TABLE t (x INT)"));
        assert!(!is_side_effect("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(!is_side_effect("USER_COUNT"));
    }
}
