//! Tag discovery
//!
//! The database reports tag-typed columns with their storage type, so which
//! column carries which tag is recovered from the statement text. All of that
//! is isolated behind [`TagResolver`]; the classifier only sees [`ColumnTags`].

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::catalog::{Tag, TAGS};
use crate::reader::RawColumn;

/// Finds the result column a tag was cast onto
pub trait TagResolver {
    /// Index into `columns` of the column cast to `tag`, if any
    fn resolve_tag(&self, sql: &str, tag: Tag, columns: &[RawColumn]) -> Option<usize>;
}

/// Resolves tags from `::TAG AS "name"` casts in the statement text
///
/// Unaliased casts are matched through the column name DuckDB generates for
/// them, `CAST(<expr> AS "TAG")`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CastAliasResolver;

fn alias_patterns() -> &'static BTreeMap<Tag, Regex> {
    static PATTERNS: OnceLock<BTreeMap<Tag, Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        TAGS.iter()
            .map(|info| {
                let pattern = format!(
                    r#"(?i)::\s*{}\b\s+AS\s+(?:"((?:[^"]|"")*)"|([A-Za-z_][A-Za-z0-9_$]*))"#,
                    info.name
                );
                (
                    info.tag,
                    Regex::new(&pattern).expect("Invalid cast alias regex"),
                )
            })
            .collect()
    })
}

fn find_column(columns: &[RawColumn], name: &str) -> Option<usize> {
    columns
        .iter()
        .position(|c| c.name == name)
        .or_else(|| columns.iter().position(|c| c.name.eq_ignore_ascii_case(name)))
}

impl TagResolver for CastAliasResolver {
    fn resolve_tag(&self, sql: &str, tag: Tag, columns: &[RawColumn]) -> Option<usize> {
        if let Some(re) = alias_patterns().get(&tag) {
            for caps in re.captures_iter(sql) {
                let alias = match (caps.get(1), caps.get(2)) {
                    (Some(quoted), _) => quoted.as_str().replace("\"\"", "\""),
                    (None, Some(bare)) => bare.as_str().to_string(),
                    (None, None) => continue,
                };
                if let Some(index) = find_column(columns, &alias) {
                    return Some(index);
                }
            }
        }

        let bare = format!(" AS {})", tag.name());
        let quoted = format!(" AS \"{}\")", tag.name());
        columns.iter().position(|c| {
            let name = c.name.to_uppercase();
            name.ends_with(&quoted) || name.ends_with(&bare)
        })
    }
}

/// Tag assignments for one statement's result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnTags {
    by_tag: BTreeMap<Tag, usize>,
}

impl ColumnTags {
    /// Resolve every catalog tag against a statement and its columns
    ///
    /// Indices past the last column are ignored.
    pub fn resolve(resolver: &dyn TagResolver, sql: &str, columns: &[RawColumn]) -> Self {
        let by_tag = Tag::all()
            .filter_map(|tag| {
                resolver
                    .resolve_tag(sql, tag, columns)
                    .filter(|index| *index < columns.len())
                    .map(|index| (tag, index))
            })
            .collect();
        Self { by_tag }
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (Tag, usize)>) -> Self {
        Self {
            by_tag: pairs.into_iter().collect(),
        }
    }

    pub fn get(&self, tag: Tag) -> Option<usize> {
        self.by_tag.get(&tag).copied()
    }

    pub fn has(&self, tag: Tag) -> bool {
        self.by_tag.contains_key(&tag)
    }

    /// First of `tags` that is present, with its column
    pub fn first_of(&self, tags: &[Tag]) -> Option<(Tag, usize)> {
        tags.iter()
            .find_map(|tag| self.get(*tag).map(|index| (*tag, index)))
    }

    /// The tag assigned to a column, if any
    pub fn tag_of(&self, column: usize) -> Option<Tag> {
        self.by_tag
            .iter()
            .find(|(_, index)| **index == column)
            .map(|(tag, _)| *tag)
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<RawColumn> {
        names.iter().map(|n| RawColumn::new(*n, "VARCHAR")).collect()
    }

    #[test]
    fn test_quoted_alias() {
        let sql = r#"SELECT day::XAXIS AS "Day", total::LINECHART AS "Total sales" FROM t"#;
        let columns = cols(&["Day", "Total sales"]);
        let r = CastAliasResolver;
        assert_eq!(r.resolve_tag(sql, Tag::Xaxis, &columns), Some(0));
        assert_eq!(r.resolve_tag(sql, Tag::Linechart, &columns), Some(1));
        assert_eq!(r.resolve_tag(sql, Tag::Yaxis, &columns), None);
    }

    #[test]
    fn test_bare_alias_and_spacing() {
        let sql = "SELECT d :: xaxis as day, v::LINECHART_YAXIS AS value FROM t";
        let columns = cols(&["day", "value"]);
        let r = CastAliasResolver;
        assert_eq!(r.resolve_tag(sql, Tag::Xaxis, &columns), Some(0));
        assert_eq!(r.resolve_tag(sql, Tag::LinechartYaxis, &columns), Some(1));
        // LINECHART must not match the LINECHART_YAXIS cast
        assert_eq!(r.resolve_tag(sql, Tag::Linechart, &columns), None);
    }

    #[test]
    fn test_escaped_quote_in_alias() {
        let sql = r#"SELECT 'x'::LABEL AS "say ""hi""""#;
        let columns = cols(&[r#"say "hi""#]);
        assert_eq!(CastAliasResolver.resolve_tag(sql, Tag::Label, &columns), Some(0));
    }

    #[test]
    fn test_unaliased_cast_uses_generated_name() {
        let sql = "SELECT 'Revenue' ::LABEL";
        let columns = cols(&[r#"CAST('Revenue' AS "LABEL")"#]);
        assert_eq!(CastAliasResolver.resolve_tag(sql, Tag::Label, &columns), Some(0));

        let bare = cols(&["CAST('x' AS SECTION)"]);
        assert_eq!(CastAliasResolver.resolve_tag("SELECT 'x'::SECTION", Tag::Section, &bare), Some(0));
    }

    #[test]
    fn test_generated_name_of_longer_tag_does_not_match() {
        let columns = cols(&[r#"CAST(v AS "LINECHART_CATEGORY")"#]);
        let r = CastAliasResolver;
        assert_eq!(r.resolve_tag("SELECT v::LINECHART_CATEGORY", Tag::Linechart, &columns), None);
        assert_eq!(
            r.resolve_tag("SELECT v::LINECHART_CATEGORY", Tag::LinechartCategory, &columns),
            Some(0)
        );
    }

    /// Claims every tag for a column that does not exist
    struct OutOfRange;

    impl TagResolver for OutOfRange {
        fn resolve_tag(&self, _sql: &str, _tag: Tag, columns: &[RawColumn]) -> Option<usize> {
            Some(columns.len() + 1)
        }
    }

    #[test]
    fn test_out_of_range_indices_are_dropped() {
        let tags = ColumnTags::resolve(&OutOfRange, "SELECT 1, 2", &cols(&["a", "b"]));
        assert!(tags.is_empty());
        assert_eq!(tags.get(Tag::Compare), None);
    }

    #[test]
    fn test_alias_not_in_result_is_ignored() {
        let sql = r#"WITH x AS (SELECT 1::COMPARE AS "c") SELECT 2 AS v"#;
        let columns = cols(&["v"]);
        assert_eq!(CastAliasResolver.resolve_tag(sql, Tag::Compare, &columns), None);
    }

    #[test]
    fn test_column_tags() {
        let sql = r#"SELECT m::XAXIS AS "m", v::LINECHART AS "v", c::LINECHART_CATEGORY AS "c""#;
        let tags = ColumnTags::resolve(&CastAliasResolver, sql, &cols(&["m", "v", "c"]));
        assert_eq!(tags.get(Tag::Xaxis), Some(0));
        assert_eq!(tags.get(Tag::LinechartCategory), Some(2));
        assert_eq!(tags.tag_of(1), Some(Tag::Linechart));
        assert_eq!(
            tags.first_of(&[Tag::Barchart, Tag::Linechart]),
            Some((Tag::Linechart, 1))
        );
        assert!(!tags.has(Tag::Section));
    }
}
