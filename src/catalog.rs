//! Type & tag catalog
//!
//! Dashboards mark the role of a column by casting it to one of the custom
//! types listed here, e.g. `SELECT day::XAXIS AS "Day", total::LINECHART`.
//! Each tag is registered in the database as an alias of a storage type, so
//! the cast is transparent to SQL. The catalog also maps raw database type
//! names to the semantic display types the frontend understands.
//!
//! The tables are static and read-only; they are shared by all builds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// Closed set of display types a column can resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Year,
    Month,
    Hour,
    Date,
    Timestamp,
    Duration,
    Time,
    Number,
    String,
    Boolean,
    Object,
    Array,
    Percent,
}

impl SemanticType {
    /// Point-in-time types whose cells are emitted as epoch milliseconds
    pub fn is_time(self) -> bool {
        matches!(
            self,
            SemanticType::Year
                | SemanticType::Month
                | SemanticType::Date
                | SemanticType::Hour
                | SemanticType::Timestamp
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SemanticType::Year => "year",
            SemanticType::Month => "month",
            SemanticType::Hour => "hour",
            SemanticType::Date => "date",
            SemanticType::Timestamp => "timestamp",
            SemanticType::Duration => "duration",
            SemanticType::Time => "time",
            SemanticType::Number => "number",
            SemanticType::String => "string",
            SemanticType::Boolean => "boolean",
            SemanticType::Object => "object",
            SemanticType::Array => "array",
            SemanticType::Percent => "percent",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column roles that can be assigned through a cast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    Label,
    Xaxis,
    Yaxis,
    Linechart,
    LinechartYaxis,
    LinechartPercent,
    LinechartCategory,
    Barchart,
    BarchartPercent,
    BarchartStacked,
    BarchartStackedPercent,
    BarchartCategory,
    Category,
    Dropdown,
    DropdownMulti,
    Hint,
    Section,
    DownloadCsv,
    DownloadXlsx,
    Datepicker,
    DatepickerFrom,
    DatepickerTo,
    Compare,
    Trend,
    Placeholder,
    Percent,
}

/// How a tagged column's semantic type is decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticHint {
    /// Use the raw database type mapping
    Storage,
    /// Always this type
    Fixed(SemanticType),
    /// Data-driven: time granularity, then number, then string
    Axis,
    /// Numeric chart value, or duration when the values are intervals
    Chart,
}

/// One catalog entry
#[derive(Debug, Clone, Copy)]
pub struct TagInfo {
    pub tag: Tag,
    /// Type name used in casts (`::XAXIS`)
    pub name: &'static str,
    /// Database type the tag is an alias of
    pub stored_as: &'static str,
    pub hint: SemanticHint,
}

use SemanticHint::{Axis, Chart, Fixed, Storage};

/// Axis values keep their native type so time axes can be refined
const AXIS_STORAGE: &str = "UNION(\"text\" VARCHAR, \"timestamp\" TIMESTAMP, \"timestamptz\" TIMESTAMPTZ, \
                            \"date\" DATE, \"time\" TIME, \"number\" DOUBLE, \"interval\" INTERVAL)";

/// Chart values are numbers or durations
const CHART_STORAGE: &str = "UNION(\"interval\" INTERVAL, \"number\" DOUBLE)";

/// Every custom type known to the engine
pub static TAGS: &[TagInfo] = &[
    TagInfo { tag: Tag::Label, name: "LABEL", stored_as: "VARCHAR", hint: Storage },
    TagInfo { tag: Tag::Xaxis, name: "XAXIS", stored_as: AXIS_STORAGE, hint: Axis },
    TagInfo { tag: Tag::Yaxis, name: "YAXIS", stored_as: AXIS_STORAGE, hint: Axis },
    TagInfo { tag: Tag::Linechart, name: "LINECHART", stored_as: CHART_STORAGE, hint: Chart },
    TagInfo { tag: Tag::LinechartYaxis, name: "LINECHART_YAXIS", stored_as: "DOUBLE", hint: Axis },
    TagInfo { tag: Tag::LinechartPercent, name: "LINECHART_PERCENT", stored_as: "DOUBLE", hint: Fixed(SemanticType::Percent) },
    TagInfo { tag: Tag::LinechartCategory, name: "LINECHART_CATEGORY", stored_as: "VARCHAR", hint: Storage },
    TagInfo { tag: Tag::Barchart, name: "BARCHART", stored_as: CHART_STORAGE, hint: Chart },
    TagInfo { tag: Tag::BarchartPercent, name: "BARCHART_PERCENT", stored_as: "DOUBLE", hint: Fixed(SemanticType::Percent) },
    TagInfo { tag: Tag::BarchartStacked, name: "BARCHART_STACKED", stored_as: CHART_STORAGE, hint: Chart },
    TagInfo { tag: Tag::BarchartStackedPercent, name: "BARCHART_STACKED_PERCENT", stored_as: "DOUBLE", hint: Fixed(SemanticType::Percent) },
    TagInfo { tag: Tag::BarchartCategory, name: "BARCHART_CATEGORY", stored_as: "VARCHAR", hint: Storage },
    TagInfo { tag: Tag::Category, name: "CATEGORY", stored_as: "VARCHAR", hint: Storage },
    TagInfo { tag: Tag::Dropdown, name: "DROPDOWN", stored_as: "VARCHAR", hint: Fixed(SemanticType::String) },
    TagInfo { tag: Tag::DropdownMulti, name: "DROPDOWN_MULTI", stored_as: "VARCHAR", hint: Fixed(SemanticType::String) },
    TagInfo { tag: Tag::Hint, name: "HINT", stored_as: "VARCHAR", hint: Storage },
    TagInfo { tag: Tag::Section, name: "SECTION", stored_as: "VARCHAR", hint: Fixed(SemanticType::String) },
    TagInfo { tag: Tag::DownloadCsv, name: "DOWNLOAD_CSV", stored_as: "VARCHAR", hint: Fixed(SemanticType::String) },
    TagInfo { tag: Tag::DownloadXlsx, name: "DOWNLOAD_XLSX", stored_as: "VARCHAR", hint: Fixed(SemanticType::String) },
    TagInfo { tag: Tag::Datepicker, name: "DATEPICKER", stored_as: "DATE", hint: Fixed(SemanticType::Date) },
    TagInfo { tag: Tag::DatepickerFrom, name: "DATEPICKER_FROM", stored_as: "DATE", hint: Fixed(SemanticType::Date) },
    TagInfo { tag: Tag::DatepickerTo, name: "DATEPICKER_TO", stored_as: "DATE", hint: Fixed(SemanticType::Date) },
    TagInfo { tag: Tag::Compare, name: "COMPARE", stored_as: "DOUBLE", hint: Fixed(SemanticType::Number) },
    TagInfo { tag: Tag::Trend, name: "TREND", stored_as: "DOUBLE", hint: Fixed(SemanticType::Number) },
    TagInfo { tag: Tag::Placeholder, name: "PLACEHOLDER", stored_as: "VARCHAR", hint: Storage },
    TagInfo { tag: Tag::Percent, name: "PERCENT", stored_as: "DOUBLE", hint: Fixed(SemanticType::Percent) },
];

impl Tag {
    pub fn info(self) -> &'static TagInfo {
        // TAGS lists every variant exactly once
        TAGS.iter()
            .find(|info| info.tag == self)
            .unwrap_or(&TAGS[0])
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Case-insensitive lookup by cast type name
    pub fn from_name(name: &str) -> Option<Tag> {
        TAGS.iter()
            .find(|info| info.name.eq_ignore_ascii_case(name))
            .map(|info| info.tag)
    }

    pub fn all() -> impl Iterator<Item = Tag> {
        TAGS.iter().map(|info| info.tag)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// SQL that (re)creates every custom type
///
/// Run once per database before dashboards are built so that `::TAG` casts
/// resolve.
pub fn type_registration_sql() -> String {
    TAGS.iter()
        .map(|info| {
            format!(
                "DROP TYPE IF EXISTS {name};\nCREATE TYPE {name} AS {storage};\n",
                name = info.name,
                storage = info.stored_as
            )
        })
        .collect()
}

/// Result of looking up a raw database type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbTypeMapping {
    /// Plain fixed mapping
    Fixed(SemanticType),
    /// `DATE`: year or date, decided from the data
    Date,
    /// Timestamp family: granularity decided from the data
    Timestamp,
    /// `VARCHAR`: string, unless the data holds JSON objects/arrays
    Varchar,
    /// `VARCHAR[]`: joined into a single string per cell
    StringList,
}

fn decimal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^DECIMAL\(\d+,\s*\d+\)$").expect("Invalid decimal regex"))
}

/// Map a raw database type name to its semantic mapping
///
/// Returns `None` for types the engine does not know how to display.
pub fn lookup_db_type(db_type: &str) -> Option<DbTypeMapping> {
    use DbTypeMapping::*;

    let t = db_type.trim().to_uppercase();
    let mapping = match t.as_str() {
        "BOOLEAN" => Fixed(SemanticType::Boolean),
        "VARCHAR" | "ENUM" | "JSON" => Varchar,
        "DOUBLE" | "FLOAT" | "TINYINT" | "SMALLINT" | "INTEGER" | "BIGINT" | "HUGEINT"
        | "UTINYINT" | "USMALLINT" | "UINTEGER" | "UBIGINT" | "UHUGEINT" | "DECIMAL" => {
            Fixed(SemanticType::Number)
        }
        "DATE" => Date,
        "TIMESTAMP" | "TIMESTAMP_S" | "TIMESTAMP_MS" | "TIMESTAMP_NS" | "TIMESTAMPTZ"
        | "TIMESTAMP WITH TIME ZONE" => Timestamp,
        "INTERVAL" => Fixed(SemanticType::Duration),
        "TIME" => Fixed(SemanticType::Time),
        "UUID" | "BLOB" => Fixed(SemanticType::String),
        "VARCHAR[]" => StringList,
        // A tag union that no tag was resolved for
        "UNION" => Varchar,
        _ if decimal_regex().is_match(&t) => Fixed(SemanticType::Number),
        _ if t.starts_with("STRUCT") || t.starts_with("MAP") => Fixed(SemanticType::Object),
        _ if t.ends_with(']') => Fixed(SemanticType::Array),
        _ => return None,
    };
    Some(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_tag_listed_once() {
        let mut seen = std::collections::HashSet::new();
        for info in TAGS {
            assert!(seen.insert(info.tag), "duplicate tag {:?}", info.tag);
            assert_eq!(info.tag.info().name, info.name);
        }
    }

    #[test]
    fn test_tag_from_name() {
        assert_eq!(Tag::from_name("xaxis"), Some(Tag::Xaxis));
        assert_eq!(Tag::from_name("DOWNLOAD_CSV"), Some(Tag::DownloadCsv));
        assert_eq!(Tag::from_name("NOPE"), None);
    }

    #[test]
    fn test_registration_sql() {
        let sql = type_registration_sql();
        assert!(sql.contains("CREATE TYPE XAXIS AS UNION(\"text\" VARCHAR, \"timestamp\" TIMESTAMP,"));
        assert!(sql.contains("CREATE TYPE LINECHART AS UNION(\"interval\" INTERVAL, \"number\" DOUBLE);"));
        assert!(sql.contains("CREATE TYPE LABEL AS VARCHAR;"));
        assert!(sql.contains("CREATE TYPE DATEPICKER_FROM AS DATE;"));
        assert!(sql.contains("DROP TYPE IF EXISTS LINECHART;"));
    }

    #[test]
    fn test_lookup_db_type() {
        assert_eq!(
            lookup_db_type("INTEGER"),
            Some(DbTypeMapping::Fixed(SemanticType::Number))
        );
        assert_eq!(
            lookup_db_type("DECIMAL(18,3)"),
            Some(DbTypeMapping::Fixed(SemanticType::Number))
        );
        assert_eq!(lookup_db_type("TIMESTAMP_NS"), Some(DbTypeMapping::Timestamp));
        assert_eq!(lookup_db_type("date"), Some(DbTypeMapping::Date));
        assert_eq!(lookup_db_type("VARCHAR[]"), Some(DbTypeMapping::StringList));
        assert_eq!(
            lookup_db_type("INTEGER[]"),
            Some(DbTypeMapping::Fixed(SemanticType::Array))
        );
        assert_eq!(lookup_db_type("BIT"), None);
    }

    #[test]
    fn test_time_types() {
        assert!(SemanticType::Year.is_time());
        assert!(SemanticType::Hour.is_time());
        assert!(!SemanticType::Time.is_time());
        assert!(!SemanticType::Duration.is_time());
    }
}
