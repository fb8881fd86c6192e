//! Column type resolution
//!
//! Maps each column's database type to a semantic display type. Timestamps,
//! dates, JSON-looking text and axis columns are refined from the rows that
//! were already fetched for the statement.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::catalog::{lookup_db_type, DbTypeMapping, SemanticHint, SemanticType};
use crate::document::Column;
use crate::reader::{Cell, RawColumn};
use crate::tags::ColumnTags;
use crate::{Result, ShaperError};

/// Formats accepted for timestamps held in text (axis) columns
const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Same, with a UTC offset: `+00`, `+0530` or `+05:30`
const ZONED_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

/// Parse a timestamp or date written as text
///
/// Zoned timestamps are converted to UTC.
pub(crate) fn parse_timestamp_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            ZONED_FORMATS
                .iter()
                .find_map(|fmt| DateTime::parse_from_str(text, fmt).ok())
                .map(|ts| ts.naive_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

pub(crate) fn parse_number_text(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

fn samples<'a>(rows: &'a [Vec<Cell>], index: usize) -> impl Iterator<Item = &'a Cell> {
    rows.iter()
        .filter_map(move |row| row.get(index))
        .filter(|cell| !cell.is_null())
}

/// Finest granularity needed to show every timestamp without losing detail
///
/// Fewer than two samples give `timestamp`. Samples that only carry a time of
/// day (all on 0001-01-01) give `time`.
pub fn refine_timestamps(values: &[NaiveDateTime]) -> SemanticType {
    if values.len() < 2 {
        return SemanticType::Timestamp;
    }

    let mut has_year = false;
    let mut has_month = false;
    let mut has_day = false;
    let mut has_hour = false;
    let mut has_sub_hour = false;

    for ts in values {
        has_year |= ts.year() != 1;
        has_month |= ts.month() != 1;
        has_day |= ts.day() != 1;
        has_hour |= ts.hour() != 0;
        has_sub_hour |= ts.minute() != 0 || ts.second() != 0 || ts.nanosecond() != 0;

        if has_sub_hour && (has_year || has_month || has_day) {
            return SemanticType::Timestamp;
        }
    }

    if !(has_year || has_month || has_day) && (has_hour || has_sub_hour) {
        SemanticType::Time
    } else if has_sub_hour {
        SemanticType::Timestamp
    } else if has_hour {
        SemanticType::Hour
    } else if has_day {
        SemanticType::Date
    } else if has_month {
        SemanticType::Month
    } else {
        SemanticType::Year
    }
}

fn timestamp_type(rows: &[Vec<Cell>], index: usize) -> SemanticType {
    let values: Vec<NaiveDateTime> = samples(rows, index)
        .filter_map(|cell| match cell {
            Cell::Timestamp(ts) => Some(*ts),
            Cell::Date(d) => d.and_hms_opt(0, 0, 0),
            _ => None,
        })
        .collect();
    refine_timestamps(&values)
}

fn date_type(rows: &[Vec<Cell>], index: usize) -> SemanticType {
    let dates: Vec<NaiveDate> = samples(rows, index)
        .filter_map(|cell| match cell {
            Cell::Date(d) => Some(*d),
            _ => None,
        })
        .collect();
    if dates.len() >= 2 && dates.iter().all(|d| d.month() == 1 && d.day() == 1) {
        SemanticType::Year
    } else {
        SemanticType::Date
    }
}

fn varchar_type(rows: &[Vec<Cell>], index: usize) -> SemanticType {
    let first = samples(rows, index).find_map(|cell| cell.as_text());
    match first.and_then(|text| serde_json::from_str::<serde_json::Value>(text).ok()) {
        Some(serde_json::Value::Object(_)) => SemanticType::Object,
        Some(serde_json::Value::Array(_)) => SemanticType::Array,
        _ => SemanticType::String,
    }
}

/// Time granularity if every sample is a timestamp, else number, else string
fn axis_type(rows: &[Vec<Cell>], index: usize) -> SemanticType {
    let cells: Vec<&Cell> = samples(rows, index).collect();
    if cells.is_empty() {
        return SemanticType::String;
    }
    if cells.iter().all(|c| matches!(c, Cell::Time(_))) {
        return SemanticType::Time;
    }

    let timestamps: Option<Vec<NaiveDateTime>> = cells
        .iter()
        .map(|cell| match cell {
            Cell::Timestamp(ts) => Some(*ts),
            Cell::Date(d) => d.and_hms_opt(0, 0, 0),
            Cell::Text(s) => parse_timestamp_text(s),
            _ => None,
        })
        .collect();
    if let Some(timestamps) = timestamps {
        return refine_timestamps(&timestamps);
    }

    let numeric = cells.iter().all(|cell| match cell {
        Cell::Int(_) | Cell::Float(_) | Cell::Decimal(_) => true,
        Cell::Text(s) => parse_number_text(s).is_some(),
        _ => false,
    });
    if numeric {
        return SemanticType::Number;
    }

    if cells.iter().all(|c| matches!(c, Cell::Interval { .. })) {
        return SemanticType::Duration;
    }

    SemanticType::String
}

fn storage_type(raw: &RawColumn, rows: &[Vec<Cell>], index: usize) -> Result<SemanticType> {
    let mapping =
        lookup_db_type(&raw.db_type).ok_or_else(|| ShaperError::UnsupportedColumnType {
            column: raw.name.clone(),
            db_type: raw.db_type.clone(),
        })?;

    Ok(match mapping {
        DbTypeMapping::Fixed(t) => t,
        DbTypeMapping::Date => date_type(rows, index),
        DbTypeMapping::Timestamp => timestamp_type(rows, index),
        DbTypeMapping::Varchar => varchar_type(rows, index),
        DbTypeMapping::StringList => SemanticType::String,
    })
}

/// Resolve the semantic type of one column
pub fn resolve_column_type(
    raw: &RawColumn,
    hint: SemanticHint,
    rows: &[Vec<Cell>],
    index: usize,
) -> Result<SemanticType> {
    match hint {
        SemanticHint::Fixed(t) => Ok(t),
        SemanticHint::Axis => Ok(axis_type(rows, index)),
        SemanticHint::Chart => {
            let is_interval = samples(rows, index)
                .next()
                .is_some_and(|c| matches!(c, Cell::Interval { .. }));
            Ok(if is_interval {
                SemanticType::Duration
            } else {
                SemanticType::Number
            })
        }
        SemanticHint::Storage => storage_type(raw, rows, index),
    }
}

/// Resolve every column of a statement result
///
/// A tag's hint takes precedence over the database type. Column roles are
/// filled in once the statement has been classified.
pub fn resolve_columns(
    raw: &[RawColumn],
    rows: &[Vec<Cell>],
    tags: &ColumnTags,
) -> Result<Vec<Column>> {
    raw.iter()
        .enumerate()
        .map(|(index, column)| {
            let tag = tags.tag_of(index);
            let hint = tag.map(|t| t.info().hint).unwrap_or(SemanticHint::Storage);
            let semantic = resolve_column_type(column, hint, rows, index)?;
            let nullable = rows
                .iter()
                .any(|row| row.get(index).map_or(true, Cell::is_null));

            Ok(Column {
                name: column.name.clone(),
                db_type: column.db_type.clone(),
                semantic,
                nullable,
                tag: None,
            })
        })
        .collect()
}
