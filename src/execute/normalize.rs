//! Value normalization
//!
//! Turns driver cells into the JSON scalars the renderer expects: points in
//! time become epoch milliseconds, durations milliseconds, the bytes of a
//! `UUID` column their canonical text, and non-finite floats null.

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use serde_json::{Number, Value};

use crate::binder::QueryParams;
use crate::catalog::SemanticType;
use crate::document::Column;
use crate::download::DownloadFormat;
use crate::reader::Cell;

use super::resolve::{parse_number_text, parse_timestamp_text};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Total milliseconds of an interval, counting a month as 30 days
pub fn interval_millis(months: i32, days: i32, micros: i64) -> i64 {
    micros / 1000 + i64::from(days) * MILLIS_PER_DAY + i64::from(months) * 30 * MILLIS_PER_DAY
}

/// Milliseconds since midnight
pub fn time_millis(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight()) * 1000 + i64::from(time.nanosecond() / 1_000_000)
}

pub fn epoch_millis(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_millis()
}

/// `8-4-4-4-12` text for 16 raw bytes
pub fn uuid_string(bytes: &[u8]) -> Option<String> {
    uuid::Uuid::from_slice(bytes)
        .ok()
        .map(|id| id.hyphenated().to_string())
}

/// Text of a binary cell in a column of type `db_type`
///
/// Only `UUID` columns are formatted as UUIDs; other bytes are read as text.
pub fn bytes_text(bytes: &[u8], db_type: &str) -> String {
    Some(bytes)
        .filter(|_| db_type.eq_ignore_ascii_case("UUID"))
        .and_then(uuid_string)
        .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned())
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn text(s: &str, semantic: SemanticType) -> Value {
    match semantic {
        t if t.is_time() => parse_timestamp_text(s)
            .map(|ts| Value::from(epoch_millis(ts)))
            .unwrap_or_else(|| Value::String(s.to_string())),
        SemanticType::Time => parse_timestamp_text(s)
            .map(|ts| Value::from(time_millis(ts.time())))
            .unwrap_or_else(|| Value::String(s.to_string())),
        SemanticType::Number | SemanticType::Percent => parse_number_text(s)
            .map(float)
            .unwrap_or_else(|| Value::String(s.to_string())),
        SemanticType::Object | SemanticType::Array => serde_json::from_str(s)
            .unwrap_or_else(|_| Value::String(s.to_string())),
        _ => Value::String(s.to_string()),
    }
}

/// Normalize one cell of a column with the given semantic type
///
/// Binary cells are read as text; see [`normalize_rows`] for `UUID` columns.
pub fn normalize_cell(cell: &Cell, semantic: SemanticType) -> Value {
    let as_string = semantic == SemanticType::String;
    match cell {
        Cell::Null => Value::Null,
        Cell::Bool(b) => Value::Bool(*b),
        Cell::Int(i) => Value::from(*i),
        Cell::Float(f) if f.is_nan() => Value::Null,
        Cell::Float(f) if as_string => Value::String(f.to_string()),
        Cell::Float(f) => float(*f),
        Cell::Decimal(d) if as_string => Value::String(d.clone()),
        Cell::Decimal(d) => d.parse::<f64>().map(float).unwrap_or(Value::Null),
        Cell::Text(s) => text(s, semantic),
        Cell::Bytes(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
        Cell::Date(d) => {
            let ms = d.and_hms_opt(0, 0, 0).map(epoch_millis).unwrap_or_default();
            if as_string {
                Value::String(ms.to_string())
            } else {
                Value::from(ms)
            }
        }
        Cell::Time(t) => Value::from(time_millis(*t)),
        Cell::Timestamp(ts) if semantic == SemanticType::Time => Value::from(time_millis(ts.time())),
        Cell::Timestamp(ts) if as_string => Value::String(epoch_millis(*ts).to_string()),
        Cell::Timestamp(ts) => Value::from(epoch_millis(*ts)),
        Cell::Interval {
            months,
            days,
            micros,
        } => Value::from(interval_millis(*months, *days, *micros)),
        Cell::List(items) if as_string => Value::String(
            items
                .iter()
                .map(|item| item.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Cell::List(items) => Value::Array(
            items
                .iter()
                .map(|item| normalize_cell(item, element_type(item)))
                .collect(),
        ),
    }
}

/// Natural semantic type of a list element
fn element_type(cell: &Cell) -> SemanticType {
    match cell {
        Cell::Date(_) | Cell::Timestamp(_) => SemanticType::Timestamp,
        Cell::Time(_) => SemanticType::Time,
        Cell::Interval { .. } => SemanticType::Duration,
        Cell::List(_) => SemanticType::Array,
        Cell::Bool(_) => SemanticType::Boolean,
        Cell::Int(_) | Cell::Float(_) | Cell::Decimal(_) => SemanticType::Number,
        _ => SemanticType::String,
    }
}

/// Normalize a statement's rows against its resolved columns
pub fn normalize_rows(rows: &[Vec<Cell>], columns: &[Column]) -> Vec<Vec<Value>> {
    rows.iter()
        .map(|row| {
            row.iter()
                .zip(columns)
                .map(|(cell, column)| match cell {
                    Cell::Bytes(b) => Value::String(bytes_text(b, &column.db_type)),
                    _ => normalize_cell(cell, column.semantic),
                })
                .collect()
        })
        .collect()
}

/// Link that streams the result of statement `statement_index` as a file
///
/// The filename is form-encoded; the request's query parameters are
/// appended so the download sees the same filter selection.
pub fn download_url(
    api_prefix: &str,
    dashboard_id: &str,
    statement_index: usize,
    filename: &str,
    format: DownloadFormat,
    params: &QueryParams,
) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(filename.as_bytes()).collect();
    let mut link = format!(
        "{}/{}/query/{}/{}.{}",
        api_prefix.trim_end_matches('/'),
        dashboard_id,
        statement_index,
        encoded,
        format.extension()
    );
    if !params.is_empty() {
        link.push('?');
        link.push_str(&params.to_query_string());
    }
    link
}
