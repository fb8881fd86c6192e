//! DuckDB data source implementation
//!
//! Streams typed rows from DuckDB (in-memory or file-based) as [`Cell`]s.

use chrono::{DateTime, NaiveDate, NaiveTime};
use duckdb::arrow::datatypes::DataType;
use duckdb::types::{TimeUnit, Value};
use duckdb::{AccessMode, Config, Connection};
use tracing::debug;

use crate::catalog::type_registration_sql;
use crate::reader::connection::{parse_connection_string, ConnectionInfo, Location};
use crate::reader::{CancelToken, Cell, Flow, RawColumn, Reader, RowSink};
use crate::{Result, ShaperError};

/// DuckDB database reader
///
/// Wraps exactly one connection. Session state (`SET VARIABLE`) is shared by
/// every call made through the same reader.
///
/// # Examples
///
/// ```rust,ignore
/// use shaper::reader::{CancelToken, DuckDBReader, Reader};
///
/// let reader = DuckDBReader::from_connection_string("duckdb://memory")?;
/// let result = reader.query("SELECT 1 AS x, 'a' AS y", None, &CancelToken::new())?;
/// assert_eq!(result.columns[1].db_type, "VARCHAR");
/// ```
pub struct DuckDBReader {
    conn: Connection,
}

impl DuckDBReader {
    /// Create a new DuckDB reader from a connection string
    ///
    /// The dashboard tag types are registered on the new database unless it
    /// is opened read-only.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The connection string format is invalid
    /// - The database file cannot be opened
    /// - The tag types cannot be registered
    pub fn from_connection_string(uri: &str) -> Result<Self> {
        let info = parse_connection_string(uri)?;
        let reader = Self::open(&info)?;
        if !info.read_only {
            reader.register_types()?;
        }
        Ok(reader)
    }

    fn open(info: &ConnectionInfo) -> Result<Self> {
        let config_err =
            |e: duckdb::Error| ShaperError::ReaderError(format!("Invalid DuckDB config: {}", e));

        let mut config = Config::default();
        if info.read_only {
            config = config.access_mode(AccessMode::ReadOnly).map_err(config_err)?;
        }
        if let Some(threads) = info.threads {
            config = config.threads(i64::from(threads)).map_err(config_err)?;
        }

        let conn = match &info.location {
            Location::Memory => Connection::open_in_memory_with_flags(config).map_err(|e| {
                ShaperError::ReaderError(format!("Failed to open in-memory DuckDB: {}", e))
            })?,
            Location::File(path) => Connection::open_with_flags(path, config).map_err(|e| {
                ShaperError::ReaderError(format!(
                    "Failed to open DuckDB file '{}': {}",
                    path.display(),
                    e
                ))
            })?,
        };

        Ok(Self { conn })
    }

    /// (Re)create every dashboard tag type on this database
    pub fn register_types(&self) -> Result<()> {
        debug!("Registering dashboard tag types");
        self.conn
            .execute_batch(&type_registration_sql())
            .map_err(|e| ShaperError::ReaderError(format!("Failed to register types: {}", e)))
    }

    /// Get a reference to the underlying DuckDB connection
    ///
    /// Useful for executing setup queries (CREATE TABLE, INSERT, etc.)
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Another handle on the same database
    pub fn try_clone(&self) -> Result<Self> {
        let conn = self
            .conn
            .try_clone()
            .map_err(|e| ShaperError::ReaderError(format!("Failed to clone connection: {}", e)))?;
        Ok(Self { conn })
    }
}

/// Database type name for an Arrow column type
///
/// Names follow DuckDB's own spelling so they can be looked up in the catalog.
pub(crate) fn type_name(data_type: &DataType) -> String {
    match data_type {
        DataType::Null => "NULL".to_string(),
        DataType::Boolean => "BOOLEAN".to_string(),
        DataType::Int8 => "TINYINT".to_string(),
        DataType::Int16 => "SMALLINT".to_string(),
        DataType::Int32 => "INTEGER".to_string(),
        DataType::Int64 => "BIGINT".to_string(),
        DataType::UInt8 => "UTINYINT".to_string(),
        DataType::UInt16 => "USMALLINT".to_string(),
        DataType::UInt32 => "UINTEGER".to_string(),
        DataType::UInt64 => "UBIGINT".to_string(),
        DataType::Float16 | DataType::Float32 => "FLOAT".to_string(),
        DataType::Float64 => "DOUBLE".to_string(),
        DataType::Utf8 | DataType::LargeUtf8 => "VARCHAR".to_string(),
        DataType::Binary | DataType::LargeBinary | DataType::FixedSizeBinary(_) => {
            "BLOB".to_string()
        }
        DataType::Date32 | DataType::Date64 => "DATE".to_string(),
        DataType::Timestamp(_, None) => "TIMESTAMP".to_string(),
        DataType::Timestamp(_, Some(_)) => "TIMESTAMPTZ".to_string(),
        DataType::Time32(_) | DataType::Time64(_) => "TIME".to_string(),
        DataType::Interval(_) | DataType::Duration(_) => "INTERVAL".to_string(),
        DataType::Decimal128(p, s) | DataType::Decimal256(p, s) => {
            format!("DECIMAL({},{})", p, s)
        }
        DataType::List(field)
        | DataType::LargeList(field)
        | DataType::FixedSizeList(field, _) => format!("{}[]", type_name(field.data_type())),
        DataType::Struct(_) => "STRUCT".to_string(),
        DataType::Map(_, _) => "MAP".to_string(),
        DataType::Dictionary(_, _) => "ENUM".to_string(),
        DataType::Union(_, _) => "UNION".to_string(),
        other => format!("{:?}", other).to_uppercase(),
    }
}

fn micros(unit: &TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

fn timestamp(micros: i64) -> Cell {
    DateTime::from_timestamp_micros(micros)
        .map(|dt| Cell::Timestamp(dt.naive_utc()))
        .unwrap_or(Cell::Null)
}

fn date(days: i32) -> Cell {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(i64::from(days))))
        .map(Cell::Date)
        .unwrap_or(Cell::Null)
}

fn time(micros: i64) -> Cell {
    let secs = micros.div_euclid(1_000_000);
    let nanos = micros.rem_euclid(1_000_000) * 1_000;
    u32::try_from(secs)
        .ok()
        .zip(u32::try_from(nanos).ok())
        .and_then(|(s, n)| NaiveTime::from_num_seconds_from_midnight_opt(s, n))
        .map(Cell::Time)
        .unwrap_or(Cell::Null)
}

fn json(value: &Value) -> serde_json::Value {
    match to_cell(value.clone()) {
        Cell::Null => serde_json::Value::Null,
        Cell::Bool(b) => serde_json::Value::Bool(b),
        Cell::Int(i) => serde_json::Value::from(i),
        Cell::Float(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Cell::List(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|c| serde_json::Value::String(c.to_string()))
                .collect(),
        ),
        Cell::Text(s) => serde_json::from_str(&s)
            .ok()
            .filter(|v: &serde_json::Value| v.is_object() || v.is_array())
            .unwrap_or(serde_json::Value::String(s)),
        other => serde_json::Value::String(other.to_string()),
    }
}

/// Convert a driver value into a [`Cell`]
///
/// Structs and maps become JSON text; integers that do not fit an `i64`
/// keep their exact decimal form.
pub(crate) fn to_cell(value: Value) -> Cell {
    match value {
        Value::Null => Cell::Null,
        Value::Boolean(b) => Cell::Bool(b),
        Value::TinyInt(i) => Cell::Int(i64::from(i)),
        Value::SmallInt(i) => Cell::Int(i64::from(i)),
        Value::Int(i) => Cell::Int(i64::from(i)),
        Value::BigInt(i) => Cell::Int(i),
        Value::UTinyInt(i) => Cell::Int(i64::from(i)),
        Value::USmallInt(i) => Cell::Int(i64::from(i)),
        Value::UInt(i) => Cell::Int(i64::from(i)),
        Value::UBigInt(i) => i64::try_from(i)
            .map(Cell::Int)
            .unwrap_or_else(|_| Cell::Decimal(i.to_string())),
        Value::HugeInt(i) => i64::try_from(i)
            .map(Cell::Int)
            .unwrap_or_else(|_| Cell::Decimal(i.to_string())),
        Value::Float(f) => Cell::Float(f64::from(f)),
        Value::Double(f) => Cell::Float(f),
        Value::Decimal(d) => Cell::Decimal(d.to_string()),
        Value::Timestamp(unit, v) => timestamp(micros(&unit, v)),
        Value::Text(s) => Cell::Text(s),
        Value::Enum(s) => Cell::Text(s),
        Value::Blob(b) => Cell::Bytes(b),
        Value::Date32(days) => date(days),
        Value::Time64(unit, v) => time(micros(&unit, v)),
        Value::Interval {
            months,
            days,
            nanos,
        } => Cell::Interval {
            months,
            days,
            micros: nanos / 1_000,
        },
        Value::List(items) => Cell::List(items.into_iter().map(to_cell).collect()),
        // Axis and chart tags are unions; the active member carries the value
        Value::Union(member) => to_cell(*member),
        Value::Struct(fields) => {
            let object: serde_json::Map<String, serde_json::Value> = fields
                .keys()
                .zip(fields.values())
                .map(|(k, v)| (k.clone(), json(v)))
                .collect();
            Cell::Text(serde_json::Value::Object(object).to_string())
        }
        Value::Map(entries) => {
            let object: serde_json::Map<String, serde_json::Value> = entries
                .keys()
                .zip(entries.values())
                .map(|(k, v)| (to_cell(k.clone()).to_string(), json(v)))
                .collect();
            Cell::Text(serde_json::Value::Object(object).to_string())
        }
        #[allow(unreachable_patterns)]
        other => Cell::Text(format!("{:?}", other)),
    }
}

impl Reader for DuckDBReader {
    fn execute_batch(&self, sql: &str) -> Result<()> {
        if sql.trim().is_empty() {
            return Ok(());
        }
        self.conn
            .execute_batch(sql)
            .map_err(|e| ShaperError::ReaderError(e.to_string()))
    }

    fn stream(&self, sql: &str, cancel: &CancelToken, sink: &mut dyn RowSink) -> Result<()> {
        cancel.check()?;

        let interrupt = self.conn.interrupt_handle();
        let _hook = cancel.on_cancel(move || interrupt.interrupt());
        // An interrupted query fails with a driver error
        let query_err = |e: duckdb::Error| {
            if cancel.is_canceled() {
                ShaperError::Canceled
            } else {
                ShaperError::ReaderError(e.to_string())
            }
        };

        let mut stmt = self.conn.prepare(sql).map_err(query_err)?;
        let mut rows = stmt.query([]).map_err(query_err)?;

        // Column metadata is only available once the statement ran
        let columns: Vec<RawColumn> = match rows.as_ref() {
            Some(stmt) => (0..stmt.column_count())
                .map(|i| {
                    let name = stmt
                        .column_name(i)
                        .map_err(|e| {
                            ShaperError::ReaderError(format!("Failed to get column name: {}", e))
                        })?
                        .to_string();
                    Ok(RawColumn::new(name, type_name(&stmt.column_type(i))))
                })
                .collect::<Result<_>>()?,
            None => Vec::new(),
        };
        sink.columns(&columns)?;

        while let Some(row) = rows.next().map_err(query_err)? {
            cancel.check()?;
            let mut cells = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                let value: Value = row
                    .get(i)
                    .map_err(|e| ShaperError::ReaderError(format!("Failed to read cell: {}", e)))?;
                cells.push(to_cell(value));
            }
            if sink.row(cells)? == Flow::Stop {
                break;
            }
        }

        Ok(())
    }
}
