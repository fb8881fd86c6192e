//! Data source abstraction layer
//!
//! The reader module provides the SQL execution handle the engine consumes:
//! run a batch of SQL for its side effects, or run one statement and stream
//! its typed rows into a [`RowSink`].
//!
//! # Architecture
//!
//! All readers implement the [`Reader`] trait, which provides:
//! - Batch execution (variable prefix / cleanup SQL)
//! - Row streaming with column introspection and cooperative cancellation
//!
//! Cells cross the trait boundary as the closed [`Cell`] union so that every
//! consumer can match exhaustively.
//!
//! # Example
//!
//! ```rust,ignore
//! use shaper::reader::{CancelToken, DuckDBPool, Reader};
//!
//! let pool = DuckDBPool::from_connection_string("duckdb://memory", 2)?;
//! let reader = pool.acquire()?;
//! let result = reader.query("SELECT 1 AS x", Some(10), &CancelToken::new())?;
//! ```

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::{Result, ShaperError};

pub mod connection;

#[cfg(feature = "duckdb")]
pub mod duckdb;
#[cfg(feature = "duckdb")]
pub mod pool;

#[cfg(feature = "duckdb")]
pub use self::duckdb::DuckDBReader;
#[cfg(feature = "duckdb")]
pub use pool::{DuckDBPool, PooledReader};

/// One cell as returned by the database driver
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact decimal in its textual form
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Interval {
        months: i32,
        days: i32,
        micros: i64,
    },
    List(Vec<Cell>),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Int(i) => write!(f, "{}", i),
            Cell::Float(v) => write!(f, "{}", v),
            Cell::Decimal(d) => f.write_str(d),
            Cell::Text(s) => f.write_str(s),
            Cell::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Cell::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Cell::Time(t) => write!(f, "{}", t),
            Cell::Timestamp(ts) => write!(f, "{}", ts),
            Cell::Interval {
                months,
                days,
                micros,
            } => write!(f, "{} months {} days {} micros", months, days, micros),
            Cell::List(items) => {
                let parts: Vec<String> = items.iter().map(|c| c.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Column metadata reported by the driver
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub name: String,
    /// Database type name, e.g. `VARCHAR`, `DECIMAL(18,3)`, `VARCHAR[]`
    pub db_type: String,
}

impl RawColumn {
    pub fn new(name: impl Into<String>, db_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            db_type: db_type.into(),
        }
    }
}

/// Raw statement result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<RawColumn>,
    pub rows: Vec<Vec<Cell>>,
    /// Rows were dropped because the row cap was reached
    pub truncated: bool,
}

/// Whether a reader should keep streaming rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Receives the columns and then the rows of one statement
pub trait RowSink {
    fn columns(&mut self, columns: &[RawColumn]) -> Result<()>;
    fn row(&mut self, row: Vec<Cell>) -> Result<Flow>;
}

/// Collects rows into a [`QueryResult`], stopping at an optional cap
pub struct CollectSink {
    result: QueryResult,
    max_rows: Option<usize>,
}

impl CollectSink {
    pub fn new(max_rows: Option<usize>) -> Self {
        Self {
            result: QueryResult::default(),
            max_rows,
        }
    }

    pub fn finish(self) -> QueryResult {
        self.result
    }
}

impl RowSink for CollectSink {
    fn columns(&mut self, columns: &[RawColumn]) -> Result<()> {
        self.result.columns = columns.to_vec();
        Ok(())
    }

    fn row(&mut self, row: Vec<Cell>) -> Result<Flow> {
        if let Some(max) = self.max_rows {
            if self.result.rows.len() >= max {
                self.result.truncated = true;
                return Ok(Flow::Stop);
            }
        }
        self.result.rows.push(row);
        Ok(Flow::Continue)
    }
}

type Hook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Hooks {
    next_id: u64,
    active: Vec<(u64, Hook)>,
}

/// Cancellation flag shared between a caller and a build
///
/// Readers poll the flag between rows. A reader that can abort a running
/// query registers a hook with [`CancelToken::on_cancel`] for as long as the
/// query runs.
#[derive(Clone, Default)]
pub struct CancelToken {
    canceled: Arc<AtomicBool>,
    hooks: Arc<Mutex<Hooks>>,
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        let hooks = self.hooks.lock().unwrap_or_else(|e| e.into_inner());
        for (_, hook) in &hooks.active {
            hook();
        }
    }

    /// Run `hook` when the token fires, until the returned guard is dropped
    ///
    /// Runs it right away if the token already fired.
    pub fn on_cancel(&self, hook: impl Fn() + Send + Sync + 'static) -> CancelHook {
        let hook: Hook = Box::new(hook);
        let mut hooks = self.hooks.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_canceled() {
            hook();
        }
        let id = hooks.next_id;
        hooks.next_id += 1;
        hooks.active.push((id, hook));
        CancelHook {
            hooks: Arc::clone(&self.hooks),
            id,
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// `Err(Canceled)` once the token fired
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(ShaperError::Canceled)
        } else {
            Ok(())
        }
    }
}

/// Registration of a cancel hook; removes the hook on drop
pub struct CancelHook {
    hooks: Arc<Mutex<Hooks>>,
    id: u64,
}

impl Drop for CancelHook {
    fn drop(&mut self) {
        let mut hooks = self.hooks.lock().unwrap_or_else(|e| e.into_inner());
        hooks.active.retain(|(id, _)| *id != self.id);
    }
}

/// Trait for SQL execution handles
///
/// An implementation is bound to a single connection for its whole lifetime,
/// so session state such as `SET VARIABLE` is visible across calls.
pub trait Reader {
    /// Execute one or more statements for their side effects
    fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Execute one statement and stream its result into `sink`
    ///
    /// Implementations must check `cancel` before executing and between rows,
    /// and stop reading as soon as the sink returns [`Flow::Stop`].
    fn stream(&self, sql: &str, cancel: &CancelToken, sink: &mut dyn RowSink) -> Result<()>;

    /// Execute one statement and collect at most `max_rows` rows
    fn query(&self, sql: &str, max_rows: Option<usize>, cancel: &CancelToken) -> Result<QueryResult> {
        let mut sink = CollectSink::new(max_rows);
        self.stream(sql, cancel, &mut sink)?;
        Ok(sink.finish())
    }
}

impl<R: Reader + ?Sized> Reader for &R {
    fn execute_batch(&self, sql: &str) -> Result<()> {
        (**self).execute_batch(sql)
    }

    fn stream(&self, sql: &str, cancel: &CancelToken, sink: &mut dyn RowSink) -> Result<()> {
        (**self).stream(sql, cancel, sink)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory reader for tests that do not need a database

    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned results in order and records every SQL it receives
    #[derive(Default)]
    pub struct ScriptedReader {
        results: RefCell<VecDeque<Result<QueryResult>>>,
        pub log: RefCell<Vec<String>>,
    }

    impl ScriptedReader {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, columns: &[(&str, &str)], rows: Vec<Vec<Cell>>) -> &Self {
            self.results.borrow_mut().push_back(Ok(QueryResult {
                columns: columns
                    .iter()
                    .map(|(name, ty)| RawColumn::new(*name, *ty))
                    .collect(),
                rows,
                truncated: false,
            }));
            self
        }

        pub fn push_error(&self, message: &str) -> &Self {
            self.results
                .borrow_mut()
                .push_back(Err(ShaperError::ReaderError(message.to_string())));
            self
        }

        pub fn statements(&self) -> Vec<String> {
            self.log.borrow().clone()
        }
    }

    impl Reader for ScriptedReader {
        fn execute_batch(&self, sql: &str) -> Result<()> {
            self.log.borrow_mut().push(sql.to_string());
            Ok(())
        }

        fn stream(&self, sql: &str, cancel: &CancelToken, sink: &mut dyn RowSink) -> Result<()> {
            cancel.check()?;
            self.log.borrow_mut().push(sql.to_string());
            let next = self
                .results
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(QueryResult::default()));
            let result = next?;
            sink.columns(&result.columns)?;
            for row in result.rows {
                cancel.check()?;
                if sink.row(row)? == Flow::Stop {
                    break;
                }
            }
            Ok(())
        }
    }

    pub fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }
}
