//! Connection pool for concurrent dashboard builds
//!
//! Every build takes one connection for its whole duration so that the
//! variables it sets are only visible to itself. Connections are cheap
//! clones of one opened database and are returned when the guard drops.

use std::ops::Deref;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::reader::DuckDBReader;
use crate::{Result, ShaperError};

struct Inner {
    base: Mutex<DuckDBReader>,
    idle: Mutex<Vec<DuckDBReader>>,
    max_idle: usize,
}

/// Pool of DuckDB connections sharing one database
#[derive(Clone)]
pub struct DuckDBPool {
    inner: Arc<Inner>,
}

impl DuckDBPool {
    /// Open the database and keep up to `max_idle` spare connections
    pub fn from_connection_string(uri: &str, max_idle: usize) -> Result<Self> {
        let base = DuckDBReader::from_connection_string(uri)?;
        Ok(Self::from_reader(base, max_idle))
    }

    pub fn from_reader(base: DuckDBReader, max_idle: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                base: Mutex::new(base),
                idle: Mutex::new(Vec::new()),
                max_idle: max_idle.max(1),
            }),
        }
    }

    /// Take a connection; it goes back to the pool on drop
    pub fn acquire(&self) -> Result<PooledReader> {
        let reused = self
            .inner
            .idle
            .lock()
            .map_err(|_| ShaperError::ReaderError("Connection pool poisoned".to_string()))?
            .pop();

        let reader = match reused {
            Some(reader) => reader,
            None => {
                debug!("Opening new pooled connection");
                self.inner
                    .base
                    .lock()
                    .map_err(|_| ShaperError::ReaderError("Connection pool poisoned".to_string()))?
                    .try_clone()?
            }
        };

        Ok(PooledReader {
            reader: Some(reader),
            pool: Arc::clone(&self.inner),
        })
    }

    /// Run setup SQL (tables, fixtures) on the shared database
    pub fn execute_setup(&self, sql: &str) -> Result<()> {
        let base = self
            .inner
            .base
            .lock()
            .map_err(|_| ShaperError::ReaderError("Connection pool poisoned".to_string()))?;
        base.connection()
            .execute_batch(sql)
            .map_err(|e| ShaperError::ReaderError(e.to_string()))
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }
}

/// A connection checked out of a [`DuckDBPool`]
pub struct PooledReader {
    reader: Option<DuckDBReader>,
    pool: Arc<Inner>,
}

impl Deref for PooledReader {
    type Target = DuckDBReader;

    fn deref(&self) -> &DuckDBReader {
        // Only `drop` takes the reader out
        self.reader
            .as_ref()
            .unwrap_or_else(|| unreachable!("pooled reader used after release"))
    }
}

impl Drop for PooledReader {
    fn drop(&mut self) {
        let Some(reader) = self.reader.take() else {
            return;
        };
        if let Ok(mut idle) = self.pool.idle.lock() {
            if idle.len() < self.pool.max_idle {
                idle.push(reader);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{CancelToken, Cell, Reader};

    #[test]
    fn test_connections_are_returned() {
        let pool = DuckDBPool::from_connection_string("duckdb://memory", 2).unwrap();
        assert_eq!(pool.idle_count(), 0);
        {
            let _a = pool.acquire().unwrap();
            let _b = pool.acquire().unwrap();
            let _c = pool.acquire().unwrap();
        }
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn test_connections_share_database() {
        let pool = DuckDBPool::from_connection_string("duckdb://memory", 2).unwrap();
        pool.execute_setup("CREATE TABLE t AS SELECT 42 AS x").unwrap();

        let reader = pool.acquire().unwrap();
        let result = reader
            .query("SELECT x FROM t", None, &CancelToken::new())
            .unwrap();
        assert_eq!(result.rows[0][0], Cell::Int(42));
    }

    #[test]
    fn test_variables_are_per_connection() {
        let pool = DuckDBPool::from_connection_string("duckdb://memory", 2).unwrap();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        a.execute_batch("SET VARIABLE v = 1;").unwrap();

        let seen = b
            .query("SELECT getvariable('v') AS v", None, &CancelToken::new())
            .unwrap();
        assert_eq!(seen.rows[0][0], Cell::Null);
    }
}
