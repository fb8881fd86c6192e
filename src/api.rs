//! High-level dashboard API.
//!
//! [`Engine`] owns the connection pool and configuration and serves the two
//! requests a dashboard endpoint needs: the rendered document and the file
//! behind a download button. [`validate`] checks a script without touching a
//! database.

use crate::parser::split_statements;

#[cfg(feature = "duckdb")]
use {
    crate::config::EngineConfig,
    crate::document::DashboardDocument,
    crate::download::{export, DownloadFormat},
    crate::execute::{build_dashboard, BuildRequest, DashboardSource},
    crate::reader::DuckDBPool,
    crate::tags::{CastAliasResolver, TagResolver},
    crate::Result,
    std::io::Write,
};

// ============================================================================
// Validation
// ============================================================================

/// Result of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    /// Number of statements in the script.
    pub statements: usize,
    /// Indices of statements that are run but never rendered.
    pub side_effects: Vec<usize>,
    pub errors: Vec<ValidationError>,
}

impl Validated {
    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A fatal problem found in a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
    /// 1-based line, when known.
    pub line: Option<usize>,
}

/// Split a script and report its shape without executing SQL.
pub fn validate(script: &str) -> Validated {
    match split_statements(script) {
        Ok(statements) => Validated {
            statements: statements.len(),
            side_effects: statements
                .iter()
                .filter(|s| s.is_side_effect())
                .map(|s| s.index)
                .collect(),
            errors: Vec::new(),
        },
        Err(e) => Validated {
            statements: 0,
            side_effects: Vec::new(),
            errors: vec![ValidationError {
                message: e.to_string(),
                line: Some(e.line_number()),
            }],
        },
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Builds dashboards against a pooled DuckDB database.
#[cfg(feature = "duckdb")]
pub struct Engine {
    pool: DuckDBPool,
    config: EngineConfig,
    resolver: Box<dyn TagResolver + Send + Sync>,
}

#[cfg(feature = "duckdb")]
impl Engine {
    /// Open the configured database.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let pool = DuckDBPool::from_connection_string(&config.reader, config.pool_size)?;
        Ok(Self::with_pool(pool, config))
    }

    pub fn with_pool(pool: DuckDBPool, config: EngineConfig) -> Self {
        Self {
            pool,
            config,
            resolver: Box::new(CastAliasResolver),
        }
    }

    /// Replace the tag resolver.
    pub fn with_resolver(mut self, resolver: impl TagResolver + Send + Sync + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &DuckDBPool {
        &self.pool
    }

    /// Run setup SQL (attach data, create tables) on the shared database.
    pub fn setup(&self, sql: &str) -> Result<()> {
        self.pool.execute_setup(sql)
    }

    /// Build the document for one request.
    ///
    /// One connection is held for the whole build and returned afterwards,
    /// whether the build succeeded or not.
    pub fn get_dashboard(
        &self,
        source: &DashboardSource,
        request: &BuildRequest,
    ) -> Result<DashboardDocument> {
        let reader = self.pool.acquire()?;
        build_dashboard(&*reader, self.resolver.as_ref(), source, request, &self.config)
    }

    /// Stream the statement behind a download link into `out`.
    ///
    /// `statement_index` is the index carried in the link. Returns the number
    /// of rows written.
    pub fn download(
        &self,
        source: &DashboardSource,
        statement_index: usize,
        format: DownloadFormat,
        request: &BuildRequest,
        out: &mut dyn Write,
    ) -> Result<usize> {
        let reader = self.pool.acquire()?;
        export(
            &*reader,
            self.resolver.as_ref(),
            source,
            statement_index,
            format,
            request,
            &self.config,
            out,
        )
    }
}
