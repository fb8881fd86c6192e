/*!
# shaper - SQL dashboards

Turns a dashboard script, an ordered list of SQL statements, into a typed,
render-ready document. Authors decide how a result is shown by casting
columns to tag types:

```sql
SELECT 'Revenue'::LABEL;
SELECT sum(amount) FROM sales;

SELECT region::DROPDOWN AS region FROM regions;
SELECT day::XAXIS AS day, sum(amount)::LINECHART AS amount
FROM sales WHERE region = getvariable('region')
GROUP BY ALL;
```

## Architecture

Every request rebuilds the document from scratch:
- **Splitting** → the script is cut into statements ([`parser`])
- **Execution** → statements run in order on one pooled connection, with
  filter selections carried forward as session variables ([`binder`], [`reader`])
- **Typing** → each column gets a semantic type and a role ([`catalog`], [`tags`])
- **Rendering** → each result becomes one widget, placed into header or
  content sections ([`execute`], [`document`])

## Core Components

- [`parser`] - Statement splitting
- [`catalog`] - Tag types and database type mapping
- [`binder`] - Filter variables and SQL escaping
- [`reader`] - Data source abstraction and the DuckDB implementation
- [`execute`] - The build pipeline
- [`download`] - CSV and XLSX export
- [`api`] - High-level engine
*/

pub mod api;
pub mod binder;
pub mod catalog;
pub mod config;
pub mod document;
pub mod download;
pub mod execute;
pub mod parser;
pub mod reader;
pub mod tags;

// Re-export key types for convenience
pub use config::EngineConfig;
pub use document::{DashboardDocument, Section, SectionKind, Widget, WidgetKind};
pub use execute::{build_dashboard, BuildRequest, DashboardSource};

#[cfg(feature = "duckdb")]
pub use api::Engine;

/// Main library error type
#[derive(thiserror::Error, Debug)]
pub enum ShaperError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Statement {index} failed: {message}")]
    QueryFailed { index: usize, message: String },

    #[error("Invalid value '{value}' for filter '{name}'")]
    InvalidFilterValue { name: String, value: String },

    #[error("Unsupported type {db_type} for column '{column}'")]
    UnsupportedColumnType { column: String, db_type: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Data source error: {0}")]
    ReaderError(String),

    #[error("Output generation error: {0}")]
    WriterError(String),

    #[error("Build canceled")]
    Canceled,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ShaperError {
    /// Errors caused by the request rather than the dashboard or the engine
    pub fn is_user_error(&self) -> bool {
        matches!(self, ShaperError::InvalidFilterValue { .. })
    }
}

pub type Result<T> = std::result::Result<T, ShaperError>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
