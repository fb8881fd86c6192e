//! Connection string parsing for the dashboard database
//!
//! Connection strings are URI-like: `duckdb://memory` or `duckdb://<path>`,
//! optionally followed by `?` and form-encoded options.

use std::path::PathBuf;

use crate::{Result, ShaperError};

/// Where the database lives
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    /// DuckDB in-memory database
    Memory,
    /// DuckDB file-based database
    File(PathBuf),
}

/// Parsed connection information
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub location: Location,
    /// Open the file read-only (`access_mode=read_only`)
    pub read_only: bool,
    /// Worker threads per connection (`threads=N`)
    pub threads: Option<u32>,
}

impl ConnectionInfo {
    pub fn memory() -> Self {
        Self {
            location: Location::Memory,
            read_only: false,
            threads: None,
        }
    }
}

/// Parse a connection string into connection information
///
/// # Supported Formats
///
/// - `duckdb://memory` - in-memory database
/// - `duckdb:///absolute/path/file.db` - database file (absolute path)
/// - `duckdb://relative/file.db` - database file (relative path)
///
/// Options: `access_mode=read_only|read_write`, `threads=<n>`.
///
/// # Examples
///
/// ```
/// use shaper::reader::connection::{parse_connection_string, Location};
///
/// let info = parse_connection_string("duckdb://memory").unwrap();
/// assert_eq!(info.location, Location::Memory);
///
/// let info = parse_connection_string("duckdb:///srv/shaper.db?access_mode=read_only").unwrap();
/// assert_eq!(info.location, Location::File("/srv/shaper.db".into()));
/// assert!(info.read_only);
/// ```
pub fn parse_connection_string(uri: &str) -> Result<ConnectionInfo> {
    let rest = uri.strip_prefix("duckdb://").ok_or_else(|| {
        ShaperError::ReaderError(format!(
            "Unsupported connection string format: {}. Supported: duckdb://",
            uri
        ))
    })?;

    let (target, options) = match rest.split_once('?') {
        Some((target, options)) => (target, options),
        None => (rest, ""),
    };

    let mut info = ConnectionInfo::memory();
    info.location = match target {
        "memory" | ":memory:" => Location::Memory,
        "" => {
            return Err(ShaperError::ReaderError(
                "DuckDB file path cannot be empty".to_string(),
            ))
        }
        // `duckdb:///abs` keeps one leading slash, `duckdb://rel` none
        path => Location::File(PathBuf::from(path)),
    };

    for (key, value) in url::form_urlencoded::parse(options.as_bytes()) {
        match key.as_ref() {
            "access_mode" => {
                info.read_only = match value.to_ascii_lowercase().as_str() {
                    "read_only" => true,
                    "read_write" | "automatic" => false,
                    other => {
                        return Err(ShaperError::ReaderError(format!(
                            "Unknown access_mode '{}'",
                            other
                        )))
                    }
                }
            }
            "threads" => {
                let threads = value.parse::<u32>().map_err(|_| {
                    ShaperError::ReaderError(format!("Invalid threads value '{}'", value))
                })?;
                info.threads = Some(threads);
            }
            other => {
                return Err(ShaperError::ReaderError(format!(
                    "Unknown connection option '{}'",
                    other
                )))
            }
        }
    }

    if info.read_only && info.location == Location::Memory {
        return Err(ShaperError::ReaderError(
            "An in-memory database cannot be opened read-only".to_string(),
        ));
    }

    Ok(info)
}
