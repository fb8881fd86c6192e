//! Engine configuration

use serde::Deserialize;

use crate::{Result, ShaperError};

/// Row cap for rendered statements
pub const DEFAULT_MAX_ROWS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "snake_case", deny_unknown_fields)]
pub struct EngineConfig {
    /// Connection string of the database, e.g. `duckdb://memory`
    pub reader: String,
    /// Rows kept per rendered statement; downloads are not capped
    pub max_rows: usize,
    /// Idle connections kept by the pool
    pub pool_size: usize,
    /// Path prefix of generated download links
    pub api_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reader: "duckdb://memory".to_string(),
            max_rows: DEFAULT_MAX_ROWS,
            pool_size: 4,
            api_prefix: "/api/dashboards".to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ShaperError::ValidationError(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_rows == 0 {
            return Err(ShaperError::ValidationError(
                "max_rows must be at least 1".to_string(),
            ));
        }
        if !self.api_prefix.starts_with('/') {
            return Err(ShaperError::ValidationError(format!(
                "api_prefix must start with '/', got '{}'",
                self.api_prefix
            )));
        }
        Ok(())
    }
}
