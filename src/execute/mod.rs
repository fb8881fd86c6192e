//! Dashboard execution
//!
//! Runs a dashboard script statement by statement and folds the results into
//! a [`DashboardDocument`](crate::document::DashboardDocument).
//!
//! This module is organized into submodules:
//! - `resolve`: semantic column types from raw database types and sampled rows
//! - `classify`: which widget (or marker) a statement renders as
//! - `normalize`: cell values to JSON, download links
//! - `assemble`: section placement and the time range of the document

pub mod assemble;
pub mod classify;
pub mod normalize;
pub mod resolve;

pub use assemble::Assembler;
pub use classify::{classify, Classification};
pub use normalize::{download_url, normalize_cell, normalize_rows};
pub use resolve::{refine_timestamps, resolve_column_type, resolve_columns};

use std::collections::BTreeMap;

use serde_json::Value;

use crate::binder::{bind_datepicker, bind_dropdown, DateBound, QueryParams, VariableState, VariableValue};
use crate::config::EngineConfig;
use crate::document::{Column, DashboardDocument, RenderSpec, Role, Widget, WidgetKind};
use crate::parser::{split_statements, Statement};
use crate::reader::{CancelToken, Cell, QueryResult, Reader, RowSink};
use crate::tags::{ColumnTags, TagResolver};
use crate::{Result, ShaperError};

// =============================================================================
// Inputs
// =============================================================================

/// A stored dashboard script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardSource {
    /// Opaque identifier, used in download links
    pub id: String,
    pub name: String,
    /// The SQL script
    pub content: String,
}

impl DashboardSource {
    pub fn new(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Per-request inputs of a build
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Filter selections from the request's query string
    pub params: QueryParams,
    /// Bindings supplied by the caller; widget selections overwrite them
    pub variables: BTreeMap<String, VariableValue>,
    pub cancel: CancelToken,
}

impl BuildRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_variables(mut self, variables: BTreeMap<String, VariableValue>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

// =============================================================================
// Statement execution
// =============================================================================

/// Statement errors from the database carry the statement index
fn statement_error(index: usize, err: ShaperError) -> ShaperError {
    match err {
        ShaperError::ReaderError(message) => ShaperError::QueryFailed { index, message },
        other => other,
    }
}

/// Runs statements against one connection, threading variable state
pub struct Executor<'a> {
    reader: &'a dyn Reader,
    resolver: &'a dyn TagResolver,
    request: &'a BuildRequest,
    state: VariableState,
}

impl<'a> Executor<'a> {
    pub fn new(
        reader: &'a dyn Reader,
        resolver: &'a dyn TagResolver,
        request: &'a BuildRequest,
    ) -> Self {
        Self {
            reader,
            resolver,
            request,
            state: VariableState::seeded(&request.variables),
        }
    }

    pub fn state(&self) -> &VariableState {
        &self.state
    }

    /// Run `body` between the current prefix and its cleanup
    ///
    /// The cleanup runs whatever `body` returns. A cleanup failure is only
    /// reported when the statement itself succeeded.
    fn with_bindings<T>(
        &self,
        statement: &Statement,
        body: impl FnOnce(&dyn Reader) -> Result<T>,
    ) -> Result<T> {
        self.request.cancel.check()?;
        let (prefix, cleanup) = self.state.to_prefix();

        let result = if prefix.is_empty() {
            body(self.reader)
        } else {
            self.reader
                .execute_batch(&prefix)
                .and_then(|_| body(self.reader))
        };

        if !cleanup.is_empty() {
            if let Err(e) = self.reader.execute_batch(&cleanup) {
                tracing::warn!(index = statement.index, error = %e, "Variable cleanup failed");
                if result.is_ok() {
                    return Err(e);
                }
            }
        }

        result.map_err(|e| statement_error(statement.index, e))
    }

    /// Execute a statement that only exists for its side effects
    pub fn execute(&self, statement: &Statement) -> Result<()> {
        tracing::debug!(index = statement.index, "Executing side-effect statement");
        self.with_bindings(statement, |reader| reader.execute_batch(&statement.sql))
    }

    /// Execute a statement and collect at most `max_rows` rows
    pub fn query(&self, statement: &Statement, max_rows: Option<usize>) -> Result<QueryResult> {
        tracing::debug!(index = statement.index, "Executing statement");
        let cancel = &self.request.cancel;
        self.with_bindings(statement, |reader| {
            reader.query(&statement.sql, max_rows, cancel)
        })
    }

    /// Execute a statement and stream every row into `sink`
    pub fn stream(&self, statement: &Statement, sink: &mut dyn RowSink) -> Result<()> {
        tracing::debug!(index = statement.index, "Streaming statement");
        let cancel = &self.request.cancel;
        self.with_bindings(statement, |reader| {
            reader.stream(&statement.sql, cancel, sink)
        })
    }

    /// Resolve tags and column types, then classify
    pub fn classify(
        &self,
        statement: &Statement,
        result: &QueryResult,
    ) -> Result<(Vec<Column>, Classification)> {
        let tags = ColumnTags::resolve(self.resolver, &statement.sql, &result.columns);
        let columns = resolve_columns(&result.columns, &result.rows, &tags)?;
        let classification = classify(&columns, &tags, &result.rows)?;
        Ok((columns, classification))
    }

    /// Update the variable state from a filter widget's rows
    pub fn bind(&mut self, render: &RenderSpec, columns: &[Column], rows: &[Vec<Cell>]) -> Result<()> {
        let params = &self.request.params;
        let column = |role: Role| {
            render
                .role(role)
                .and_then(|index| columns.get(index).map(|c| (index, c.name.as_str())))
        };
        let first = |index: usize| rows.first().and_then(|row| row.get(index));

        match render.kind {
            WidgetKind::Dropdown | WidgetKind::DropdownMulti => {
                if let Some((index, name)) = column(Role::Value) {
                    let options: Vec<Cell> = rows
                        .iter()
                        .filter_map(|row| row.get(index).cloned())
                        .collect();
                    let multi = render.kind == WidgetKind::DropdownMulti;
                    bind_dropdown(&mut self.state, name, &options, multi, params)?;
                }
            }
            // A picker without rows has nothing to offer, so it binds nothing
            WidgetKind::Datepicker if !rows.is_empty() => {
                if let Some((index, name)) = column(Role::Value) {
                    bind_datepicker(&mut self.state, name, first(index), DateBound::Day, params)?;
                }
            }
            WidgetKind::DaterangePicker if !rows.is_empty() => {
                for (role, bound) in [(Role::From, DateBound::From), (Role::To, DateBound::To)] {
                    if let Some((index, name)) = column(role) {
                        bind_datepicker(&mut self.state, name, first(index), bound, params)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn apply_roles(render: &RenderSpec, columns: &mut [Column]) {
    for (role, index) in &render.role_index {
        if let Some(column) = columns.get_mut(*index) {
            column.tag = Some(*role);
        }
    }
}

/// Split a script, mapping splitter failures into the crate error
pub fn statements(source: &DashboardSource) -> Result<Vec<Statement>> {
    Ok(split_statements(&source.content)?)
}

// =============================================================================
// Dashboard build
// =============================================================================

/// Build the document for one dashboard request
///
/// Statements run strictly in order on `reader`. Any fatal error aborts the
/// build; variable cleanup has already run by the time it is returned.
pub fn build_dashboard(
    reader: &dyn Reader,
    resolver: &dyn TagResolver,
    source: &DashboardSource,
    request: &BuildRequest,
    config: &EngineConfig,
) -> Result<DashboardDocument> {
    let statements = statements(source)?;
    tracing::info!(
        dashboard = %source.id,
        statements = statements.len(),
        "Building dashboard"
    );

    let mut executor = Executor::new(reader, resolver, request);
    let mut assembler = Assembler::new();
    let mut label: Option<String> = None;
    let mut skip_next = false;

    for statement in &statements {
        request.cancel.check()?;

        if std::mem::take(&mut skip_next) {
            tracing::debug!(index = statement.index, "Deferred to download");
            continue;
        }

        if statement.is_side_effect() {
            executor.execute(statement)?;
            continue;
        }

        let result = executor.query(statement, Some(config.max_rows))?;
        if result.truncated {
            tracing::warn!(
                dashboard = %source.id,
                index = statement.index,
                max_rows = config.max_rows,
                "Statement result truncated"
            );
        }

        let (mut columns, classification) = executor.classify(statement, &result)?;
        let (mut render, download) = match classification {
            Classification::Label(text) => {
                label = text;
                continue;
            }
            Classification::Section { title, hidden } => {
                assembler.open_section(title, hidden);
                continue;
            }
            Classification::Widget(render) => (render, None),
            Classification::Download(render, format) => {
                skip_next = true;
                (render, Some(format))
            }
        };

        render.label = label.take();
        apply_roles(&render, &mut columns);

        executor.bind(&render, &columns, &result.rows)?;

        let mut rows = normalize_rows(&result.rows, &columns);
        if let (Some(format), Some(index)) = (download, render.role(Role::Download)) {
            for (row, raw) in rows.iter_mut().zip(&result.rows) {
                if let (Some(slot), Some(cell)) = (row.get_mut(index), raw.get(index)) {
                    *slot = match cell {
                        Cell::Null => Value::Null,
                        cell => Value::String(download_url(
                            &config.api_prefix,
                            &source.id,
                            statement.index + 1,
                            &cell.to_string(),
                            format,
                            &request.params,
                        )),
                    };
                }
            }
        }

        let kind = render.kind;
        let placed = assembler.push(Widget {
            render,
            columns,
            rows,
        });
        if !placed {
            tracing::debug!(index = statement.index, ?kind, "Widget hidden by empty section");
        }
    }

    let document = assembler.finish(source.name.clone());
    tracing::info!(
        dashboard = %source.id,
        sections = document.sections.len(),
        "Dashboard built"
    );
    Ok(document)
}

/// Bring the variable state to what it is just before `target` runs
///
/// Earlier statements are executed and filter widgets bound, but nothing is
/// rendered.
pub fn replay_bindings<'a>(
    reader: &'a dyn Reader,
    resolver: &'a dyn TagResolver,
    statements: &[Statement],
    target: usize,
    request: &'a BuildRequest,
    config: &EngineConfig,
) -> Result<Executor<'a>> {
    let mut executor = Executor::new(reader, resolver, request);
    let mut skip_next = false;

    for statement in statements.iter().take(target) {
        request.cancel.check()?;
        if std::mem::take(&mut skip_next) {
            continue;
        }
        if statement.is_side_effect() {
            executor.execute(statement)?;
            continue;
        }

        let result = executor.query(statement, Some(config.max_rows))?;
        let (mut columns, classification) = executor.classify(statement, &result)?;
        match classification {
            Classification::Widget(render) => {
                apply_roles(&render, &mut columns);
                executor.bind(&render, &columns, &result.rows)?;
            }
            Classification::Download(..) => skip_next = true,
            Classification::Label(_) | Classification::Section { .. } => {}
        }
    }

    Ok(executor)
}
