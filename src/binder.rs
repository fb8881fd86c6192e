//! Variable binder
//!
//! Filter selections flow between statements as DuckDB session variables.
//! Before each statement the current [`VariableState`] is rendered into
//! `SET VARIABLE` statements, and afterwards into matching `RESET VARIABLE`
//! statements so nothing leaks into the next user of the connection.
//!
//! Every value that reaches SQL text goes through [`escape_literal`] or
//! [`escape_identifier`].

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::reader::Cell;
use crate::{Result, ShaperError};

/// Characters removed from literals and identifiers before quoting
const STRIPPED: &[char] = &['\0', '\r', '\n', '\x1a'];

/// Quote a string as a SQL string literal
///
/// ```
/// use shaper::binder::escape_literal;
/// assert_eq!(escape_literal("it's"), "'it''s'");
/// ```
pub fn escape_literal(value: &str) -> String {
    let cleaned: String = value.chars().filter(|c| !STRIPPED.contains(c)).collect();
    format!("'{}'", cleaned.replace('\'', "''"))
}

/// Quote a string as a SQL identifier
pub fn escape_identifier(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| !STRIPPED.contains(c)).collect();
    format!("\"{}\"", cleaned.replace('"', "\"\""))
}

/// A raw value supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Single(String),
    Multi(Vec<String>),
}

impl VariableValue {
    pub fn values(&self) -> Vec<String> {
        match self {
            VariableValue::Single(v) => vec![v.clone()],
            VariableValue::Multi(vs) => vs.clone(),
        }
    }
}

/// Request query parameters, each name mapping to one or more values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, VariableValue>")]
pub struct QueryParams(BTreeMap<String, Vec<String>>);

impl From<BTreeMap<String, VariableValue>> for QueryParams {
    fn from(map: BTreeMap<String, VariableValue>) -> Self {
        Self(map.into_iter().map(|(k, v)| (k, v.values())).collect())
    }
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `a=1&b=2&b=3`, with or without a leading `?`
    pub fn from_query_string(query: &str) -> Self {
        let mut params = Self::new();
        let query = query.strip_prefix('?').unwrap_or(query);
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.insert(key.into_owned(), value.into_owned());
        }
        params
    }

    /// Append a value for `name`
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.entry(name.into()).or_default().push(value.into());
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(name).map(|v| v.as_slice()).filter(|v| !v.is_empty())
    }

    /// Non-empty values requested for `name`; `None` when there are none
    pub fn selected(&self, name: &str) -> Option<Vec<String>> {
        let values: Vec<String> = self
            .get(name)?
            .iter()
            .filter(|v| !v.is_empty())
            .cloned()
            .collect();
        (!values.is_empty()).then_some(values)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| v.is_empty())
    }

    /// Form-encoded query string with names in sorted order, without `?`
    pub fn to_query_string(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, values) in &self.0 {
            for value in values {
                serializer.append_pair(name, value);
            }
        }
        serializer.finish()
    }
}

/// An escaped binding, ready to be placed into SQL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// One SQL literal, e.g. `'a'` or `DATE '2024-01-31'`
    Literal(String),
    /// A list of string literals
    List(Vec<String>),
}

/// Variables bound so far in one build
///
/// Names are kept sorted so the rendered SQL is identical for identical input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableState {
    bindings: BTreeMap<String, Binding>,
}

impl VariableState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State pre-seeded from caller-supplied variables
    pub fn seeded(variables: &BTreeMap<String, VariableValue>) -> Self {
        let mut state = Self::new();
        for (name, value) in variables {
            match value {
                VariableValue::Single(v) => state.bind_literal(name, escape_literal(v)),
                VariableValue::Multi(vs) => {
                    state.bind_list(name, vs.iter().map(|v| escape_literal(v)).collect())
                }
            }
        }
        state
    }

    /// Bind `name` to an already escaped literal, replacing any earlier value
    pub fn bind_literal(&mut self, name: &str, literal: String) {
        self.bindings
            .insert(name.to_string(), Binding::Literal(literal));
    }

    /// Bind `name` to a list of already escaped literals
    pub fn bind_list(&mut self, name: &str, literals: Vec<String>) {
        self.bindings.insert(name.to_string(), Binding::List(literals));
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Render the `SET VARIABLE` prefix and `RESET VARIABLE` cleanup
    pub fn to_prefix(&self) -> (String, String) {
        bindings_to_prefix(self)
    }
}

/// Render a state into `(prefix, cleanup)` SQL
///
/// Both are empty when nothing is bound.
pub fn bindings_to_prefix(state: &VariableState) -> (String, String) {
    let mut prefix = String::new();
    let mut cleanup = String::new();

    for (name, binding) in &state.bindings {
        let ident = escape_identifier(name);
        match binding {
            Binding::Literal(literal) => {
                prefix.push_str(&format!("SET VARIABLE {} = {};\n", ident, literal));
            }
            Binding::List(literals) => {
                prefix.push_str(&format!(
                    "SET VARIABLE {} = [{}]::VARCHAR[];\n",
                    ident,
                    literals.join(", ")
                ));
            }
        }
        cleanup.push_str(&format!("RESET VARIABLE {};\n", ident));
    }

    (prefix, cleanup)
}

fn option_values(name: &str, cells: &[Cell]) -> Result<Vec<String>> {
    cells
        .iter()
        .filter(|c| !c.is_null())
        .map(|c| match c {
            Cell::Text(s) => Ok(s.clone()),
            other => Err(ShaperError::ValidationError(format!(
                "Dropdown column '{}' must hold text, got {:?}",
                name, other
            ))),
        })
        .collect()
}

/// Bind a dropdown from its option column
///
/// Without a query parameter a single dropdown selects the first option and
/// a multi dropdown selects every option. Requested values must be options.
pub fn bind_dropdown(
    state: &mut VariableState,
    name: &str,
    options: &[Cell],
    multi: bool,
    params: &QueryParams,
) -> Result<()> {
    let options = option_values(name, options)?;

    let selected: Vec<String> = match params.selected(name) {
        Some(requested) => {
            if let Some(bad) = requested.iter().find(|v| !options.contains(v)) {
                return Err(ShaperError::InvalidFilterValue {
                    name: name.to_string(),
                    value: bad.clone(),
                });
            }
            requested
        }
        None if multi => options,
        None => options.into_iter().take(1).collect(),
    };

    if selected.is_empty() {
        return Ok(());
    }

    if multi {
        state.bind_list(name, selected.iter().map(|v| escape_literal(v)).collect());
    } else {
        state.bind_literal(name, escape_literal(&selected[0]));
    }
    Ok(())
}

/// Which end of a date selection a picker column represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBound {
    /// A single day, bound as a `DATE`
    Day,
    /// Range start, bound as a `TIMESTAMP` at midnight
    From,
    /// Range end, bound as a `TIMESTAMP` at the last microsecond of the day
    To,
}

impl DateBound {
    fn literal(self, date: NaiveDate) -> String {
        let day = date.format("%Y-%m-%d");
        match self {
            DateBound::Day => format!("DATE '{}'", day),
            DateBound::From => format!("TIMESTAMP '{}'", day),
            DateBound::To => format!("TIMESTAMP '{} 23:59:59.999999'", day),
        }
    }
}

fn cell_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Date(d) => Some(*d),
        Cell::Timestamp(ts) => Some(ts.date()),
        Cell::Text(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok(),
        _ => None,
    }
}

/// Bind one date picker column
///
/// A query parameter must be a `YYYY-MM-DD` date; otherwise the column's
/// first-row value is the default.
pub fn bind_datepicker(
    state: &mut VariableState,
    name: &str,
    default: Option<&Cell>,
    bound: DateBound,
    params: &QueryParams,
) -> Result<()> {
    let requested = params
        .selected(name)
        .and_then(|values| values.into_iter().next());
    let date = match requested {
        Some(requested) => Some(NaiveDate::parse_from_str(&requested, "%Y-%m-%d").map_err(
            |_| ShaperError::InvalidFilterValue {
                name: name.to_string(),
                value: requested.clone(),
            },
        )?),
        None => default.and_then(cell_date),
    };

    if let Some(date) = date {
        state.bind_literal(name, bound.literal(date));
    }
    Ok(())
}
