//! Warehouse client abstraction.
//!
//! Handlers never talk to a database directly. They receive an
//! `Arc<dyn Warehouse>` at startup and go through the four operations below,
//! which keeps the HTTP layer independent of the engine and lets tests swap
//! in a stub.

pub mod duckdb_client;
#[cfg(test)]
pub mod stub;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Name of the table holding one row per signal.
pub const SIGNALS_TABLE: &str = "options_analysis_signals";

/// Sentinel meaning "resolve to the newest available partition".
pub const LATEST: &str = "latest";

/// Option contract side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Call => "CALL",
            Self::Put => "PUT",
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar value bound to a positional `?` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Text(String),
    Int(i64),
}

/// Named query parameter. The name is informational (logging, tests);
/// binding is positional in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParam {
    pub name: &'static str,
    pub value: ParamValue,
}

impl QueryParam {
    pub fn text(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            value: ParamValue::Text(value.into()),
        }
    }

    pub const fn int(name: &'static str, value: i64) -> Self {
        Self {
            name,
            value: ParamValue::Int(value),
        }
    }
}

/// A single column value, typed by the column's declared semantic type.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Time(NaiveTime),
    /// Nested values (lists, structs, maps) already reduced to JSON.
    Json(serde_json::Value),
}

impl Cell {
    /// Returns `true` for date/time-typed cells.
    pub const fn is_temporal(&self) -> bool {
        matches!(self, Self::Date(_) | Self::Timestamp(_) | Self::Time(_))
    }

    /// Convert to JSON. Date/time cells become ISO-8601 strings; everything
    /// else passes through as the matching JSON scalar.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::UInt(u) => Value::from(*u),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::Text(s) => Value::String(s.clone()),
            Self::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            Self::Timestamp(ts) => Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Self::Time(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
            Self::Json(v) => v.clone(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Rows returned by [`Warehouse::query`], with named-column access.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value of `column` in every row, in row order.
    pub fn column<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Cell> + 'a {
        let idx = self.column_index(name);
        self.rows
            .iter()
            .filter_map(move |row| idx.and_then(|i| row.get(i)))
    }

    /// Map every row to a JSON object keyed by column name.
    pub fn to_json_objects(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let object: serde_json::Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(name, cell)| (name.clone(), cell.to_json()))
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect()
    }
}

/// Arguments of the winners dashboard call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinnersRequest {
    pub limit: u32,
    pub option_type: Option<OptionType>,
    pub as_of: String,
}

/// Ranked signals for a resolved run date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WinnersDashboard {
    pub as_of: String,
    pub signals: Vec<serde_json::Value>,
}

/// Errors raised by a warehouse client.
#[derive(Debug)]
pub enum WarehouseError {
    Database(duckdb::Error),
    /// The table has no partitions, so "latest" cannot be resolved.
    NoPartitions(String),
    /// The warehouse could not be reached or refused the request.
    Unavailable(String),
}

impl std::fmt::Display for WarehouseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Database(e) => write!(f, "{e}"),
            Self::NoPartitions(table) => write!(f, "no partitions found for table {table}"),
            Self::Unavailable(msg) => write!(f, "warehouse unavailable: {msg}"),
        }
    }
}

impl std::error::Error for WarehouseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<duckdb::Error> for WarehouseError {
    fn from(e: duckdb::Error) -> Self {
        Self::Database(e)
    }
}

/// Client for the analytical warehouse that owns the signals table.
///
/// Implementations are shared across in-flight requests and must be safe to
/// call concurrently. Calls may block; callers run them on the blocking pool.
pub trait Warehouse: Send + Sync {
    /// Fully qualified, quoted identifier for `table`.
    fn table_id(&self, table: &str) -> String;

    /// Newest `run_date` present in `table`, as `YYYY-MM-DD`.
    fn latest_run_date(&self, table: &str) -> Result<String, WarehouseError>;

    /// Execute `sql`, binding `params` to its placeholders in order.
    fn query(&self, sql: &str, params: &[QueryParam]) -> Result<ResultSet, WarehouseError>;

    /// Top-ranked signals across all tickers.
    fn winners_dashboard(
        &self,
        request: &WinnersRequest,
    ) -> Result<WinnersDashboard, WarehouseError>;
}

/// Quote a SQL identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
