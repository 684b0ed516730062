//! DuckDB-backed [`Warehouse`].
//!
//! The signals table is either a regular table inside a DuckDB database file
//! (or an in-memory database) or a view over a hive-partitioned Parquet
//! dataset. Either way it is addressed through [`Warehouse::table_id`].

use super::{
    quote_ident, Cell, ParamValue, QueryParam, ResultSet, Warehouse, WarehouseError,
    WinnersDashboard, WinnersRequest, LATEST, SIGNALS_TABLE,
};
use crate::config::Config;
use crate::storage::migrations;
use crate::storage::parquet::ParquetDataset;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use duckdb::types::{OrderedMap, TimeUnit, Value};
use duckdb::{Connection, Statement, ToSql};
use parking_lot::Mutex;
use std::sync::Arc;

pub struct DuckDbWarehouse {
    conn: Arc<Mutex<Connection>>,
    schema: Option<String>,
}

impl DuckDbWarehouse {
    pub fn new(conn: Connection, schema: Option<String>) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            schema,
        }
    }

    /// Open the warehouse described by `config`.
    ///
    /// With `parquet_dir` set, the signals table is a view over the Parquet
    /// partitions. Otherwise the database at `database_path` (or an in-memory
    /// one) is migrated so the signals table exists.
    pub fn open(config: &Config) -> Result<Self, WarehouseError> {
        let conn = match &config.database_path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        let warehouse = Self::new(conn, config.schema.clone());
        let table_id = warehouse.table_id(SIGNALS_TABLE);

        {
            let conn = warehouse.conn.lock();
            if let Some(schema) = &warehouse.schema {
                conn.execute_batch(&format!(
                    "CREATE SCHEMA IF NOT EXISTS {}",
                    quote_ident(schema)
                ))?;
            }
            match &config.parquet_dir {
                Some(dir) => {
                    let dataset = ParquetDataset::new(dir);
                    let partitions = dataset.attach(&conn, &table_id)?;
                    tracing::info!(
                        dir = %dir.display(),
                        partitions,
                        table = %table_id,
                        "Attached Parquet signals dataset"
                    );
                }
                None => {
                    migrations::run_migrations(&conn, &table_id)?;
                    tracing::info!(table = %table_id, "Signals table ready");
                }
            }
        }

        Ok(warehouse)
    }

    /// Shared handle to the underlying connection.
    pub fn conn(&self) -> &Arc<Mutex<Connection>> {
        &self.conn
    }
}

impl Warehouse for DuckDbWarehouse {
    fn table_id(&self, table: &str) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(table)),
            None => quote_ident(table),
        }
    }

    fn latest_run_date(&self, table: &str) -> Result<String, WarehouseError> {
        let sql = format!(
            "SELECT CAST(MAX(run_date) AS VARCHAR) FROM {}",
            self.table_id(table)
        );
        let latest: Option<String> = self.conn.lock().query_row(&sql, [], |row| row.get(0))?;
        latest.ok_or_else(|| WarehouseError::NoPartitions(table.to_string()))
    }

    fn query(&self, sql: &str, params: &[QueryParam]) -> Result<ResultSet, WarehouseError> {
        tracing::debug!(sql = %sql, params = ?params, "Executing warehouse query");
        let conn = self.conn.lock();
        Ok(run_query(&conn, sql, params)?)
    }

    fn winners_dashboard(
        &self,
        request: &WinnersRequest,
    ) -> Result<WinnersDashboard, WarehouseError> {
        let as_of = if request.as_of == LATEST {
            self.latest_run_date(SIGNALS_TABLE)?
        } else {
            request.as_of.clone()
        };

        let mut sql = format!(
            "SELECT * FROM {} WHERE run_date = CAST(? AS DATE)",
            self.table_id(SIGNALS_TABLE)
        );
        let mut params = vec![QueryParam::text("run_date", as_of.clone())];
        if let Some(option_type) = request.option_type {
            sql.push_str(" AND option_type = ?");
            params.push(QueryParam::text("option_type", option_type.as_str()));
        }
        sql.push_str(
            " ORDER BY gamma DESC NULLS LAST, signal_score DESC NULLS LAST, ticker LIMIT ?",
        );
        params.push(QueryParam::int("limit", i64::from(request.limit)));

        let rows = self.query(&sql, &params)?;
        Ok(WinnersDashboard {
            as_of,
            signals: rows.to_json_objects(),
        })
    }
}

fn run_query(
    conn: &Connection,
    sql: &str,
    params: &[QueryParam],
) -> Result<ResultSet, duckdb::Error> {
    let mut stmt = conn.prepare(sql)?;
    let bound: Vec<&dyn ToSql> = params
        .iter()
        .map(|p| match &p.value {
            ParamValue::Text(s) => s as &dyn ToSql,
            ParamValue::Int(i) => i as &dyn ToSql,
        })
        .collect();

    let mut result = ResultSet::default();
    let mut rows = stmt.query(bound.as_slice())?;
    while let Some(row) = rows.next()? {
        // Column metadata is only available once the statement has produced a row.
        if result.columns.is_empty() {
            let executed: &Statement<'_> = row.as_ref();
            result.columns = executed.column_names();
        }
        let cells = (0..result.columns.len())
            .map(|i| row.get::<_, Value>(i).map(cell_from_value))
            .collect::<Result<Vec<_>, _>>()?;
        result.rows.push(cells);
    }
    Ok(result)
}

/// Map a DuckDB value onto the cell variant for its declared type.
pub fn cell_from_value(value: Value) -> Cell {
    match value {
        Value::Null => Cell::Null,
        Value::Boolean(b) => Cell::Bool(b),
        Value::TinyInt(i) => Cell::Int(i64::from(i)),
        Value::SmallInt(i) => Cell::Int(i64::from(i)),
        Value::Int(i) => Cell::Int(i64::from(i)),
        Value::BigInt(i) => Cell::Int(i),
        Value::HugeInt(i) => i64::try_from(i).map_or_else(|_| Cell::Text(i.to_string()), Cell::Int),
        Value::UTinyInt(u) => Cell::UInt(u64::from(u)),
        Value::USmallInt(u) => Cell::UInt(u64::from(u)),
        Value::UInt(u) => Cell::UInt(u64::from(u)),
        Value::UBigInt(u) => Cell::UInt(u),
        // Go through the shortest f32 text so REAL 0.1 stays 0.1.
        Value::Float(f) => f.to_string().parse::<f64>().map_or(Cell::Null, Cell::Float),
        Value::Double(f) => Cell::Float(f),
        Value::Decimal(d) => {
            let text = d.to_string();
            text.parse::<f64>().map_or(Cell::Text(text), Cell::Float)
        }
        Value::Text(s) | Value::Enum(s) => Cell::Text(s),
        Value::Blob(bytes) => Cell::Text(String::from_utf8_lossy(&bytes).into_owned()),
        Value::Date32(days) => date_from_days(days).map_or(Cell::Null, Cell::Date),
        Value::Timestamp(unit, v) => timestamp_from(unit, v).map_or(Cell::Null, Cell::Timestamp),
        Value::Time64(unit, v) => time_from(unit, v).map_or(Cell::Null, Cell::Time),
        Value::Interval {
            months,
            days,
            nanos,
        } => Cell::Text(iso_duration(months, days, nanos)),
        Value::List(items) | Value::Array(items) => Cell::Json(serde_json::Value::Array(
            items
                .into_iter()
                .map(|v| cell_from_value(v).to_json())
                .collect(),
        )),
        Value::Struct(fields) => Cell::Json(serde_json::Value::Object(
            fields
                .iter()
                .map(|(name, v)| (name.clone(), cell_from_value(v.clone()).to_json()))
                .collect(),
        )),
        Value::Map(entries) => Cell::Json(map_to_json(&entries)),
        Value::Union(inner) => cell_from_value(*inner),
        other => Cell::Text(format!("{other:?}")),
    }
}

/// A map with text keys becomes a JSON object; any other key type becomes an
/// array of `{"key", "value"}` pairs, preserving entry order.
fn map_to_json(entries: &OrderedMap<Value, Value>) -> serde_json::Value {
    if entries.keys().all(|k| matches!(k, Value::Text(_))) {
        return serde_json::Value::Object(
            entries
                .iter()
                .filter_map(|(k, v)| match k {
                    Value::Text(key) => Some((key.clone(), cell_from_value(v.clone()).to_json())),
                    _ => None,
                })
                .collect(),
        );
    }
    serde_json::Value::Array(
        entries
            .iter()
            .map(|(k, v)| {
                serde_json::json!({
                    "key": cell_from_value(k.clone()).to_json(),
                    "value": cell_from_value(v.clone()).to_json(),
                })
            })
            .collect(),
    )
}

fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1970, 1, 1)?
        .checked_add_signed(chrono::TimeDelta::try_days(i64::from(days))?)
}

fn timestamp_from(unit: TimeUnit, value: i64) -> Option<NaiveDateTime> {
    let dt = match unit {
        TimeUnit::Second => DateTime::<Utc>::from_timestamp(value, 0),
        TimeUnit::Millisecond => DateTime::<Utc>::from_timestamp_millis(value),
        TimeUnit::Microsecond => DateTime::<Utc>::from_timestamp_micros(value),
        TimeUnit::Nanosecond => Some(DateTime::<Utc>::from_timestamp_nanos(value)),
    };
    dt.map(|dt| dt.naive_utc())
}

fn time_from(unit: TimeUnit, value: i64) -> Option<NaiveTime> {
    let nanos: i64 = match unit {
        TimeUnit::Second => value.checked_mul(1_000_000_000)?,
        TimeUnit::Millisecond => value.checked_mul(1_000_000)?,
        TimeUnit::Microsecond => value.checked_mul(1_000)?,
        TimeUnit::Nanosecond => value,
    };
    let secs = u32::try_from(nanos / 1_000_000_000).ok()?;
    let frac = u32::try_from(nanos % 1_000_000_000).ok()?;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, frac)
}

fn iso_duration(months: i32, days: i32, nanos: i64) -> String {
    let whole = nanos / 1_000_000_000;
    let frac = (nanos % 1_000_000_000).abs();
    if frac == 0 {
        format!("P{months}M{days}DT{whole}S")
    } else {
        format!("P{months}M{days}DT{whole}.{frac:09}S")
    }
}
