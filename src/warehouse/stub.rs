//! In-process [`Warehouse`] for tests. Returns canned data and records every
//! call so tests can assert on what would have been executed.

use super::{
    quote_ident, Cell, QueryParam, ResultSet, Warehouse, WarehouseError, WinnersDashboard,
    WinnersRequest, LATEST,
};
use crate::query::signals::BuiltQuery;
use parking_lot::Mutex;

#[derive(Default)]
pub struct StubWarehouse {
    latest: Option<String>,
    rows: ResultSet,
    dashboard_signals: Vec<serde_json::Value>,
    failure: Option<String>,
    executed: Mutex<Vec<BuiltQuery>>,
    winners_requests: Mutex<Vec<WinnersRequest>>,
}

impl StubWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latest(mut self, date: &str) -> Self {
        self.latest = Some(date.to_string());
        self
    }

    /// Answer every query with a single `ticker` column.
    pub fn with_tickers(mut self, tickers: &[&str]) -> Self {
        let mut rs = ResultSet::new(vec!["ticker".to_string()]);
        rs.rows = tickers
            .iter()
            .map(|t| vec![Cell::Text((*t).to_string())])
            .collect();
        self.rows = rs;
        self
    }

    pub fn with_rows(mut self, rows: ResultSet) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_dashboard(mut self, signals: Vec<serde_json::Value>) -> Self {
        self.dashboard_signals = signals;
        self
    }

    /// Make every call fail with `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn executed(&self) -> Vec<BuiltQuery> {
        self.executed.lock().clone()
    }

    pub fn winners_requests(&self) -> Vec<WinnersRequest> {
        self.winners_requests.lock().clone()
    }

    fn check(&self) -> Result<(), WarehouseError> {
        self.failure
            .as_ref()
            .map_or(Ok(()), |msg| Err(WarehouseError::Unavailable(msg.clone())))
    }
}

impl Warehouse for StubWarehouse {
    fn table_id(&self, table: &str) -> String {
        quote_ident(table)
    }

    fn latest_run_date(&self, table: &str) -> Result<String, WarehouseError> {
        self.check()?;
        self.latest
            .clone()
            .ok_or_else(|| WarehouseError::NoPartitions(table.to_string()))
    }

    fn query(&self, sql: &str, params: &[QueryParam]) -> Result<ResultSet, WarehouseError> {
        self.executed.lock().push(BuiltQuery {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        self.check()?;
        Ok(self.rows.clone())
    }

    fn winners_dashboard(
        &self,
        request: &WinnersRequest,
    ) -> Result<WinnersDashboard, WarehouseError> {
        self.winners_requests.lock().push(request.clone());
        self.check()?;
        let as_of = if request.as_of == LATEST {
            self.latest_run_date(super::SIGNALS_TABLE)?
        } else {
            request.as_of.clone()
        };
        let limit = usize::try_from(request.limit).unwrap_or(usize::MAX);
        Ok(WinnersDashboard {
            as_of,
            signals: self.dashboard_signals.iter().take(limit).cloned().collect(),
        })
    }
}
