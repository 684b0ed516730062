use crate::warehouse::{OptionType, QueryParam, Warehouse, WarehouseError, LATEST, SIGNALS_TABLE};
use serde::Serialize;

/// Path prefix of ticker-detail links.
pub const TICKER_HREF_PREFIX: &str = "/v1/options-signals";

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

/// Filters of the ticker listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickerFilter {
    /// Requested run date; `None`, empty or `"latest"` resolve to the newest partition.
    pub run_date: Option<String>,
    pub ticker_prefix: Option<String>,
    pub option_type: Option<OptionType>,
}

/// One entry of the ticker listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickerLink {
    pub id: String,
    pub href: String,
}

impl TickerLink {
    pub fn new(ticker: &str) -> Self {
        Self {
            id: ticker.to_string(),
            href: format!("{TICKER_HREF_PREFIX}/{ticker}"),
        }
    }
}

/// Resolve a requested run date, treating absent, empty and `"latest"` as the
/// newest partition of the signals table.
pub fn resolve_run_date(
    warehouse: &dyn Warehouse,
    requested: Option<&str>,
) -> Result<String, WarehouseError> {
    match requested {
        Some(date) if !date.is_empty() && date != LATEST => Ok(date.to_string()),
        _ => warehouse.latest_run_date(SIGNALS_TABLE),
    }
}

/// Build the distinct-ticker query.
///
/// The prefix is uppercased and turned into a `LIKE` pattern with its
/// wildcards escaped; an empty prefix adds no filter.
pub fn list_tickers_query(
    table_id: &str,
    run_date: &str,
    ticker_prefix: Option<&str>,
    option_type: Option<OptionType>,
) -> BuiltQuery {
    let mut clauses = vec!["run_date = CAST(? AS DATE)"];
    let mut params = vec![QueryParam::text("run_date", run_date)];

    if let Some(prefix) = ticker_prefix.filter(|p| !p.is_empty()) {
        clauses.push("ticker LIKE ? ESCAPE '\\'");
        params.push(QueryParam::text(
            "ticker",
            format!("{}%", escape_like(&prefix.to_uppercase())),
        ));
    }
    if let Some(option_type) = option_type {
        clauses.push("option_type = ?");
        params.push(QueryParam::text("option_type", option_type.as_str()));
    }

    let sql = format!(
        "SELECT DISTINCT ticker FROM {table_id} WHERE {} ORDER BY ticker",
        clauses.join(" AND ")
    );
    BuiltQuery { sql, params }
}

/// Escape `LIKE` metacharacters so the text matches literally.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Build the every-column query for one ticker on one run date.
pub fn ticker_detail_query(table_id: &str, run_date: &str, ticker: &str) -> BuiltQuery {
    BuiltQuery {
        sql: format!(
            "SELECT * FROM {table_id} WHERE run_date = CAST(? AS DATE) AND ticker = ?"
        ),
        params: vec![
            QueryParam::text("run_date", run_date),
            QueryParam::text("ticker", ticker.to_uppercase()),
        ],
    }
}

/// Distinct tickers for the resolved run date, ascending.
pub fn list_tickers(
    warehouse: &dyn Warehouse,
    filter: &TickerFilter,
) -> Result<Vec<TickerLink>, WarehouseError> {
    let run_date = resolve_run_date(warehouse, filter.run_date.as_deref())?;
    let query = list_tickers_query(
        &warehouse.table_id(SIGNALS_TABLE),
        &run_date,
        filter.ticker_prefix.as_deref(),
        filter.option_type,
    );
    let rows = warehouse.query(&query.sql, &query.params)?;

    // The SQL already orders, but the listing contract must not depend on it.
    let mut tickers: Vec<&str> = rows.column("ticker").filter_map(|c| c.as_text()).collect();
    tickers.sort_unstable();
    tickers.dedup();
    Ok(tickers.into_iter().map(TickerLink::new).collect())
}

/// Every row for `ticker` on `run_date`, as JSON objects with ISO-8601 dates.
/// An empty result is returned as-is; callers decide what "not found" means.
pub fn ticker_detail(
    warehouse: &dyn Warehouse,
    ticker: &str,
    run_date: &str,
) -> Result<Vec<serde_json::Value>, WarehouseError> {
    let query = ticker_detail_query(&warehouse.table_id(SIGNALS_TABLE), run_date, ticker);
    let rows = warehouse.query(&query.sql, &query.params)?;
    Ok(rows.to_json_objects())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::stub::StubWarehouse;
    use crate::warehouse::{Cell, ParamValue};

    const TABLE: &str = "\"options_analysis_signals\"";

    fn param<'a>(query: &'a BuiltQuery, name: &str) -> Option<&'a ParamValue> {
        query.params.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    #[test]
    fn test_list_query_minimal() {
        let q = list_tickers_query(TABLE, "2024-05-01", None, None);
        assert_eq!(
            q.sql,
            "SELECT DISTINCT ticker FROM \"options_analysis_signals\" WHERE run_date = CAST(? AS DATE) ORDER BY ticker"
        );
        assert_eq!(q.params, vec![QueryParam::text("run_date", "2024-05-01")]);
    }

    #[test]
    fn test_list_query_all_filters() {
        let q = list_tickers_query(TABLE, "2024-05-01", Some("aa"), Some(OptionType::Call));
        assert!(q
            .sql
            .ends_with("WHERE run_date = CAST(? AS DATE) AND ticker LIKE ? ESCAPE '\\' AND option_type = ? ORDER BY ticker"));
        assert_eq!(param(&q, "ticker"), Some(&ParamValue::Text("AA%".into())));
        assert_eq!(
            param(&q, "option_type"),
            Some(&ParamValue::Text("CALL".into()))
        );
    }

    #[test]
    fn test_list_query_empty_prefix_ignored() {
        let q = list_tickers_query(TABLE, "2024-05-01", Some(""), None);
        assert!(!q.sql.contains("LIKE"));
        assert_eq!(q.params.len(), 1);
    }

    #[test]
    fn test_list_query_escapes_wildcards() {
        let q = list_tickers_query(TABLE, "2024-05-01", Some("b_r%"), None);
        assert_eq!(param(&q, "ticker"), Some(&ParamValue::Text("B\\_R\\%%".into())));

        let q = list_tickers_query(TABLE, "2024-05-01", Some("a\\"), None);
        assert_eq!(param(&q, "ticker"), Some(&ParamValue::Text("A\\\\%".into())));
    }

    #[test]
    fn test_detail_query_uppercases_ticker() {
        let q = ticker_detail_query(TABLE, "2024-05-01", "aapl");
        assert_eq!(
            q.sql,
            "SELECT * FROM \"options_analysis_signals\" WHERE run_date = CAST(? AS DATE) AND ticker = ?"
        );
        assert_eq!(param(&q, "ticker"), Some(&ParamValue::Text("AAPL".into())));
        assert_eq!(
            param(&q, "run_date"),
            Some(&ParamValue::Text("2024-05-01".into()))
        );
    }

    #[test]
    fn test_resolve_run_date_explicit() {
        let wh = StubWarehouse::new().with_latest("2024-05-03");
        assert_eq!(resolve_run_date(&wh, Some("2024-04-01")).unwrap(), "2024-04-01");
    }

    #[test]
    fn test_resolve_run_date_latest_variants() {
        let wh = StubWarehouse::new().with_latest("2024-05-03");
        assert_eq!(resolve_run_date(&wh, None).unwrap(), "2024-05-03");
        assert_eq!(resolve_run_date(&wh, Some("")).unwrap(), "2024-05-03");
        assert_eq!(resolve_run_date(&wh, Some("latest")).unwrap(), "2024-05-03");
    }

    #[test]
    fn test_list_tickers_sorts_and_dedups() {
        let wh = StubWarehouse::new().with_tickers(&["AAPL", "AA", "AAPL"]);
        let filter = TickerFilter {
            run_date: Some("2024-05-01".into()),
            ..TickerFilter::default()
        };
        let links = list_tickers(&wh, &filter).unwrap();
        assert_eq!(
            links,
            vec![TickerLink::new("AA"), TickerLink::new("AAPL")]
        );
        assert_eq!(links[0].href, "/v1/options-signals/AA");
    }

    #[test]
    fn test_list_tickers_uses_latest_date() {
        let wh = StubWarehouse::new()
            .with_latest("2024-05-01")
            .with_tickers(&["MSFT"]);
        list_tickers(&wh, &TickerFilter::default()).unwrap();

        let executed = wh.executed();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].params[0], QueryParam::text("run_date", "2024-05-01"));
    }

    #[test]
    fn test_ticker_detail_iso_dates() {
        let mut rs = crate::warehouse::ResultSet::new(vec!["ticker".into(), "run_date".into()]);
        rs.rows.push(vec![
            Cell::Text("AAPL".into()),
            Cell::Date(chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()),
        ]);
        let wh = StubWarehouse::new().with_rows(rs);

        let items = ticker_detail(&wh, "aapl", "2024-05-01").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["run_date"], "2024-05-01");
    }

    #[test]
    fn test_ticker_detail_propagates_failure() {
        let wh = StubWarehouse::new().failing("boom");
        let err = ticker_detail(&wh, "AAPL", "2024-05-01").unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
