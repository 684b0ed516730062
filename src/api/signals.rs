//! Options-signals endpoints.

use crate::api::errors::ApiError;
use crate::api::params::{ApiQuery, DetailParams, ListParams, TopParams};
use crate::api::AppState;
use crate::query::signals::{self, TickerFilter};
use crate::warehouse::{WarehouseError, WinnersRequest, LATEST, SIGNALS_TABLE};
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

const LIST_CACHE_CONTROL: &str = "public, max-age=300";
const TOP_CACHE_CONTROL: &str = "public, max-age=300";
const DETAIL_CACHE_CONTROL: &str = "public, max-age=120";

/// Response wrapper shared by all signals endpoints.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub dataset: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_of: Option<String>,
    pub items: Vec<T>,
}

/// Run a warehouse call on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("Query task panicked: {e}")))?
}

/// GET /v1/options-signals — Distinct tickers for a run date.
pub async fn list_options_signals(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = TickerFilter {
        run_date: params.run_date,
        ticker_prefix: params.ticker,
        option_type: params.option_type,
    };

    let warehouse = Arc::clone(&state.warehouse);
    let items = run_blocking(move || {
        signals::list_tickers(warehouse.as_ref(), &filter).map_err(|e| {
            tracing::error!(
                error = %e,
                run_date = ?filter.run_date,
                ticker = ?filter.ticker_prefix,
                "Error querying options signals tickers"
            );
            ApiError::execution("Error querying warehouse for distinct tickers", e)
        })
    })
    .await?;

    Ok((
        [(header::CACHE_CONTROL, LIST_CACHE_CONTROL)],
        Json(Envelope {
            dataset: "options-signals",
            id: None,
            as_of: None,
            items,
        }),
    ))
}

/// GET /v1/options-signals/top — Top-ranked signals across all tickers.
pub async fn get_top_options_signals(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<TopParams>,
) -> Result<impl IntoResponse, ApiError> {
    params.validate()?;
    let request = WinnersRequest {
        limit: params.limit,
        option_type: params.option_type,
        as_of: params.as_of,
    };

    let warehouse = Arc::clone(&state.warehouse);
    let dashboard = run_blocking(move || {
        warehouse.winners_dashboard(&request).map_err(|e| {
            tracing::error!(
                error = %e,
                as_of = %request.as_of,
                limit = request.limit,
                "Error querying top options signals"
            );
            ApiError::execution("Error querying warehouse for top signals", e)
        })
    })
    .await?;

    Ok((
        [(header::CACHE_CONTROL, TOP_CACHE_CONTROL)],
        Json(Envelope {
            dataset: "options-signals-top",
            id: None,
            as_of: Some(dashboard.as_of),
            items: dashboard.signals,
        }),
    ))
}

/// GET /v1/options-signals/{ticker} — Every signal row for one ticker and date.
pub async fn get_ticker_options_signals(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    ApiQuery(params): ApiQuery<DetailParams>,
) -> Result<impl IntoResponse, ApiError> {
    let ticker = ticker.to_uppercase();
    let warehouse = Arc::clone(&state.warehouse);
    let id = ticker.clone();

    let (run_date, items) = run_blocking(move || {
        let failed = |e: WarehouseError, run_date: &str| {
            tracing::error!(
                error = %e,
                ticker = %ticker,
                run_date = %run_date,
                "Error querying ticker signals"
            );
            ApiError::execution(format!("Error querying warehouse for ticker {ticker}"), e)
        };

        let run_date = if params.as_of == LATEST {
            warehouse
                .latest_run_date(SIGNALS_TABLE)
                .map_err(|e| failed(e, LATEST))?
        } else {
            params.as_of
        };

        let items = signals::ticker_detail(warehouse.as_ref(), &ticker, &run_date)
            .map_err(|e| failed(e, &run_date))?;
        if items.is_empty() {
            return Err(ApiError::NotFound(format!(
                "No options signals found for ticker {ticker} on {run_date}."
            )));
        }
        Ok((run_date, items))
    })
    .await?;

    Ok((
        [(header::CACHE_CONTROL, DETAIL_CACHE_CONTROL)],
        Json(Envelope {
            dataset: "options-signals-item",
            id: Some(id),
            as_of: Some(run_date),
            items,
        }),
    ))
}
