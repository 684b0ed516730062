//! Query-string parameters of the signals endpoints.

use crate::api::errors::ApiError;
use crate::warehouse::{OptionType, LATEST};
use axum::extract::FromRequestParts;
use serde::Deserialize;

/// `Query` extractor whose rejections become [`ApiError::Validation`] (422).
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Upper bound for `limit` on the top-signals endpoint.
pub const MAX_TOP_LIMIT: u32 = 1000;

fn default_as_of() -> String {
    LATEST.to_string()
}

const fn default_limit() -> u32 {
    10
}

/// Parameters for `GET /options-signals`.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub run_date: Option<String>,
    /// Ticker prefix, matched case-insensitively.
    pub ticker: Option<String>,
    pub option_type: Option<OptionType>,
}

/// Parameters for `GET /options-signals/top`.
#[derive(Debug, Deserialize)]
pub struct TopParams {
    #[serde(default = "default_as_of")]
    pub as_of: String,
    pub option_type: Option<OptionType>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

impl TopParams {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.limit == 0 || self.limit > MAX_TOP_LIMIT {
            return Err(ApiError::Validation(format!(
                "limit must be between 1 and {MAX_TOP_LIMIT}"
            )));
        }
        Ok(())
    }
}

/// Parameters for `GET /options-signals/{ticker}`.
#[derive(Debug, Deserialize)]
pub struct DetailParams {
    #[serde(default = "default_as_of")]
    pub as_of: String,
}
