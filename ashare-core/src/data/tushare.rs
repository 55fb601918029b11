//! Tushare Pro data provider.
//!
//! Every endpoint is a JSON POST of `{api_name, token, params, fields}` to one
//! URL. The reply carries a status `code` plus a column-oriented `data` block of
//! `fields` and row `items`.

use super::provider::{DataError, DataProvider, TradeCalendar};
use super::schema::{LimitTable, SchemaError, TableSchema};
use crate::domain::TradeDate;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "http://api.tushare.pro";

/// Provider code for "too many requests this minute".
const CODE_RATE_LIMITED: i64 = 40203;
/// Provider codes for a missing or invalid token.
const CODES_BAD_TOKEN: [i64; 2] = [40101, -2001];

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    api_name: &'a str,
    token: &'a str,
    params: Value,
    fields: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    data: Option<ApiData>,
}

#[derive(Debug, Deserialize)]
struct ApiData {
    fields: Vec<String>,
    #[serde(default)]
    items: Vec<Vec<Value>>,
}

/// Tushare Pro client.
pub struct TushareProvider {
    client: reqwest::blocking::Client,
    api_url: String,
    token: String,
}

impl TushareProvider {
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> Result<Self, DataError> {
        if token.trim().is_empty() {
            return Err(DataError::Config("empty Tushare token".into()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: api_url.to_string(),
            token: token.trim().to_string(),
        })
    }

    /// Execute one API call, returning the raw `data` block.
    fn call(&self, api_name: &str, params: Value, fields: &str) -> Result<ApiData, DataError> {
        debug!(api_name, %params, "tushare request");
        let request = ApiRequest {
            api_name,
            token: &self.token,
            params,
            fields,
        };

        let resp = self
            .client
            .post(&self.api_url)
            .json(&request)
            .send()
            .map_err(classify_transport_error)?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DataError::RateLimited(format!("HTTP {status}")));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(DataError::AuthenticationRequired(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(DataError::Http {
                status: status.as_u16(),
            });
        }

        let body: ApiResponse = resp.json().map_err(|e| {
            if e.is_timeout() {
                DataError::Timeout(e.to_string())
            } else {
                DataError::MalformedResponse(format!("{api_name}: {e}"))
            }
        })?;
        parse_response(api_name, body)
    }

    fn query_frame(
        &self,
        api_name: &str,
        params: Value,
        schema: &TableSchema,
    ) -> Result<DataFrame, DataError> {
        let data = self.call(api_name, params, &schema.field_list())?;
        schema
            .frame_from_rows(&data.fields, &data.items)
            .map_err(|e: SchemaError| DataError::MalformedResponse(format!("{api_name}: {e}")))
    }
}

fn classify_transport_error(e: reqwest::Error) -> DataError {
    if e.is_timeout() {
        DataError::Timeout(e.to_string())
    } else {
        DataError::NetworkUnreachable(e.to_string())
    }
}

fn parse_response(api_name: &str, body: ApiResponse) -> Result<ApiData, DataError> {
    if body.code != 0 {
        let msg = body.msg.unwrap_or_default();
        return Err(match body.code {
            CODE_RATE_LIMITED => DataError::RateLimited(msg),
            code if CODES_BAD_TOKEN.contains(&code) => DataError::AuthenticationRequired(msg),
            code => DataError::Provider { code, msg },
        });
    }
    body.data
        .ok_or_else(|| DataError::MalformedResponse(format!("{api_name}: no data block")))
}

impl DataProvider for TushareProvider {
    fn name(&self) -> &str {
        "tushare"
    }

    fn fetch_limits(&self, table: LimitTable, trade_date: &TradeDate) -> Result<DataFrame, DataError> {
        self.query_frame(
            table.api_name(),
            json!({ "trade_date": trade_date.as_str() }),
            table.schema(),
        )
    }
}

impl TradeCalendar for TushareProvider {
    fn open_days(
        &self,
        exchange: &str,
        start: &TradeDate,
        end: &TradeDate,
    ) -> Result<Vec<TradeDate>, DataError> {
        let data = self.call(
            "trade_cal",
            json!({
                "exchange": exchange,
                "start_date": start.as_str(),
                "end_date": end.as_str(),
                "is_open": "1",
            }),
            "exchange,cal_date,is_open",
        )?;

        let idx = data
            .fields
            .iter()
            .position(|f| f == "cal_date")
            .ok_or_else(|| DataError::MalformedResponse("trade_cal: no cal_date field".into()))?;

        let mut days = data
            .items
            .iter()
            .map(|row| {
                row.get(idx)
                    .and_then(Value::as_str)
                    .ok_or_else(|| DataError::MalformedResponse("trade_cal: bad cal_date".into()))?
                    .parse::<TradeDate>()
                    .map_err(|e| DataError::MalformedResponse(format!("trade_cal: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Newer API versions answer newest-first.
        days.sort();
        days.dedup();
        Ok(days)
    }
}
