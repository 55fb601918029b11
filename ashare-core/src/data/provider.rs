//! Data provider traits and structured error types.
//!
//! The DataProvider trait abstracts over the remote statistics source so the
//! fetch-append pipeline can be driven by Tushare in production and by an
//! in-memory mock in tests.

use super::schema::LimitTable;
use crate::domain::TradeDate;
use polars::prelude::DataFrame;
use thiserror::Error;

/// Structured error types for remote data operations.
///
/// Variants fall into three handling classes (see [`DataError::class`]):
/// transient failures are retried, malformed responses abort the run, and
/// configuration failures abort immediately without retrying.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("provider returned HTTP {status}")]
    Http { status: u16 },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("provider error {code}: {msg}")]
    Provider { code: i64, msg: String },

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// How the pipeline reacts to a [`DataError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry the same request after the backoff delay.
    Transient,
    /// The provider answered, but not with usable data. Abort the run.
    Malformed,
    /// Credentials or settings are wrong. Retrying cannot help.
    Fatal,
}

impl DataError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DataError::NetworkUnreachable(_) | DataError::Timeout(_) | DataError::RateLimited(_) => {
                ErrorClass::Transient
            }
            DataError::Http { status } if *status >= 500 => ErrorClass::Transient,
            DataError::Http { .. } | DataError::MalformedResponse(_) | DataError::Provider { .. } => {
                ErrorClass::Malformed
            }
            DataError::AuthenticationRequired(_) | DataError::Config(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Per-date statistics source.
///
/// An empty frame means "not published yet" and is not an error.
pub trait DataProvider {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch one trade date of the given limit table.
    fn fetch_limits(&self, table: LimitTable, trade_date: &TradeDate) -> Result<DataFrame, DataError>;
}

/// Trading calendar source.
pub trait TradeCalendar {
    /// Open days on `exchange` in `[start, end]`, ascending.
    ///
    /// An empty exchange string selects the provider default (SSE).
    fn open_days(
        &self,
        exchange: &str,
        start: &TradeDate,
        end: &TradeDate,
    ) -> Result<Vec<TradeDate>, DataError>;
}
