//! Trading-calendar date in the provider's `YYYYMMDD` form.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const COMPACT_FORMAT: &str = "%Y%m%d";
const DASHED_FORMAT: &str = "%Y-%m-%d";

/// An 8-digit `YYYYMMDD` date.
///
/// Ordering is lexicographic on the digits, which for a fixed-width date is
/// also chronological.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TradeDate(String);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid trade date '{0}': expected YYYYMMDD")]
pub struct TradeDateError(pub String);

impl TradeDate {
    pub fn from_naive(date: NaiveDate) -> Self {
        Self(date.format(COMPACT_FORMAT).to_string())
    }

    /// Today's date on the local clock.
    pub fn today() -> Self {
        Self::from_naive(chrono::Local::now().date_naive())
    }

    /// Accepts `YYYYMMDD` as well as `YYYY-MM-DD`, as found in exported reports.
    pub fn parse_loose(s: &str) -> Result<Self, TradeDateError> {
        let s = s.trim();
        match NaiveDate::parse_from_str(s, DASHED_FORMAT) {
            Ok(date) => Ok(Self::from_naive(date)),
            Err(_) => s.parse(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_naive(&self) -> NaiveDate {
        // Validated on construction.
        NaiveDate::parse_from_str(&self.0, COMPACT_FORMAT).unwrap_or_default()
    }
}

impl FromStr for TradeDate {
    type Err = TradeDateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TradeDateError(s.to_string()));
        }
        NaiveDate::parse_from_str(s, COMPACT_FORMAT).map_err(|_| TradeDateError(s.to_string()))?;
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for TradeDate {
    type Error = TradeDateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TradeDate> for String {
    fn from(value: TradeDate) -> Self {
        value.0
    }
}

impl fmt::Display for TradeDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compact_dates() {
        let d: TradeDate = "20070104".parse().unwrap();
        assert_eq!(d.as_str(), "20070104");
        assert_eq!(d.to_naive(), NaiveDate::from_ymd_opt(2007, 1, 4).unwrap());
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!("2007014".parse::<TradeDate>().is_err());
        assert!("2007-01-04".parse::<TradeDate>().is_err());
        assert!("20070230".parse::<TradeDate>().is_err());
        assert!("2007010a".parse::<TradeDate>().is_err());
    }

    #[test]
    fn loose_parse_accepts_dashes() {
        let d = TradeDate::parse_loose("2020-06-09").unwrap();
        assert_eq!(d.as_str(), "20200609");
        assert_eq!(TradeDate::parse_loose(" 20200609 ").unwrap(), d);
    }

    #[test]
    fn ordering_is_chronological() {
        let a: TradeDate = "20191231".parse().unwrap();
        let b: TradeDate = "20200102".parse().unwrap();
        assert!(a < b);
    }

    #[test]
    fn serde_validates() {
        let d: TradeDate = serde_json::from_str("\"20160215\"").unwrap();
        assert_eq!(d.as_str(), "20160215");
        assert!(serde_json::from_str::<TradeDate>("\"2016\"").is_err());
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"20160215\"");
    }
}
