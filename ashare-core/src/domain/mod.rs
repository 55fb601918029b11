//! Domain types shared by the pipelines.

pub mod trade_date;

pub use trade_date::{TradeDate, TradeDateError};
