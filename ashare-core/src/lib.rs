//! ashare core: local archive of Chinese A-share data.
//!
//! - Typed trade dates and the Tushare limit-table schemas
//! - Parquet archive with atomic writes, append and per-table metadata
//! - Date and byte-length watermarks for incremental updates
//! - Tushare Pro client behind the `DataProvider` / `TradeCalendar` traits
//! - TDX day-file and price-volume report decoders
//! - Fetch-append, day-file and report import pipelines

pub mod config;
pub mod data;
pub mod domain;
pub mod pipeline;
pub mod tdx;

pub use config::{AppConfig, ConfigError};
pub use pipeline::PipelineError;
