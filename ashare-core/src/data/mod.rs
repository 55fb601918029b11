//! Remote providers, archive storage and watermarks

pub mod archive;
pub mod provider;
pub mod retry;
pub mod schema;
pub mod tushare;
pub mod watermark;

pub use archive::{Archive, ArchiveError, TableMeta, TableStatus};
pub use provider::{DataError, DataProvider, ErrorClass, TradeCalendar};
pub use retry::{Backoff, RetryError, RetryPolicy};
pub use schema::{ColumnKind, LimitTable, SchemaError, TableSchema};
pub use tushare::TushareProvider;
pub use watermark::{DateWatermarks, LengthWatermarks};
