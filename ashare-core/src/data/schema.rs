//! Table schemas for the archived statistics.
//!
//! Each remote statistic has a fixed column set. Frames are always built from
//! the declared schema rather than inferred from a day's payload, so batches
//! from different dates stack without dtype drift (an all-null column on one
//! day must not change the column type).

use crate::domain::TradeDate;
use polars::prelude::*;
use serde_json::Value;

/// Logical column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Float,
    Int,
}

impl ColumnKind {
    pub fn dtype(self) -> DataType {
        match self {
            ColumnKind::Text => DataType::String,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Int => DataType::Int64,
        }
    }
}

/// Ordered column declaration of an archived table.
#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub columns: &'static [(&'static str, ColumnKind)],
}

/// `stk_limit`: daily limit prices for every listed stock.
pub const STK_LIMIT_SCHEMA: TableSchema = TableSchema {
    columns: &[
        ("trade_date", ColumnKind::Text),
        ("ts_code", ColumnKind::Text),
        ("pre_close", ColumnKind::Float),
        ("up_limit", ColumnKind::Float),
        ("down_limit", ColumnKind::Float),
    ],
};

/// `limit_list`: stocks that closed at a limit, with sealing statistics.
pub const LIMIT_LIST_SCHEMA: TableSchema = TableSchema {
    columns: &[
        ("trade_date", ColumnKind::Text),
        ("ts_code", ColumnKind::Text),
        ("name", ColumnKind::Text),
        ("close", ColumnKind::Float),
        ("pct_chg", ColumnKind::Float),
        ("amp", ColumnKind::Float),
        ("fc_ratio", ColumnKind::Float),
        ("fl_ratio", ColumnKind::Float),
        ("fd_amount", ColumnKind::Float),
        ("first_time", ColumnKind::Text),
        ("last_time", ColumnKind::Text),
        ("open_times", ColumnKind::Int),
        ("strth", ColumnKind::Float),
        ("limit", ColumnKind::Text),
    ],
};

/// Daily bars decoded from TDX day-files, in Tushare `daily` column order.
pub const DAY_BAR_SCHEMA: TableSchema = TableSchema {
    columns: &[
        ("ts_code", ColumnKind::Text),
        ("trade_date", ColumnKind::Text),
        ("open", ColumnKind::Float),
        ("high", ColumnKind::Float),
        ("low", ColumnKind::Float),
        ("close", ColumnKind::Float),
        ("vol", ColumnKind::Float),
        ("amount", ColumnKind::Float),
    ],
};

/// The limit statistics maintained by the fetch-append pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitTable {
    /// Per-stock limit prices, available from 2007-01-04.
    StkLimit,
    /// Limit-up/limit-down statistics, available from 2016-02-15.
    LimitList,
}

impl LimitTable {
    pub const ALL: [LimitTable; 2] = [LimitTable::StkLimit, LimitTable::LimitList];

    /// Remote API name.
    pub fn api_name(self) -> &'static str {
        match self {
            LimitTable::StkLimit => "stk_limit",
            LimitTable::LimitList => "limit_list",
        }
    }

    /// Archive table name.
    pub fn table_name(self) -> &'static str {
        self.api_name()
    }

    /// Key of this table's entry in the date watermark table.
    pub fn watermark_key(self) -> &'static str {
        match self {
            LimitTable::StkLimit => "stkdate",
            LimitTable::LimitList => "lsdate",
        }
    }

    /// First date the provider has data for. Used on the first run.
    pub fn history_start(self) -> TradeDate {
        let date = match self {
            LimitTable::StkLimit => chrono::NaiveDate::from_ymd_opt(2007, 1, 4),
            LimitTable::LimitList => chrono::NaiveDate::from_ymd_opt(2016, 2, 15),
        };
        TradeDate::from_naive(date.unwrap_or_default())
    }

    pub fn schema(self) -> &'static TableSchema {
        match self {
            LimitTable::StkLimit => &STK_LIMIT_SCHEMA,
            LimitTable::LimitList => &LIMIT_LIST_SCHEMA,
        }
    }
}

impl TableSchema {
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|(name, _)| *name)
    }

    /// Comma-separated field list for provider requests.
    pub fn field_list(&self) -> String {
        self.names().collect::<Vec<_>>().join(",")
    }

    /// Zero-row frame with the declared columns.
    pub fn empty_frame(&self) -> Result<DataFrame, SchemaError> {
        self.frame_from_rows(&[], &[])
    }

    /// Build a frame from a row-oriented payload.
    ///
    /// `fields` names the payload columns; declared columns missing from it are
    /// an error, extra payload columns are dropped.
    pub fn frame_from_rows(
        &self,
        fields: &[String],
        items: &[Vec<Value>],
    ) -> Result<DataFrame, SchemaError> {
        let mut columns = Vec::with_capacity(self.columns.len());

        for &(name, kind) in self.columns {
            let idx = match fields.iter().position(|f| f == name) {
                Some(idx) => idx,
                None if items.is_empty() => usize::MAX,
                None => return Err(SchemaError::MissingColumn(name.to_string())),
            };
            let cell = |row: &[Value]| row.get(idx).cloned().unwrap_or(Value::Null);

            let column = match kind {
                ColumnKind::Text => {
                    let values = items
                        .iter()
                        .map(|row| text_value(name, cell(row)))
                        .collect::<Result<Vec<Option<String>>, _>>()?;
                    Column::new(name.into(), values)
                }
                ColumnKind::Float => {
                    let values = items
                        .iter()
                        .map(|row| float_value(name, cell(row)))
                        .collect::<Result<Vec<Option<f64>>, _>>()?;
                    Column::new(name.into(), values)
                }
                ColumnKind::Int => {
                    let values = items
                        .iter()
                        .map(|row| int_value(name, cell(row)))
                        .collect::<Result<Vec<Option<i64>>, _>>()?;
                    Column::new(name.into(), values)
                }
            };
            columns.push(column);
        }

        DataFrame::new(columns).map_err(|e| SchemaError::Frame(e.to_string()))
    }

    /// Validate a DataFrame against the declared columns and types.
    pub fn validate(&self, df: &DataFrame) -> Result<(), SchemaError> {
        for &(name, kind) in self.columns {
            let column = df
                .column(name)
                .map_err(|_| SchemaError::MissingColumn(name.to_string()))?;
            if column.dtype() != &kind.dtype() {
                return Err(SchemaError::TypeMismatch {
                    column: name.to_string(),
                    expected: kind.dtype(),
                    actual: column.dtype().clone(),
                });
            }
        }
        Ok(())
    }
}

fn text_value(column: &str, value: Value) -> Result<Option<String>, SchemaError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(SchemaError::BadValue {
            column: column.to_string(),
            value: other.to_string(),
        }),
    }
}

fn float_value(column: &str, value: Value) -> Result<Option<f64>, SchemaError> {
    match &value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s.trim().parse::<f64>().map(Some).map_err(|_| SchemaError::BadValue {
            column: column.to_string(),
            value: value.to_string(),
        }),
        _ => Err(SchemaError::BadValue {
            column: column.to_string(),
            value: value.to_string(),
        }),
    }
}

fn int_value(column: &str, value: Value) -> Result<Option<i64>, SchemaError> {
    match &value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64))),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s.trim().parse::<i64>().map(Some).map_err(|_| SchemaError::BadValue {
            column: column.to_string(),
            value: value.to_string(),
        }),
        _ => Err(SchemaError::BadValue {
            column: column.to_string(),
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("Unexpected value {value} in column {column}")]
    BadValue { column: String, value: String },

    #[error("Frame construction failed: {0}")]
    Frame(String),
}
