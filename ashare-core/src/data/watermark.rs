//! Persisted checkpoints for incremental updates.
//!
//! Both watermark kinds live as ordinary tables inside the archive they
//! describe, so a data table and its checkpoint move together.

use super::archive::{Archive, ArchiveError};
use crate::domain::TradeDate;
use polars::prelude::*;
use std::collections::BTreeMap;

/// Table holding the last persisted trade date per limit table.
pub const DATE_WATERMARK_TABLE: &str = "recordlastdate";

/// Table holding the parsed byte length per day-file.
pub const LENGTH_WATERMARK_TABLE: &str = "dayfileinfo";

/// Last persisted trade date, keyed by watermark key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateWatermarks {
    dates: BTreeMap<String, TradeDate>,
}

impl DateWatermarks {
    /// Load from the archive. A missing table means nothing was persisted yet.
    pub fn load(archive: &Archive) -> Result<Self, ArchiveError> {
        let Some(df) = archive.read_optional(DATE_WATERMARK_TABLE)? else {
            return Ok(Self::default());
        };

        let corrupt = |detail: String| ArchiveError::Corrupt {
            table: DATE_WATERMARK_TABLE.to_string(),
            detail,
        };
        let keys = df
            .column("key")
            .and_then(|c| c.str().cloned())
            .map_err(|e| corrupt(e.to_string()))?;
        let dates = df
            .column("last_date")
            .and_then(|c| c.str().cloned())
            .map_err(|e| corrupt(e.to_string()))?;

        let mut out = BTreeMap::new();
        for (key, date) in keys.into_iter().zip(dates.into_iter()) {
            let (Some(key), Some(date)) = (key, date) else {
                continue;
            };
            let date: TradeDate = date.parse().map_err(|e| corrupt(format!("{e}")))?;
            out.insert(key.to_string(), date);
        }
        Ok(Self { dates: out })
    }

    pub fn get(&self, key: &str) -> Option<&TradeDate> {
        self.dates.get(key)
    }

    /// Move a key forward to `date`. Returns false (and keeps the stored value)
    /// if `date` is not later than what is already stored.
    pub fn advance(&mut self, key: &str, date: TradeDate) -> bool {
        match self.dates.get(key) {
            Some(current) if *current >= date => false,
            _ => {
                self.dates.insert(key.to_string(), date);
                true
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TradeDate)> {
        self.dates.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Overwrite the watermark table with every key.
    pub fn save(&self, archive: &Archive) -> Result<(), ArchiveError> {
        let keys: Vec<&str> = self.dates.keys().map(|k| k.as_str()).collect();
        let dates: Vec<&str> = self.dates.values().map(|d| d.as_str()).collect();
        let df = DataFrame::new(vec![
            Column::new("key".into(), keys),
            Column::new("last_date".into(), dates),
        ])
        .map_err(|e| ArchiveError::Parquet(e.to_string()))?;
        archive.write(DATE_WATERMARK_TABLE, &df, "watermark")
    }
}

/// Parsed byte length, keyed by day-file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LengthWatermarks {
    lengths: BTreeMap<String, u64>,
}

impl LengthWatermarks {
    pub fn load(archive: &Archive) -> Result<Self, ArchiveError> {
        let Some(df) = archive.read_optional(LENGTH_WATERMARK_TABLE)? else {
            return Ok(Self::default());
        };

        let corrupt = |detail: String| ArchiveError::Corrupt {
            table: LENGTH_WATERMARK_TABLE.to_string(),
            detail,
        };
        let files = df
            .column("file")
            .and_then(|c| c.str().cloned())
            .map_err(|e| corrupt(e.to_string()))?;
        let lengths = df
            .column("length")
            .and_then(|c| c.u64().cloned())
            .map_err(|e| corrupt(e.to_string()))?;

        let lengths = files
            .into_iter()
            .zip(lengths.into_iter())
            .filter_map(|(file, len)| Some((file?.to_string(), len?)))
            .collect();
        Ok(Self { lengths })
    }

    pub fn get(&self, file: &str) -> Option<u64> {
        self.lengths.get(file).copied()
    }

    pub fn set(&mut self, file: &str, length: u64) {
        self.lengths.insert(file.to_string(), length);
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.lengths.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Overwrite the watermark table with the complete map.
    pub fn save(&self, archive: &Archive) -> Result<(), ArchiveError> {
        let files: Vec<&str> = self.lengths.keys().map(|k| k.as_str()).collect();
        let lengths: Vec<u64> = self.lengths.values().copied().collect();
        let df = DataFrame::new(vec![
            Column::new("file".into(), files),
            Column::new("length".into(), lengths),
        ])
        .map_err(|e| ArchiveError::Parquet(e.to_string()))?;
        archive.write(LENGTH_WATERMARK_TABLE, &df, "watermark")
    }
}
