//! Incremental update pipelines.
//!
//! - [`limits`]: fetch limit statistics per trading day and append them
//! - [`dayfiles`]: decode the grown tail of every TDX day-file
//! - [`vol_price`]: import exported price-volume reports

pub mod dayfiles;
pub mod limits;
pub mod vol_price;

use crate::data::{ArchiveError, DataError, RetryError};
use crate::tdx::{DayFileError, VolPriceError};
use polars::prelude::PolarsError;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use dayfiles::{update_day_files, DayFileReport, FileAction};
pub use limits::{build_batch, pending_dates, update_limits, Batch, LimitsUpdate, Start, TableUpdate};
pub use vol_price::{import_reports, VolPriceImport, VOL_PRICE_TABLE};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetching {date}: {source}")]
    Fetch { date: String, source: DataError },

    #[error("retries exhausted for {date} after {attempts} attempts: {last}")]
    RetriesExhausted {
        date: String,
        attempts: u32,
        last: DataError,
    },

    #[error("trading calendar {range}: {source}")]
    Calendar { range: String, source: RetryError },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    DayFile(#[from] DayFileError),

    #[error(transparent)]
    VolPrice(#[from] VolPriceError),

    #[error("scanning {}: {source}", .path.display())]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("assembling batch: {0}")]
    Polars(#[from] PolarsError),
}

impl PipelineError {
    fn from_retry(date: &str, err: RetryError) -> Self {
        match err {
            RetryError::Exhausted { attempts, last } => PipelineError::RetriesExhausted {
                date: date.to_string(),
                attempts,
                last,
            },
            RetryError::Aborted(source) => PipelineError::Fetch {
                date: date.to_string(),
                source,
            },
        }
    }
}

/// Every file under `root` accepted by `keep`, recursively, sorted by path.
pub(crate) fn walk_files(root: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>, PipelineError> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let scan_err = |source| PipelineError::Scan {
            path: dir.clone(),
            source,
        };
        for entry in fs::read_dir(&dir).map_err(scan_err)? {
            let path = entry.map_err(scan_err)?.path();
            if path.is_dir() {
                stack.push(path);
            } else if keep(&path) {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_is_recursive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sh").join("lday");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("sh600001.day"), b"").unwrap();
        fs::write(dir.path().join("a.day"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let files = walk_files(dir.path(), |p| p.extension().is_some_and(|e| e == "day")).unwrap();
        assert_eq!(files, vec![dir.path().join("a.day"), sub.join("sh600001.day")]);
    }

    #[test]
    fn missing_root_is_a_scan_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = walk_files(&dir.path().join("absent"), |_| true).unwrap_err();
        assert!(matches!(err, PipelineError::Scan { .. }));
    }
}
