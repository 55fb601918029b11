//! Incremental import of TDX day-files.
//!
//! Each `.day` file only ever grows by whole records, so the byte length
//! already parsed is enough to resume: the next run decodes from that offset.

use super::{walk_files, PipelineError};
use crate::data::{Archive, LengthWatermarks};
use crate::tdx::{bars_to_frame, read_day_range, DayFileError, Instrument};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What to do with one file given its stored and current length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    /// Not seen before: decode everything and append.
    New,
    /// Grew since last run: decode from `offset` and append.
    Grown { offset: u64 },
    /// Unchanged, the instrument did not trade.
    Halted,
    /// Shorter than last run: decode everything and replace the table.
    Shrunk,
}

impl FileAction {
    pub fn decide(previous: Option<u64>, current: u64) -> Self {
        match previous {
            None => FileAction::New,
            Some(prev) if current > prev => FileAction::Grown { offset: prev },
            Some(prev) if current == prev => FileAction::Halted,
            Some(_) => FileAction::Shrunk,
        }
    }
}

/// Summary of a day-file run.
#[derive(Debug, Default)]
pub struct DayFileReport {
    /// `.day` files found under the root.
    pub scanned: usize,
    /// Files that are not A-share stocks.
    pub filtered: usize,
    pub halted: usize,
    /// Files whose new records were stored.
    pub updated: usize,
    pub rows: usize,
    pub resets: usize,
    pub corrupted: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, PipelineError)>,
}

impl DayFileReport {
    pub fn all_succeeded(&self) -> bool {
        self.corrupted.is_empty() && self.failed.is_empty()
    }
}

fn is_day_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("day"))
}

/// Decode the new part of every A-share day-file under `vipdoc` into `archive`.
///
/// Corrupted files and per-file failures are recorded in the report and keep
/// their previous length, so they are retried on the next run.
pub fn update_day_files(vipdoc: &Path, archive: &Archive) -> Result<DayFileReport, PipelineError> {
    let previous = LengthWatermarks::load(archive)?;
    let mut lengths = previous.clone();
    let mut report = DayFileReport::default();

    let files = walk_files(vipdoc, is_day_file)?;
    report.scanned = files.len();
    info!(root = %vipdoc.display(), files = files.len(), known = previous.len(), "scanning day-files");

    for path in files {
        let Some(instrument) = Instrument::from_path(&path) else {
            report.filtered += 1;
            continue;
        };
        let Some(key) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            report.filtered += 1;
            continue;
        };

        let current = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(source) => {
                warn!(file = %path.display(), error = %source, "cannot stat day-file");
                let err = DayFileError::Io {
                    path: path.clone(),
                    source,
                };
                report.failed.push((path, err.into()));
                continue;
            }
        };

        let action = FileAction::decide(previous.get(&key), current);
        if action == FileAction::Halted {
            report.halted += 1;
            continue;
        }

        match import_file(&path, &instrument, action, current, archive) {
            Ok(rows) => {
                lengths.set(&key, current);
                report.updated += 1;
                report.rows += rows;
                if action == FileAction::Shrunk {
                    report.resets += 1;
                }
            }
            Err(PipelineError::DayFile(DayFileError::Corrupted { len, .. })) => {
                warn!(file = %path.display(), len, "corrupted day-file skipped");
                report.corrupted.push(path);
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "day-file import failed");
                report.failed.push((path, e));
            }
        }
    }

    if lengths != previous {
        lengths.save(archive)?;
    }
    info!(
        updated = report.updated,
        rows = report.rows,
        halted = report.halted,
        resets = report.resets,
        corrupted = report.corrupted.len(),
        failed = report.failed.len(),
        "day-files done"
    );
    Ok(report)
}

/// Decode `path` up to `len` bytes and store the bars of `instrument`.
///
/// Appends skip bars already archived, so a run interrupted before the length
/// watermarks were saved does not import them twice.
fn import_file(
    path: &Path,
    instrument: &Instrument,
    action: FileAction,
    len: u64,
    archive: &Archive,
) -> Result<usize, PipelineError> {
    let offset = match action {
        FileAction::Grown { offset } => offset,
        _ => 0,
    };
    let mut bars = read_day_range(path, offset, len)?;
    let ts_code = instrument.ts_code();
    let table = instrument.table_name();
    let source = path.display().to_string();

    if action == FileAction::Shrunk {
        warn!(file = %path.display(), table = %table, "day-file shrank, rebuilding table");
        archive.write(&table, &bars_to_frame(&ts_code, &bars)?, &source)?;
        return Ok(bars.len());
    }

    if let Some(last) = archive.max_str(&table, "trade_date")? {
        let decoded = bars.len();
        bars.retain(|b| b.trade_date > last);
        if bars.len() < decoded {
            debug!(table = %table, skipped = decoded - bars.len(), last = %last, "bars already archived");
        }
    }
    archive.append(&table, &bars_to_frame(&ts_code, &bars)?, &source)?;
    Ok(bars.len())
}
