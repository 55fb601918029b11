//! Import of exported price-volume reports into the `vol_price` table.

use super::{walk_files, PipelineError};
use crate::data::{Archive, ArchiveError};
use crate::tdx::vol_price::{is_report_file, read_report};
use polars::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Archive table holding every imported report.
pub const VOL_PRICE_TABLE: &str = "vol_price";

/// Summary of an import run.
#[derive(Debug, Default)]
pub struct VolPriceImport {
    pub found: usize,
    pub imported: usize,
    /// Reports whose instrument and session were already archived.
    pub already_archived: usize,
    pub rows: usize,
    pub failed: Vec<(PathBuf, PipelineError)>,
}

type Layout = Vec<(String, DataType)>;

fn layout(df: &DataFrame) -> Layout {
    df.get_columns()
        .iter()
        .map(|c| (c.name().to_string(), c.dtype().clone()))
        .collect()
}

/// `(ts_code, trade_date)` pairs already in the table.
fn archived_sessions(df: &DataFrame) -> Result<HashSet<(String, String)>, PipelineError> {
    let codes = df.column("ts_code")?.str()?;
    let dates = df.column("trade_date")?.str()?;
    Ok(codes
        .into_iter()
        .zip(dates)
        .filter_map(|(c, d)| Some((c?.to_string(), d?.to_string())))
        .collect())
}

/// Parse every report under `export_dir` and append the new ones in one write.
pub fn import_reports(export_dir: &Path, archive: &Archive) -> Result<VolPriceImport, PipelineError> {
    let existing = archive.read_optional(VOL_PRICE_TABLE)?;
    let mut seen = match &existing {
        Some(df) => archived_sessions(df)?,
        None => HashSet::new(),
    };
    let mut expected: Option<Layout> = existing.as_ref().map(layout);

    let files = walk_files(export_dir, is_report_file)?;
    let mut report = VolPriceImport {
        found: files.len(),
        ..Default::default()
    };
    info!(root = %export_dir.display(), reports = files.len(), "scanning price-volume reports");

    let mut batch: Option<DataFrame> = None;
    for path in files {
        let parsed = match read_report(&path) {
            Ok(r) => r,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "unreadable report skipped");
                report.failed.push((path, e.into()));
                continue;
            }
        };

        let session = (parsed.ts_code.clone(), parsed.trade_date.as_str().to_string());
        if seen.contains(&session) {
            debug!(file = %path.display(), "already archived");
            report.already_archived += 1;
            continue;
        }

        let frame = match parsed.to_frame() {
            Ok(f) => f,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "report skipped");
                report.failed.push((path, e.into()));
                continue;
            }
        };
        let found = layout(&frame);
        if expected.as_ref().is_some_and(|want| *want != found) {
            warn!(file = %path.display(), "report columns differ from the archive, skipped");
            let err = ArchiveError::SchemaMismatch {
                table: VOL_PRICE_TABLE.to_string(),
                detail: path.display().to_string(),
            };
            report.failed.push((path, err.into()));
            continue;
        }
        if expected.is_none() {
            expected = Some(found);
        }

        report.rows += frame.height();
        report.imported += 1;
        seen.insert(session);
        match batch.as_mut() {
            None => batch = Some(frame),
            Some(acc) => {
                acc.vstack_mut(&frame)?;
            }
        }
    }

    if let Some(frame) = batch {
        let total = archive.append(VOL_PRICE_TABLE, &frame, "tdx export")?;
        info!(imported = report.imported, rows = report.rows, total, "price-volume reports appended");
    } else {
        info!("no new price-volume reports");
    }
    Ok(report)
}
