//! TDX price-volume (分价表) text reports.
//!
//! A report is a GBK text file exported from the terminal:
//!
//! ```text
//! 2020-06-05 平安银行 (000001)
//! 价格   成交   笔数   竞买率
//! 12.91  1520   40     55.2%
//! 12.92  3310   81     61.0%
//! 数据来源:通达信
//! ```
//!
//! The first line names the session and instrument, the second is the column
//! header, and the last line is a footer. Every table cell is numeric.

use crate::domain::{TradeDate, TradeDateError};
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Marker in the file stem of an exported price-volume report.
pub const REPORT_MARKER: &str = "分价";

/// Column holding the price level.
pub const PRICE_COLUMN: &str = "价格";

/// Column holding the traded volume at a price level.
pub const VOLUME_COLUMN: &str = "成交";

/// Price levels kept per session by [`summarize`].
pub const TOP_LEVELS_PER_SESSION: usize = 5;

#[derive(Debug, Error)]
pub enum VolPriceError {
    #[error("read report {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("report has no title line")]
    MissingTitle,

    #[error("malformed title line '{0}': expected 'date name (code)'")]
    BadTitle(String),

    #[error(transparent)]
    BadDate(#[from] TradeDateError),

    #[error("report has no header line")]
    MissingHeader,

    #[error("column '{0}' missing from price-volume table")]
    MissingColumn(&'static str),

    #[error("price-volume frame: {0}")]
    Frame(#[from] PolarsError),
}

/// One parsed report: a single instrument's histogram for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct VolPriceReport {
    /// Code as printed in the title, brackets removed.
    pub ts_code: String,
    pub name: String,
    pub trade_date: TradeDate,
    pub columns: Vec<String>,
    /// One entry per price level; cells that are not numbers are `None`.
    pub rows: Vec<Vec<Option<f64>>>,
}

/// Whether `path` looks like an exported price-volume report.
pub fn is_report_file(path: &Path) -> bool {
    let is_txt = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("txt"));
    let marked = path
        .file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.contains(REPORT_MARKER));
    is_txt && marked
}

/// Decode report bytes. GB2312 is a subset of GBK, so GBK covers both.
pub fn decode_gbk(bytes: &[u8]) -> String {
    let (text, _, _) = encoding_rs::GBK.decode(bytes);
    text.into_owned()
}

pub fn read_report(path: &Path) -> Result<VolPriceReport, VolPriceError> {
    let bytes = fs::read(path).map_err(|source| VolPriceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_report(&decode_gbk(&bytes))
}

fn parse_cell(cell: &str) -> Option<f64> {
    cell.trim_end_matches('%').parse().ok()
}

pub fn parse_report(text: &str) -> Result<VolPriceReport, VolPriceError> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    let title = lines.next().ok_or(VolPriceError::MissingTitle)?;
    let parts: Vec<&str> = title.split_whitespace().collect();
    let [date, name, code, ..] = parts.as_slice() else {
        return Err(VolPriceError::BadTitle(title.to_string()));
    };
    let trade_date = TradeDate::parse_loose(date)?;
    let ts_code = code
        .trim_matches(|c| matches!(c, '(' | ')' | '（' | '）'))
        .to_string();
    if ts_code.is_empty() {
        return Err(VolPriceError::BadTitle(title.to_string()));
    }

    let columns: Vec<String> = lines
        .next()
        .ok_or(VolPriceError::MissingHeader)?
        .split_whitespace()
        .map(str::to_string)
        .collect();

    let mut body: Vec<&str> = lines.collect();
    // Footer
    body.pop();

    let rows = body
        .iter()
        .map(|line| {
            let mut cells: Vec<Option<f64>> = line.split_whitespace().map(parse_cell).collect();
            cells.resize(columns.len(), None);
            cells
        })
        .collect();

    Ok(VolPriceReport {
        ts_code,
        name: name.to_string(),
        trade_date,
        columns,
        rows,
    })
}

impl VolPriceReport {
    /// Report columns as `Float64`, followed by `ts_code`, `name`, `trade_date`.
    pub fn to_frame(&self) -> Result<DataFrame, VolPriceError> {
        let n = self.rows.len();
        let mut cols: Vec<Column> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let values: Vec<Option<f64>> = self.rows.iter().map(|r| r[i]).collect();
                Column::new(name.as_str().into(), values)
            })
            .collect();
        cols.push(Column::new("ts_code".into(), vec![self.ts_code.as_str(); n]));
        cols.push(Column::new("name".into(), vec![self.name.as_str(); n]));
        cols.push(Column::new("trade_date".into(), vec![self.trade_date.as_str(); n]));
        Ok(DataFrame::new(cols)?)
    }
}

/// One price level of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceLevel {
    pub trade_date: String,
    pub price: f64,
    pub volume: f64,
}

/// Summary of one instrument across every archived session.
#[derive(Debug, Clone, PartialEq)]
pub struct VolPriceSummary {
    pub ts_code: String,
    /// Heaviest levels per session, by date, lightest first within a session.
    pub sessions: Vec<PriceLevel>,
    /// Volume of those levels summed per price, lightest first.
    pub totals: Vec<(f64, f64)>,
}

/// Summarize the archived `vol_price` table, optionally for one instrument.
pub fn summarize(df: &DataFrame, code: Option<&str>) -> Result<Vec<VolPriceSummary>, VolPriceError> {
    let column = |name: &'static str| df.column(name).map_err(|_| VolPriceError::MissingColumn(name));
    let codes = column("ts_code")?.str()?;
    let dates = column("trade_date")?.str()?;
    let prices = column(PRICE_COLUMN)?.f64()?;
    let volumes = column(VOLUME_COLUMN)?.f64()?;

    // ts_code -> trade_date -> levels
    let mut grouped: BTreeMap<&str, BTreeMap<&str, Vec<PriceLevel>>> = BTreeMap::new();
    for i in 0..df.height() {
        let (Some(ts_code), Some(date), Some(price), Some(volume)) =
            (codes.get(i), dates.get(i), prices.get(i), volumes.get(i))
        else {
            continue;
        };
        if code.is_some_and(|c| c != ts_code) {
            continue;
        }
        grouped
            .entry(ts_code)
            .or_default()
            .entry(date)
            .or_default()
            .push(PriceLevel {
                trade_date: date.to_string(),
                price,
                volume,
            });
    }

    let summaries = grouped
        .into_iter()
        .map(|(ts_code, by_date)| {
            let mut sessions = Vec::new();
            for (_, mut levels) in by_date {
                levels.sort_by(|a, b| a.volume.total_cmp(&b.volume));
                let skip = levels.len().saturating_sub(TOP_LEVELS_PER_SESSION);
                sessions.extend(levels.into_iter().skip(skip));
            }

            // Prices come from fixed-precision reports; key on thousandths.
            let mut by_price: HashMap<i64, (f64, f64)> = HashMap::new();
            for level in &sessions {
                let key = (level.price * 1000.0).round() as i64;
                let entry = by_price.entry(key).or_insert((level.price, 0.0));
                entry.1 += level.volume;
            }
            let mut totals: Vec<(f64, f64)> = by_price.into_values().collect();
            totals.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.total_cmp(&b.0)));

            VolPriceSummary {
                ts_code: ts_code.to_string(),
                sessions,
                totals,
            }
        })
        .collect();
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "2020-06-05 平安银行 (000001)\n\
        价格   成交   笔数   竞买率\n\
        12.91  1520   40     55.2%\n\
        12.92  3310   81     61.0%\n\
        12.93  --     3      50.0%\n\
        数据来源:通达信\n";

    #[test]
    fn parses_title_header_and_rows() {
        let report = parse_report(REPORT).unwrap();
        assert_eq!(report.ts_code, "000001");
        assert_eq!(report.name, "平安银行");
        assert_eq!(report.trade_date.as_str(), "20200605");
        assert_eq!(report.columns, vec!["价格", "成交", "笔数", "竞买率"]);
        assert_eq!(report.rows.len(), 3);
        assert_eq!(report.rows[0], vec![Some(12.91), Some(1520.0), Some(40.0), Some(55.2)]);
        assert_eq!(report.rows[2][1], None);
    }

    #[test]
    fn decodes_gbk_bytes() {
        let (bytes, _, _) = encoding_rs::GBK.encode(REPORT);
        let report = parse_report(&decode_gbk(&bytes)).unwrap();
        assert_eq!(report.name, "平安银行");
    }

    #[test]
    fn short_rows_are_padded() {
        let text = "20200605 X (600000)\n价格 成交 笔数\n10.00 5\nfooter\n";
        let report = parse_report(text).unwrap();
        assert_eq!(report.rows, vec![vec![Some(10.0), Some(5.0), None]]);
    }

    #[test]
    fn bad_titles_are_rejected() {
        assert!(matches!(parse_report(""), Err(VolPriceError::MissingTitle)));
        assert!(matches!(parse_report("2020-06-05 only\n"), Err(VolPriceError::BadTitle(_))));
        assert!(matches!(
            parse_report("yesterday X (1)\nh\n"),
            Err(VolPriceError::BadDate(_))
        ));
        assert!(matches!(
            parse_report("2020-06-05 X (000001)\n"),
            Err(VolPriceError::MissingHeader)
        ));
    }

    #[test]
    fn frame_appends_identity_columns() {
        let df = parse_report(REPORT).unwrap().to_frame().unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 7);
        assert_eq!(df.column(VOLUME_COLUMN).unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("trade_date").unwrap().str().unwrap().get(0), Some("20200605"));
    }

    #[test]
    fn recognizes_report_files() {
        assert!(is_report_file(Path::new("/x/000001分价表.txt")));
        assert!(is_report_file(Path::new("分价.TXT")));
        assert!(!is_report_file(Path::new("/x/000001.txt")));
        assert!(!is_report_file(Path::new("/x/分价.csv")));
    }

    fn session(date: &str, levels: &[(f64, f64)]) -> DataFrame {
        let n = levels.len();
        DataFrame::new(vec![
            Column::new(PRICE_COLUMN.into(), levels.iter().map(|l| l.0).collect::<Vec<_>>()),
            Column::new(VOLUME_COLUMN.into(), levels.iter().map(|l| l.1).collect::<Vec<_>>()),
            Column::new("ts_code".into(), vec!["000001"; n]),
            Column::new("name".into(), vec!["平安银行"; n]),
            Column::new("trade_date".into(), vec![date; n]),
        ])
        .unwrap()
    }

    #[test]
    fn summary_keeps_top_levels_and_sums_by_price() {
        let mut df = session(
            "20200605",
            &[(10.0, 1.0), (10.1, 60.0), (10.2, 50.0), (10.3, 40.0), (10.4, 30.0), (10.5, 20.0)],
        );
        df.vstack_mut(&session("20200604", &[(10.1, 5.0), (9.9, 100.0)])).unwrap();

        let summary = summarize(&df, None).unwrap();
        assert_eq!(summary.len(), 1);
        let s = &summary[0];

        // Earlier session first; the 1.0 level falls outside the top five.
        assert_eq!(s.sessions.len(), 7);
        assert_eq!(s.sessions[0].trade_date, "20200604");
        assert!(s.sessions.iter().all(|l| l.volume > 1.0));

        assert_eq!(s.totals.first(), Some(&(10.5, 20.0)));
        assert_eq!(s.totals.last(), Some(&(9.9, 100.0)));
        assert!(s.totals.contains(&(10.1, 65.0)));
    }

    #[test]
    fn summary_filters_by_code() {
        let df = session("20200605", &[(10.0, 1.0)]);
        assert!(summarize(&df, Some("600000")).unwrap().is_empty());
        assert_eq!(summarize(&df, Some("000001")).unwrap().len(), 1);
    }
}
