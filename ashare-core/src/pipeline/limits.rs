//! Fetch-append orchestrator for the limit statistics tables.
//!
//! One run:
//! 1. load the date watermarks, catching up to rows already archived
//! 2. ask the trading calendar for open days up to `end`
//! 3. per table, fetch every pending day (retrying transient failures)
//! 4. append each non-empty batch, then write the watermarks once

use super::PipelineError;
use crate::data::{Archive, DataError, DataProvider, DateWatermarks, LimitTable, RetryPolicy, TradeCalendar};
use crate::domain::TradeDate;
use polars::prelude::DataFrame;
use tracing::{debug, info, warn};

/// Where a table's pending range begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Start {
    /// Strictly after the stored watermark.
    After(TradeDate),
    /// From the table's first available date, inclusive.
    From(TradeDate),
}

impl Start {
    pub fn for_table(marks: &DateWatermarks, table: LimitTable) -> Self {
        match marks.get(table.watermark_key()) {
            Some(date) => Start::After(date.clone()),
            None => Start::From(table.history_start()),
        }
    }

    fn admits(&self, date: &TradeDate) -> bool {
        match self {
            Start::After(mark) => date > mark,
            Start::From(first) => date >= first,
        }
    }

    fn bound(&self) -> &TradeDate {
        match self {
            Start::After(d) | Start::From(d) => d,
        }
    }
}

/// Open days from `calendar` that fall after `start` and on or before `end`,
/// in calendar order.
pub fn pending_dates(calendar: &[TradeDate], start: &Start, end: &TradeDate) -> Vec<TradeDate> {
    calendar
        .iter()
        .filter(|d| start.admits(d) && *d <= end)
        .cloned()
        .collect()
}

/// Rows fetched for a sequence of dates.
#[derive(Debug)]
pub struct Batch {
    /// Per-date results stacked in date order. Zero rows if nothing was published.
    pub frame: DataFrame,
    /// Last date that yielded rows.
    pub last_date: Option<TradeDate>,
    pub dates_with_data: usize,
}

/// Query every date in order, retrying each under `policy`, and stack the
/// non-empty results.
pub fn build_batch<F>(dates: &[TradeDate], policy: &RetryPolicy, label: &str, mut query: F) -> Result<Batch, PipelineError>
where
    F: FnMut(&TradeDate) -> Result<DataFrame, DataError>,
{
    let mut frame: Option<DataFrame> = None;
    let mut last_date = None;
    let mut dates_with_data = 0;

    for date in dates {
        let df = policy
            .run(label, || query(date))
            .map_err(|e| PipelineError::from_retry(date.as_str(), e))?;
        debug!(%label, date = %date, rows = df.height(), "fetched");

        if df.height() == 0 {
            continue;
        }
        match frame.as_mut() {
            None => frame = Some(df),
            Some(acc) => {
                acc.vstack_mut(&df)?;
            }
        }
        last_date = Some(date.clone());
        dates_with_data += 1;
    }

    Ok(Batch {
        frame: frame.unwrap_or_else(DataFrame::empty),
        last_date,
        dates_with_data,
    })
}

/// Outcome for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableUpdate {
    pub table: LimitTable,
    pub pending: usize,
    pub dates_with_data: usize,
    pub rows_appended: usize,
    /// Watermark after the run.
    pub watermark: Option<TradeDate>,
}

/// Outcome of [`update_limits`].
#[derive(Debug, Clone, PartialEq)]
pub struct LimitsUpdate {
    pub tables: Vec<TableUpdate>,
    pub watermark_written: bool,
}

impl LimitsUpdate {
    pub fn rows_appended(&self) -> usize {
        self.tables.iter().map(|t| t.rows_appended).sum()
    }

    /// True if no table had a pending date.
    pub fn up_to_date(&self) -> bool {
        self.tables.iter().all(|t| t.pending == 0)
    }
}

/// Bring every table in `tables` up to `end`.
///
/// Nothing is written until every batch has been fetched, so a failure part
/// way leaves the archive as it was.
pub fn update_limits<P>(
    provider: &P,
    archive: &Archive,
    tables: &[LimitTable],
    end: &TradeDate,
    exchange: &str,
    policy: &RetryPolicy,
) -> Result<LimitsUpdate, PipelineError>
where
    P: DataProvider + TradeCalendar + ?Sized,
{
    let mut marks = DateWatermarks::load(archive)?;
    let mut advanced = false;
    // A run that failed between appending and saving the watermarks left rows
    // past the stored date. Resume after them.
    for &table in tables {
        let Some(last) = archive
            .max_str(table.table_name(), "trade_date")?
            .and_then(|s| s.parse::<TradeDate>().ok())
        else {
            continue;
        };
        if marks.advance(table.watermark_key(), last.clone()) {
            warn!(table = table.table_name(), last_date = %last, "watermark behind archived rows, catching up");
            advanced = true;
        }
    }

    let starts: Vec<(LimitTable, Start)> = tables
        .iter()
        .map(|&t| (t, Start::for_table(&marks, t)))
        .collect();

    let calendar = match starts.iter().map(|(_, s)| s.bound()).min() {
        Some(from) if from <= end => {
            let range = format!("{from}..{end}");
            policy
                .run(&format!("trade_cal {range}"), || provider.open_days(exchange, from, end))
                .map_err(|source| PipelineError::Calendar { range, source })?
        }
        _ => Vec::new(),
    };

    let mut batches = Vec::with_capacity(starts.len());
    for (table, start) in &starts {
        let dates = pending_dates(&calendar, start, end);
        if dates.is_empty() {
            info!(table = table.table_name(), "no update needed");
        } else {
            info!(
                table = table.table_name(),
                from = %dates[0],
                to = %dates[dates.len() - 1],
                days = dates.len(),
                "fetching"
            );
        }
        let batch = build_batch(&dates, policy, table.api_name(), |date| {
            provider.fetch_limits(*table, date)
        })?;
        batches.push((*table, dates.len(), batch));
    }

    let mut updates = Vec::with_capacity(batches.len());
    for (table, pending, batch) in batches {
        let rows = batch.frame.height();
        if let Some(last) = &batch.last_date {
            let total = archive.append(table.table_name(), &batch.frame, provider.name())?;
            info!(table = table.table_name(), rows, total, last_date = %last, "appended");
            advanced |= marks.advance(table.watermark_key(), last.clone());
        }
        updates.push(TableUpdate {
            table,
            pending,
            dates_with_data: batch.dates_with_data,
            rows_appended: rows,
            watermark: marks.get(table.watermark_key()).cloned(),
        });
    }

    if advanced {
        marks.save(archive)?;
    }
    Ok(LimitsUpdate {
        tables: updates,
        watermark_written: advanced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn date(s: &str) -> TradeDate {
        s.parse().unwrap()
    }

    fn dates(list: &[&str]) -> Vec<TradeDate> {
        list.iter().map(|s| date(s)).collect()
    }

    fn rows(d: &TradeDate, n: usize) -> DataFrame {
        DataFrame::new(vec![
            Column::new("trade_date".into(), vec![d.as_str(); n]),
            Column::new("v".into(), vec![1.0; n]),
        ])
        .unwrap()
    }

    #[test]
    fn pending_dates_respect_bounds() {
        let cal = dates(&["20200511", "20200512", "20200513", "20200514"]);
        let end = date("20200513");

        let after = pending_dates(&cal, &Start::After(date("20200511")), &end);
        assert_eq!(after, dates(&["20200512", "20200513"]));

        let from = pending_dates(&cal, &Start::From(date("20200511")), &end);
        assert_eq!(from, dates(&["20200511", "20200512", "20200513"]));

        assert!(pending_dates(&cal, &Start::After(date("20200514")), &end).is_empty());
    }

    #[test]
    fn batch_skips_empty_dates() {
        let days = dates(&["20200511", "20200512", "20200513"]);
        let batch = build_batch(&days, &RetryPolicy::immediate(1), "t", |d| {
            Ok(if d.as_str() == "20200513" { rows(d, 0) } else { rows(d, 2) })
        })
        .unwrap();

        assert_eq!(batch.frame.height(), 4);
        assert_eq!(batch.dates_with_data, 2);
        assert_eq!(batch.last_date, Some(date("20200512")));
    }

    #[test]
    fn batch_of_nothing_is_empty() {
        let batch = build_batch(&[], &RetryPolicy::immediate(1), "t", |d| Ok(rows(d, 1))).unwrap();
        assert_eq!(batch.frame.height(), 0);
        assert_eq!(batch.last_date, None);
    }

    #[test]
    fn exhausted_retries_name_the_date() {
        let days = dates(&["20200511"]);
        let err = build_batch(&days, &RetryPolicy::immediate(2), "t", |_| {
            Err(DataError::RateLimited("slow down".into()))
        })
        .unwrap_err();
        match err {
            PipelineError::RetriesExhausted { date, attempts, .. } => {
                assert_eq!(date, "20200511");
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn fatal_errors_are_not_retried() {
        let days = dates(&["20200511"]);
        let mut calls = 0;
        let err = build_batch(&days, &RetryPolicy::immediate(5), "t", |_| {
            calls += 1;
            Err(DataError::AuthenticationRequired("bad token".into()))
        })
        .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, PipelineError::Fetch { .. }));
    }
}
