//! Integration tests for incremental day-file import.

use ashare_core::data::{Archive, LengthWatermarks};
use ashare_core::pipeline::update_day_files;
use ashare_core::tdx::RawDayRecord;
use std::fs;
use std::path::{Path, PathBuf};

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn record(date: i32, close: i32) -> RawDayRecord {
    RawDayRecord {
        date,
        open: close - 5,
        high: close + 10,
        low: close - 10,
        close,
        amount: 1_000_000.0,
        vol: 10_000,
    }
}

fn day_bytes(dates: &[i32]) -> Vec<u8> {
    dates
        .iter()
        .flat_map(|&d| record(d, 1000).encode())
        .collect()
}

/// `{vipdoc}/{sh|sz}/lday/{stem}.day`
fn write_day_file(vipdoc: &Path, stem: &str, bytes: &[u8]) -> PathBuf {
    let dir = vipdoc.join(&stem[..2]).join("lday");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{stem}.day"));
    fs::write(&path, bytes).unwrap();
    path
}

fn stored_dates(archive: &Archive, table: &str) -> Vec<String> {
    archive
        .read(table)
        .unwrap()
        .column("trade_date")
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|d| d.unwrap().to_string())
        .collect()
}

struct Fixture {
    _dir: tempfile::TempDir,
    vipdoc: PathBuf,
    archive: Archive,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let vipdoc = dir.path().join("vipdoc");
    fs::create_dir_all(&vipdoc).unwrap();
    let archive = Archive::new(dir.path().join("t6"));
    Fixture {
        _dir: dir,
        vipdoc,
        archive,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[test]
fn new_files_are_imported_and_others_filtered() {
    let fx = fixture();
    write_day_file(&fx.vipdoc, "sh600000", &day_bytes(&[20070104, 20070105]));
    write_day_file(&fx.vipdoc, "sz300750", &day_bytes(&[20180611]));
    write_day_file(&fx.vipdoc, "sh000001", &day_bytes(&[20070104]));

    let report = update_day_files(&fx.vipdoc, &fx.archive).unwrap();
    assert_eq!(report.scanned, 3);
    assert_eq!(report.filtered, 1);
    assert_eq!(report.updated, 2);
    assert_eq!(report.rows, 3);
    assert!(report.all_succeeded());

    let df = fx.archive.read("sh600000").unwrap();
    assert_eq!(df.height(), 2);
    let codes = df.column("ts_code").unwrap().str().unwrap();
    assert_eq!(codes.get(0), Some("600000.SH"));
    let close = df.column("close").unwrap().f64().unwrap();
    assert_eq!(close.get(0), Some(10.0));

    assert!(!fx.archive.has_table("sh000001"));
    let marks = LengthWatermarks::load(&fx.archive).unwrap();
    assert_eq!(marks.get("sh600000.day"), Some(64));
    assert_eq!(marks.get("sz300750.day"), Some(32));
    assert_eq!(marks.get("sh000001.day"), None);
}

#[test]
fn grown_file_appends_only_new_records() {
    let fx = fixture();
    let path = write_day_file(&fx.vipdoc, "sz000001", &day_bytes(&[20200511, 20200512]));
    update_day_files(&fx.vipdoc, &fx.archive).unwrap();

    fs::write(&path, day_bytes(&[20200511, 20200512, 20200513])).unwrap();
    let report = update_day_files(&fx.vipdoc, &fx.archive).unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.rows, 1);
    assert_eq!(
        stored_dates(&fx.archive, "sz000001"),
        vec!["20200511", "20200512", "20200513"]
    );
    let marks = LengthWatermarks::load(&fx.archive).unwrap();
    assert_eq!(marks.get("sz000001.day"), Some(96));
}

#[test]
fn unchanged_file_is_skipped_as_halted() {
    let fx = fixture();
    write_day_file(&fx.vipdoc, "sz002415", &day_bytes(&[20200511]));
    update_day_files(&fx.vipdoc, &fx.archive).unwrap();
    let written = fx.archive.meta("sz002415").unwrap().written_at;

    let report = update_day_files(&fx.vipdoc, &fx.archive).unwrap();
    assert_eq!(report.halted, 1);
    assert_eq!(report.updated, 0);
    assert_eq!(fx.archive.meta("sz002415").unwrap().written_at, written);
    assert_eq!(stored_dates(&fx.archive, "sz002415").len(), 1);
}

#[test]
fn corrupted_file_is_reported_and_keeps_its_watermark() {
    let fx = fixture();
    let path = write_day_file(&fx.vipdoc, "sh601318", &day_bytes(&[20200511]));
    update_day_files(&fx.vipdoc, &fx.archive).unwrap();

    let mut bytes = day_bytes(&[20200511, 20200512]);
    bytes.extend_from_slice(&[0, 1, 2]);
    fs::write(&path, &bytes).unwrap();
    write_day_file(&fx.vipdoc, "sh603288", &day_bytes(&[20200512]));

    let report = update_day_files(&fx.vipdoc, &fx.archive).unwrap();
    assert_eq!(report.corrupted, vec![path]);
    assert!(report.failed.is_empty());
    assert_eq!(report.updated, 1);

    assert_eq!(stored_dates(&fx.archive, "sh601318"), vec!["20200511"]);
    let marks = LengthWatermarks::load(&fx.archive).unwrap();
    assert_eq!(marks.get("sh601318.day"), Some(32));
    assert_eq!(marks.get("sh603288.day"), Some(32));
}

#[test]
fn shrunk_file_rebuilds_the_table() {
    let fx = fixture();
    let path = write_day_file(&fx.vipdoc, "sh688001", &day_bytes(&[20200511, 20200512, 20200513]));
    update_day_files(&fx.vipdoc, &fx.archive).unwrap();

    fs::write(&path, day_bytes(&[20200601])).unwrap();
    let report = update_day_files(&fx.vipdoc, &fx.archive).unwrap();

    assert_eq!(report.resets, 1);
    assert_eq!(stored_dates(&fx.archive, "sh688001"), vec!["20200601"]);
    let marks = LengthWatermarks::load(&fx.archive).unwrap();
    assert_eq!(marks.get("sh688001.day"), Some(32));
}

#[test]
fn rerun_after_failed_watermark_save_imports_nothing_twice() {
    let fx = fixture();
    let path = write_day_file(&fx.vipdoc, "sh600000", &day_bytes(&[20070104, 20070105]));

    // A directory where the length table goes makes the final save fail
    // after the instrument table was already appended.
    let blocker = fx.archive.root().join("dayfileinfo.parquet");
    fs::create_dir_all(&blocker).unwrap();
    assert!(update_day_files(&fx.vipdoc, &fx.archive).is_err());
    assert_eq!(stored_dates(&fx.archive, "sh600000"), vec!["20070104", "20070105"]);

    fs::remove_dir(&blocker).unwrap();
    let report = update_day_files(&fx.vipdoc, &fx.archive).unwrap();
    assert_eq!(report.rows, 0);
    assert_eq!(stored_dates(&fx.archive, "sh600000"), vec!["20070104", "20070105"]);
    let marks = LengthWatermarks::load(&fx.archive).unwrap();
    assert_eq!(marks.get("sh600000.day"), Some(64));

    // Later growth still lands once.
    fs::write(&path, day_bytes(&[20070104, 20070105, 20070108])).unwrap();
    let report = update_day_files(&fx.vipdoc, &fx.archive).unwrap();
    assert_eq!(report.rows, 1);
    assert_eq!(
        stored_dates(&fx.archive, "sh600000"),
        vec!["20070104", "20070105", "20070108"]
    );
}

#[test]
fn missing_vipdoc_is_an_error() {
    let fx = fixture();
    assert!(update_day_files(&fx.vipdoc.join("absent"), &fx.archive).is_err());
}
