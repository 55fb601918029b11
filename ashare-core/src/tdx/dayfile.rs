//! TDX `.day` file decoder.
//!
//! A day-file holds one instrument's daily bars as back-to-back 32-byte
//! little-endian records:
//!
//! | bytes  | field                         |
//! |--------|-------------------------------|
//! | 0..4   | trade date, i32 `YYYYMMDD`    |
//! | 4..8   | open × 100, i32               |
//! | 8..12  | high × 100, i32               |
//! | 12..16 | low × 100, i32                |
//! | 16..20 | close × 100, i32              |
//! | 20..24 | amount in yuan, f32           |
//! | 24..28 | volume in shares, i32         |
//! | 28..32 | reserved                      |
//!
//! Decoded bars are normalized to Tushare `daily` units: prices in yuan,
//! amount in thousands of yuan, volume in lots of 100 shares.

use crate::data::schema::DAY_BAR_SCHEMA;
use polars::prelude::*;
use std::fmt;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Size of one day record in bytes.
pub const RECORD_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum DayFileError {
    #[error("corrupted day-file {}: length {len} is not a multiple of 32", .path.display())]
    Corrupted { path: PathBuf, len: u64 },

    #[error("offset {offset} is not a record boundary within {} (length {len})", .path.display())]
    BadOffset { path: PathBuf, offset: u64, len: u64 },

    #[error("record buffer of {0} bytes is not a whole number of records")]
    PartialRecord(usize),

    #[error("day-file I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("building frame for {ts_code}: {detail}")]
    Frame { ts_code: String, detail: String },
}

/// One record exactly as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDayRecord {
    pub date: i32,
    pub open: i32,
    pub high: i32,
    pub low: i32,
    pub close: i32,
    pub amount: f32,
    pub vol: i32,
}

/// A normalized daily bar.
#[derive(Debug, Clone, PartialEq)]
pub struct DayBar {
    pub trade_date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub amount: f64,
    pub vol: f64,
}

impl RawDayRecord {
    /// Decode one 32-byte record.
    pub fn decode(buf: &[u8; RECORD_SIZE]) -> Self {
        let word = |i: usize| [buf[i], buf[i + 1], buf[i + 2], buf[i + 3]];
        Self {
            date: i32::from_le_bytes(word(0)),
            open: i32::from_le_bytes(word(4)),
            high: i32::from_le_bytes(word(8)),
            low: i32::from_le_bytes(word(12)),
            close: i32::from_le_bytes(word(16)),
            amount: f32::from_le_bytes(word(20)),
            vol: i32::from_le_bytes(word(24)),
        }
    }

    /// Encode into the on-disk layout, reserved bytes zeroed.
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.date.to_le_bytes());
        buf[4..8].copy_from_slice(&self.open.to_le_bytes());
        buf[8..12].copy_from_slice(&self.high.to_le_bytes());
        buf[12..16].copy_from_slice(&self.low.to_le_bytes());
        buf[16..20].copy_from_slice(&self.close.to_le_bytes());
        buf[20..24].copy_from_slice(&self.amount.to_le_bytes());
        buf[24..28].copy_from_slice(&self.vol.to_le_bytes());
        buf
    }

    pub fn normalize(&self) -> DayBar {
        DayBar {
            trade_date: self.date.to_string(),
            open: self.open as f64 / 100.0,
            high: self.high as f64 / 100.0,
            low: self.low as f64 / 100.0,
            close: self.close as f64 / 100.0,
            amount: self.amount as f64 / 1000.0,
            vol: self.vol as f64 / 100.0,
        }
    }
}

/// Decode a buffer of whole records.
pub fn decode_records(bytes: &[u8]) -> Result<Vec<DayBar>, DayFileError> {
    if bytes.len() % RECORD_SIZE != 0 {
        return Err(DayFileError::PartialRecord(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(RECORD_SIZE)
        .map(|chunk| {
            let mut rec = [0u8; RECORD_SIZE];
            rec.copy_from_slice(chunk);
            RawDayRecord::decode(&rec).normalize()
        })
        .collect())
}

/// Read and decode a day-file from `offset` to the end.
///
/// The whole file is rejected if its length is not a multiple of the record
/// size, even when the tail after `offset` would decode.
pub fn read_day_file(path: &Path, offset: u64) -> Result<Vec<DayBar>, DayFileError> {
    let len = fs::metadata(path)
        .map_err(|source| DayFileError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    read_day_range(path, offset, len)
}

/// Decode the records between `offset` and `len`, where `len` is the file
/// length the caller observed. Bytes appended after that are left for the
/// next read.
pub fn read_day_range(path: &Path, offset: u64, len: u64) -> Result<Vec<DayBar>, DayFileError> {
    let io_err = |source| DayFileError::Io {
        path: path.to_path_buf(),
        source,
    };

    if len % RECORD_SIZE as u64 != 0 {
        return Err(DayFileError::Corrupted {
            path: path.to_path_buf(),
            len,
        });
    }
    if offset % RECORD_SIZE as u64 != 0 || offset > len {
        return Err(DayFileError::BadOffset {
            path: path.to_path_buf(),
            offset,
            len,
        });
    }

    let mut file = fs::File::open(path).map_err(io_err)?;
    file.seek(SeekFrom::Start(offset)).map_err(io_err)?;
    let mut bytes = Vec::with_capacity((len - offset) as usize);
    file.take(len - offset).read_to_end(&mut bytes).map_err(io_err)?;
    decode_records(&bytes)
}

/// Exchange of a listed instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exchange {
    Sh,
    Sz,
}

/// Listing board, derived from the code prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Board {
    /// SH 600/601/603, SZ 000.
    Main,
    /// SZ 002.
    SmallMedium,
    /// SZ 300.
    ChiNext,
    /// SH 688.
    Star,
}

impl Exchange {
    pub fn prefix(self) -> &'static str {
        match self {
            Exchange::Sh => "sh",
            Exchange::Sz => "sz",
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Exchange::Sh => "SH",
            Exchange::Sz => "SZ",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// An A-share instrument identified from a day-file name such as `sh600000.day`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instrument {
    pub exchange: Exchange,
    pub board: Board,
    /// Six-digit numeric code.
    pub code: String,
}

impl Instrument {
    /// Recognize an A-share stem; indexes, funds and bonds yield `None`.
    ///
    /// Accepted: `sh600`, `sh601`, `sh603`, `sh688`, `sz000`, `sz002`, `sz300`
    /// followed by three digits, case-insensitive.
    pub fn from_stem(stem: &str) -> Option<Self> {
        if stem.len() != 8 || !stem.is_ascii() {
            return None;
        }
        let (prefix, code) = stem.split_at(2);
        if !code.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let exchange = match prefix.to_ascii_lowercase().as_str() {
            "sh" => Exchange::Sh,
            "sz" => Exchange::Sz,
            _ => return None,
        };
        let board = match (exchange, &code[..3]) {
            (Exchange::Sh, "600" | "601" | "603") => Board::Main,
            (Exchange::Sh, "688") => Board::Star,
            (Exchange::Sz, "000") => Board::Main,
            (Exchange::Sz, "002") => Board::SmallMedium,
            (Exchange::Sz, "300") => Board::ChiNext,
            _ => return None,
        };

        Some(Self {
            exchange,
            board,
            code: code.to_string(),
        })
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_stem().and_then(|s| s.to_str()).and_then(Self::from_stem)
    }

    /// Tushare code, e.g. `600000.SH`.
    pub fn ts_code(&self) -> String {
        format!("{}.{}", self.code, self.exchange.suffix())
    }

    /// Archive table name, e.g. `sh600000`.
    pub fn table_name(&self) -> String {
        format!("{}{}", self.exchange.prefix(), self.code)
    }
}

/// Build a frame in [`DAY_BAR_SCHEMA`] column order.
pub fn bars_to_frame(ts_code: &str, bars: &[DayBar]) -> Result<DataFrame, DayFileError> {
    let n = bars.len();
    let frame_err = |e: PolarsError| DayFileError::Frame {
        ts_code: ts_code.to_string(),
        detail: e.to_string(),
    };

    let df = DataFrame::new(vec![
        Column::new("ts_code".into(), vec![ts_code; n]),
        Column::new(
            "trade_date".into(),
            bars.iter().map(|b| b.trade_date.as_str()).collect::<Vec<_>>(),
        ),
        Column::new("open".into(), bars.iter().map(|b| b.open).collect::<Vec<_>>()),
        Column::new("high".into(), bars.iter().map(|b| b.high).collect::<Vec<_>>()),
        Column::new("low".into(), bars.iter().map(|b| b.low).collect::<Vec<_>>()),
        Column::new("close".into(), bars.iter().map(|b| b.close).collect::<Vec<_>>()),
        Column::new("vol".into(), bars.iter().map(|b| b.vol).collect::<Vec<_>>()),
        Column::new("amount".into(), bars.iter().map(|b| b.amount).collect::<Vec<_>>()),
    ])
    .map_err(frame_err)?;

    debug_assert!(DAY_BAR_SCHEMA.validate(&df).is_ok());
    Ok(df)
}
