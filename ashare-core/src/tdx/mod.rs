//! Decoders for TDX (通达信) terminal files

pub mod dayfile;
pub mod vol_price;

pub use dayfile::{
    bars_to_frame, decode_records, read_day_file, read_day_range, Board, DayBar, DayFileError, Exchange, Instrument,
    RawDayRecord, RECORD_SIZE,
};
pub use vol_price::{parse_report, read_report, summarize, VolPriceError, VolPriceReport, VolPriceSummary};
