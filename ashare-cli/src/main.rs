//! ashare CLI: update and inspect the local A-share archive.
//!
//! Commands:
//! - `limits`: fetch `stk_limit` / `limit_list` from Tushare up to a date
//! - `dayfiles`: decode new TDX day-file records
//! - `vol-price`: import exported price-volume reports
//! - `vp-report`: print the price-volume summary per instrument
//! - `status`: list archived tables and watermarks

use anyhow::{Context, Result};
use ashare_core::data::{Archive, DateWatermarks, LengthWatermarks, LimitTable, TushareProvider};
use ashare_core::domain::TradeDate;
use ashare_core::pipeline::{import_reports, update_day_files, update_limits, VOL_PRICE_TABLE};
use ashare_core::tdx::summarize;
use ashare_core::AppConfig;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ashare", about = "Incremental A-share data archive")]
struct Cli {
    /// Config file. Defaults to the per-user config if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch limit statistics from Tushare and append them to the archive.
    Limits {
        /// Last date to fetch (YYYYMMDD). Defaults to today.
        #[arg(long)]
        end: Option<String>,
    },
    /// Decode new records from TDX day-files.
    Dayfiles {
        /// TDX vipdoc directory. Overrides the config.
        #[arg(long)]
        vipdoc: Option<PathBuf>,
    },
    /// Import exported price-volume reports.
    VolPrice {
        /// Directory holding the exported reports. Overrides the config.
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },
    /// Print heaviest price levels per session and their totals.
    VpReport {
        /// Only this instrument code.
        #[arg(long)]
        code: Option<String>,
    },
    /// List tables, row counts and watermarks.
    Status {
        /// Archive directory. Defaults to every configured archive.
        #[arg(long)]
        archive: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug,reqwest=warn,hyper=warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Limits { end } => run_limits(&config, end),
        Commands::Dayfiles { vipdoc } => run_dayfiles(&config, vipdoc),
        Commands::VolPrice { export_dir } => run_vol_price(&config, export_dir),
        Commands::VpReport { code } => run_vp_report(&config, code),
        Commands::Status { archive } => run_status(&config, archive),
    }
}

fn run_limits(config: &AppConfig, end: Option<String>) -> Result<()> {
    let end = match end {
        Some(s) => TradeDate::parse_loose(&s)?,
        None => TradeDate::today(),
    };
    let token = config.load_token()?;
    let provider = TushareProvider::new(&config.tushare.api_url, &token, config.tushare_timeout())?;
    let archive = Archive::new(config.limits_archive()?);

    let update = update_limits(
        &provider,
        &archive,
        &LimitTable::ALL,
        &end,
        &config.tushare.exchange,
        &config.retry.policy(),
    )?;

    if update.up_to_date() {
        println!("No update needed: archive is current through {end}.");
        return Ok(());
    }
    println!("{:<12} {:>8} {:>10} {:>10} {:>10}", "Table", "Days", "With data", "Rows", "Watermark");
    println!("{}", "-".repeat(54));
    for t in &update.tables {
        let mark = t.watermark.as_ref().map(|d| d.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "{:<12} {:>8} {:>10} {:>10} {:>10}",
            t.table.table_name(),
            t.pending,
            t.dates_with_data,
            t.rows_appended,
            mark
        );
    }
    println!("Appended {} row(s) to {}", update.rows_appended(), archive.root().display());
    Ok(())
}

fn run_dayfiles(config: &AppConfig, vipdoc: Option<PathBuf>) -> Result<()> {
    let vipdoc = match vipdoc {
        Some(dir) => dir,
        None => config.vipdoc_dir()?,
    };
    let archive = Archive::new(config.dayfile_archive()?);
    let report = update_day_files(&vipdoc, &archive)?;

    println!("Scanned:   {}", report.scanned);
    println!("Filtered:  {}", report.filtered);
    println!("Updated:   {} ({} rows, {} rebuilt)", report.updated, report.rows, report.resets);
    println!("Halted:    {}", report.halted);
    for path in &report.corrupted {
        println!("Corrupted: {}", path.display());
    }

    if !report.failed.is_empty() {
        for (path, err) in &report.failed {
            eprintln!("Error for {}: {err}", path.display());
        }
        std::process::exit(1);
    }
    Ok(())
}

fn run_vol_price(config: &AppConfig, export_dir: Option<PathBuf>) -> Result<()> {
    let export_dir = match export_dir {
        Some(dir) => dir,
        None => config.export_dir()?,
    };
    let archive = Archive::new(config.vol_price_archive()?);
    let import = import_reports(&export_dir, &archive)?;

    println!("Reports found:    {}", import.found);
    println!("Imported:         {} ({} rows)", import.imported, import.rows);
    println!("Already archived: {}", import.already_archived);

    if !import.failed.is_empty() {
        for (path, err) in &import.failed {
            eprintln!("Error for {}: {err}", path.display());
        }
        std::process::exit(1);
    }
    Ok(())
}

fn run_vp_report(config: &AppConfig, code: Option<String>) -> Result<()> {
    let archive = Archive::new(config.vol_price_archive()?);
    let df = archive
        .read(VOL_PRICE_TABLE)
        .context("no price-volume data; run `ashare vol-price` first")?;

    let summaries = summarize(&df, code.as_deref())?;
    if summaries.is_empty() {
        println!("No price-volume data for the requested instrument.");
        return Ok(());
    }

    for s in &summaries {
        println!("{} recent sessions:", s.ts_code);
        println!("{:<10} {:>10} {:>14}", "Date", "Price", "Volume");
        for level in &s.sessions {
            println!("{:<10} {:>10.2} {:>14.0}", level.trade_date, level.price, level.volume);
        }
        println!("Totals:");
        println!("{:>10} {:>14}", "Price", "Volume");
        for (price, volume) in &s.totals {
            println!("{price:>10.2} {volume:>14.0}");
        }
        println!("{}", "-".repeat(40));
    }
    Ok(())
}

fn run_status(config: &AppConfig, archive: Option<PathBuf>) -> Result<()> {
    let roots = match archive {
        Some(dir) => vec![dir],
        None => vec![
            config.limits_archive()?,
            config.dayfile_archive()?,
            config.vol_price_archive()?,
        ],
    };
    for root in &roots {
        print_status(root)?;
        println!();
    }
    Ok(())
}

fn print_status(root: &Path) -> Result<()> {
    let archive = Archive::new(root);
    println!("Archive: {}", root.display());
    if !archive.exists() {
        println!("  (does not exist)");
        return Ok(());
    }

    let tables = archive.status()?;
    println!("Tables: {}", tables.len());
    // Day-file archives hold thousands of instrument tables; list only the rest.
    let listed: Vec<_> = tables
        .iter()
        .filter(|t| ashare_core::tdx::Instrument::from_stem(&t.table).is_none())
        .collect();
    if !listed.is_empty() {
        println!("{:<16} {:>10}  {:<20}", "Table", "Rows", "Written");
        println!("{}", "-".repeat(48));
        for t in listed {
            let rows = t.rows.map(|r| r.to_string()).unwrap_or_else(|| "?".into());
            let written = t
                .written_at
                .map(|w| w.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "?".into());
            println!("{:<16} {:>10}  {:<20}", t.table, rows, written);
        }
    }

    let dates = DateWatermarks::load(&archive)?;
    for (key, date) in dates.iter() {
        println!("Watermark {key}: {date}");
    }
    let lengths = LengthWatermarks::load(&archive)?;
    if !lengths.is_empty() {
        println!("Day-files tracked: {}", lengths.len());
    }
    Ok(())
}
