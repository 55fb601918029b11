//! Parquet archive of independently named tables.
//!
//! Layout: `{root}/{table}.parquet` plus a `{table}.meta.json` sidecar.
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Append: existing rows are kept, new rows are stacked after them
//! - Schema check on append (column names, order and dtypes must match)
//! - Metadata sidecar per table (row count, content hash, source, write time)

use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive I/O error: {0}")]
    Io(String),

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("invalid table name '{0}'")]
    InvalidTableName(String),

    #[error("table '{table}' not found in archive {root}")]
    NoTable { table: String, root: String },

    #[error("schema mismatch appending to '{table}': {detail}")]
    SchemaMismatch { table: String, detail: String },

    #[error("corrupt table '{table}': {detail}")]
    Corrupt { table: String, detail: String },
}

/// Metadata sidecar for an archived table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    pub table: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub data_hash: String,
    pub source: String,
    pub written_at: NaiveDateTime,
}

/// Status line for one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableStatus {
    pub table: String,
    pub rows: Option<usize>,
    pub written_at: Option<NaiveDateTime>,
}

/// A directory holding named Parquet tables.
#[derive(Debug, Clone)]
pub struct Archive {
    root: PathBuf,
}

impl Archive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the archive.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the archive directory exists at all.
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Path to the Parquet file of a table: `{root}/{table}.parquet`
    fn table_path(&self, table: &str) -> Result<PathBuf, ArchiveError> {
        validate_table_name(table)?;
        Ok(self.root.join(format!("{table}.parquet")))
    }

    /// Path to the metadata sidecar of a table.
    fn meta_path(&self, table: &str) -> PathBuf {
        self.root.join(format!("{table}.meta.json"))
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.table_path(table).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Names of all tables, sorted.
    pub fn tables(&self) -> Result<Vec<String>, ArchiveError> {
        if !self.exists() {
            return Ok(Vec::new());
        }
        let entries =
            fs::read_dir(&self.root).map_err(|e| ArchiveError::Io(format!("read dir: {e}")))?;

        let mut tables = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ArchiveError::Io(format!("dir entry: {e}")))?;
            let path = entry.path();
            // Skip sidecars and leftover temp files
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                tables.push(stem.to_string());
            }
        }
        tables.sort();
        Ok(tables)
    }

    /// Load a whole table.
    pub fn read(&self, table: &str) -> Result<DataFrame, ArchiveError> {
        self.read_optional(table)?.ok_or_else(|| ArchiveError::NoTable {
            table: table.to_string(),
            root: self.root.display().to_string(),
        })
    }

    /// Load a table, or `None` if it has never been written.
    pub fn read_optional(&self, table: &str) -> Result<Option<DataFrame>, ArchiveError> {
        let path = self.table_path(table)?;
        if !path.is_file() {
            return Ok(None);
        }
        let file = fs::File::open(&path).map_err(|e| ArchiveError::Io(format!("open: {e}")))?;
        let df = ParquetReader::new(file).finish().map_err(|e| ArchiveError::Corrupt {
            table: table.to_string(),
            detail: e.to_string(),
        })?;
        Ok(Some(df))
    }

    /// Largest value of a string column, or `None` if the table is absent or
    /// holds no values.
    pub fn max_str(&self, table: &str, column: &str) -> Result<Option<String>, ArchiveError> {
        let Some(df) = self.read_optional(table)? else {
            return Ok(None);
        };
        let corrupt = |e: PolarsError| ArchiveError::Corrupt {
            table: table.to_string(),
            detail: e.to_string(),
        };
        let values = df.column(column).map_err(corrupt)?.str().map_err(corrupt)?;
        Ok(values.into_iter().flatten().max().map(str::to_string))
    }

    /// Replace a table with `df`.
    pub fn write(&self, table: &str, df: &DataFrame, source: &str) -> Result<(), ArchiveError> {
        let path = self.table_path(table)?;
        fs::create_dir_all(&self.root)
            .map_err(|e| ArchiveError::Io(format!("failed to create dir: {e}")))?;

        let tmp_path = path.with_extension("parquet.tmp");
        write_parquet(df, &tmp_path)?;

        let data_hash = fs::read(&tmp_path)
            .map(|bytes| blake3::hash(&bytes).to_hex().to_string())
            .map_err(|e| ArchiveError::Io(format!("hash read: {e}")))?;

        // Atomic rename
        fs::rename(&tmp_path, &path).map_err(|e| {
            // Clean up temp file on rename failure
            let _ = fs::remove_file(&tmp_path);
            ArchiveError::Io(format!("atomic rename failed: {e}"))
        })?;

        let meta = TableMeta {
            table: table.to_string(),
            rows: df.height(),
            columns: column_names(df),
            data_hash,
            source: source.to_string(),
            written_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| ArchiveError::Io(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(table), meta_json)
            .map_err(|e| ArchiveError::Io(format!("meta write: {e}")))?;

        debug!(table, rows = df.height(), "table written");
        Ok(())
    }

    /// Append `df` to a table, creating it if absent.
    ///
    /// Returns the table's row count after the append. An empty `df` leaves the
    /// archive untouched.
    pub fn append(&self, table: &str, df: &DataFrame, source: &str) -> Result<usize, ArchiveError> {
        let existing = self.read_optional(table)?;
        if df.height() == 0 {
            return Ok(existing.map(|e| e.height()).unwrap_or(0));
        }

        let combined = match existing {
            None => df.clone(),
            Some(existing) => {
                check_same_schema(table, &existing, df)?;
                existing
                    .vstack(df)
                    .map_err(|e| ArchiveError::SchemaMismatch {
                        table: table.to_string(),
                        detail: e.to_string(),
                    })?
            }
        };

        self.write(table, &combined, source)?;
        Ok(combined.height())
    }

    /// Read a table's metadata sidecar.
    pub fn meta(&self, table: &str) -> Option<TableMeta> {
        let content = fs::read_to_string(self.meta_path(table)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Row counts and write times of every table.
    pub fn status(&self) -> Result<Vec<TableStatus>, ArchiveError> {
        Ok(self
            .tables()?
            .into_iter()
            .map(|table| {
                let meta = self.meta(&table);
                TableStatus {
                    rows: meta.as_ref().map(|m| m.rows),
                    written_at: meta.as_ref().map(|m| m.written_at),
                    table,
                }
            })
            .collect())
    }
}

/// Table names become file names, so only `[A-Za-z0-9_]` is allowed.
fn validate_table_name(table: &str) -> Result<(), ArchiveError> {
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ArchiveError::InvalidTableName(table.to_string()));
    }
    Ok(())
}

fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect()
}

fn check_same_schema(table: &str, existing: &DataFrame, new: &DataFrame) -> Result<(), ArchiveError> {
    let describe = |df: &DataFrame| {
        df.get_columns()
            .iter()
            .map(|c| format!("{}:{}", c.name(), c.dtype()))
            .collect::<Vec<_>>()
    };
    let expected = describe(existing);
    let found = describe(new);
    if expected != found {
        return Err(ArchiveError::SchemaMismatch {
            table: table.to_string(),
            detail: format!("expected [{}], found [{}]", expected.join(", "), found.join(", ")),
        });
    }
    Ok(())
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

/// Write a DataFrame to a Parquet file.
fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), ArchiveError> {
    let file =
        fs::File::create(path).map_err(|e| ArchiveError::Parquet(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| ArchiveError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}
