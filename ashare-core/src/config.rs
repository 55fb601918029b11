//! Application configuration.
//!
//! Loaded from a TOML file; every field has a default rooted at
//! `~/Stock_Data`, so an empty file (or no file) is a valid configuration.
//!
//! ```toml
//! data_root = "/data/Stock_Data"
//!
//! [tushare]
//! token_file = "/data/Stock_Data/Tushare/Token/token.txt"
//!
//! [retry]
//! max_attempts = 30
//! delay_secs = 10
//! backoff = "exponential"
//! max_delay_secs = 120
//! ```

use crate::data::retry::{Backoff, RetryPolicy};
use crate::data::tushare::DEFAULT_API_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides the token file.
pub const TOKEN_ENV: &str = "TUSHARE_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot determine home directory; set data_root explicitly")]
    NoHomeDir,

    #[error("no Tushare token: set TUSHARE_TOKEN or write it to {0}")]
    MissingToken(String),
}

/// Top-level configuration. Relative paths are taken as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Root of all local data. Defaults to `~/Stock_Data`.
    pub data_root: Option<PathBuf>,
    pub tushare: TushareConfig,
    pub limits: LimitsConfig,
    pub tdx: TdxConfig,
    pub vol_price: VolPriceConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TushareConfig {
    pub api_url: String,
    /// Defaults to `{data_root}/Tushare/Token/token.txt`.
    pub token_file: Option<PathBuf>,
    pub timeout_secs: u64,
    /// Exchange passed to the trading calendar; empty selects SSE.
    pub exchange: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Defaults to `{data_root}/Tushare/archive/stock`.
    pub archive: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TdxConfig {
    /// TDX `vipdoc` tree. Defaults to `{data_root}/TDX/vipdoc`.
    pub vipdoc: Option<PathBuf>,
    /// Defaults to `{data_root}/archive/t6`.
    pub archive: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VolPriceConfig {
    /// Defaults to `{data_root}/TDX/export`.
    pub export_dir: Option<PathBuf>,
    /// Defaults to `{data_root}/Vol_Price/vp`.
    pub archive: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_secs: u64,
    pub backoff: BackoffKind,
    /// Upper bound for exponential backoff.
    pub max_delay_secs: u64,
}

impl Default for TushareConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token_file: None,
            timeout_secs: 30,
            exchange: String::new(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            delay_secs: 10,
            backoff: BackoffKind::Fixed,
            max_delay_secs: 300,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        let backoff = match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed,
            BackoffKind::Exponential => Backoff::Exponential {
                max_delay: Duration::from_secs(self.max_delay_secs),
            },
        };
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::from_secs(self.delay_secs),
            backoff,
        }
    }
}

impl AppConfig {
    /// Load a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Explicit file if given, else the per-user config file if it exists,
    /// else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `{config_dir}/ashare/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ashare").join("config.toml"))
    }

    pub fn data_root(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_root {
            Some(root) => Ok(root.clone()),
            None => dirs::home_dir()
                .map(|home| home.join("Stock_Data"))
                .ok_or(ConfigError::NoHomeDir),
        }
    }

    fn under_root(&self, explicit: &Option<PathBuf>, rel: &[&str]) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            return Ok(path.clone());
        }
        Ok(rel.iter().fold(self.data_root()?, |p, part| p.join(part)))
    }

    pub fn token_file(&self) -> Result<PathBuf, ConfigError> {
        self.under_root(&self.tushare.token_file, &["Tushare", "Token", "token.txt"])
    }

    pub fn limits_archive(&self) -> Result<PathBuf, ConfigError> {
        self.under_root(&self.limits.archive, &["Tushare", "archive", "stock"])
    }

    pub fn vipdoc_dir(&self) -> Result<PathBuf, ConfigError> {
        self.under_root(&self.tdx.vipdoc, &["TDX", "vipdoc"])
    }

    pub fn dayfile_archive(&self) -> Result<PathBuf, ConfigError> {
        self.under_root(&self.tdx.archive, &["archive", "t6"])
    }

    pub fn export_dir(&self) -> Result<PathBuf, ConfigError> {
        self.under_root(&self.vol_price.export_dir, &["TDX", "export"])
    }

    pub fn vol_price_archive(&self) -> Result<PathBuf, ConfigError> {
        self.under_root(&self.vol_price.archive, &["Vol_Price", "vp"])
    }

    pub fn tushare_timeout(&self) -> Duration {
        Duration::from_secs(self.tushare.timeout_secs)
    }

    /// Resolve the API token: environment first, then the token file.
    pub fn load_token(&self) -> Result<String, ConfigError> {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                return Ok(token.trim().to_string());
            }
        }
        let path = self.token_file()?;
        let missing = || ConfigError::MissingToken(path.display().to_string());
        let token = std::fs::read_to_string(&path).map_err(|_| missing())?;
        let token = token.trim();
        if token.is_empty() {
            return Err(missing());
        }
        Ok(token.to_string())
    }
}
