//! Pipeline configuration, loaded once at startup and passed by reference
//! into every component. There is no ambient global state.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::category::AccumulationCategory;
use crate::error::{IngestError, Result};

/// Which fetch transport to use. The production deployment cannot reach the
/// FTP site directly and goes through an HTTP relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Ftp,
    Relay,
}

/// Deployment names for one accumulation category: the target dataset in the
/// mosaic store and the logical feed tracked by the freshness file.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryFeed {
    pub dataset: String,
    pub feed: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// FTP host the accumulation files are published on.
    pub ftp_host: String,
    #[serde(default = "default_ftp_port")]
    pub ftp_port: u16,
    #[serde(default = "default_ftp_user")]
    pub ftp_user: String,
    #[serde(default)]
    pub ftp_password: String,

    /// Base remote folder; the year/month partition is appended per run.
    pub remote_base_folder: String,

    #[serde(default = "default_transport")]
    pub transport: TransportKind,
    /// Base URL of the HTTP relay, required when `transport` is `relay`.
    #[serde(default)]
    pub relay_url: Option<String>,

    /// Where fetched rasters land before commit. A run-scoped temporary
    /// directory is used when unset.
    #[serde(default)]
    pub extract_folder: Option<PathBuf>,

    /// Root of the mosaic-style raster store.
    pub mosaic_root: PathBuf,

    #[serde(default = "default_date_pattern")]
    pub date_pattern: String,
    #[serde(default = "default_date_format")]
    pub date_format: String,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Persisted feed-freshness mapping consumed by the serving side.
    pub freshness_file: PathBuf,

    pub one_day: CategoryFeed,
    pub three_day: CategoryFeed,
    pub seven_day: CategoryFeed,
    /// Feed recorded once per run, after all categories.
    pub aggregate_feed: String,

    /// When set, a daily-rotating log file is written here in addition to
    /// the console.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default = "default_log_prefix")]
    pub log_file_prefix: String,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| IngestError::Config(format!("cannot read {}: {e}", path.display())))?;
        let settings: Settings = serde_json::from_str(&text)
            .map_err(|e| IngestError::Config(format!("cannot parse {}: {e}", path.display())))?;
        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.transport == TransportKind::Relay && self.relay_url.is_none() {
            return Err(IngestError::Config(
                "relay_url is required when transport is \"relay\"".to_string(),
            ));
        }

        Ok(())
    }

    pub fn category(&self, category: AccumulationCategory) -> &CategoryFeed {
        match category {
            AccumulationCategory::OneDay => &self.one_day,
            AccumulationCategory::ThreeDay => &self.three_day,
            AccumulationCategory::SevenDay => &self.seven_day,
        }
    }
}

fn default_ftp_port() -> u16 {
    21
}

fn default_ftp_user() -> String {
    "anonymous".to_string()
}

fn default_transport() -> TransportKind {
    TransportKind::Relay
}

fn default_date_pattern() -> String {
    r"\d{4}[01]\d[0-3]\d-S[0-2]\d{5}".to_string()
}

fn default_date_format() -> String {
    "%Y%m%d-S%H%M%S".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    300
}

fn default_log_prefix() -> String {
    "imerg-accumulations".to_string()
}

// -- Tests -------------------------------------------------------------------
