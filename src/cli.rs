//! Command line interface.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clap::{Parser, ValueEnum};
use indicatif::ProgressBar;

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log verbosity
    #[arg(
        short,
        long,
        value_enum,
        default_value_t = LogLevel::Info,
        ignore_case = true
    )]
    pub logging: LogLevel,

    /// Path to the settings file
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Reference timestamp for the run, overriding the current local time
    /// (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS). Selects the remote year/month
    /// partition and stamps the freshness records.
    #[arg(long, value_parser = parse_as_of)]
    pub as_of: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

fn parse_as_of(s: &str) -> Result<NaiveDateTime, String> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| d.and_time(NaiveTime::MIN))
        .map_err(|_| format!("expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS, got {s:?}"))
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_date_only_as_of() {
        let dt = parse_as_of("2018-08-01").unwrap();
        assert_eq!(dt.to_string(), "2018-08-01 00:00:00");
    }

    #[test]
    fn should_parse_full_as_of() {
        let dt = parse_as_of("2018-08-01T08:30:00").unwrap();
        assert_eq!(dt.to_string(), "2018-08-01 08:30:00");
    }

    #[test]
    fn should_reject_garbled_as_of() {
        assert!(parse_as_of("yesterday").is_err());
    }

    #[test]
    fn should_map_warning_to_warn() {
        assert_eq!(LogLevel::Warning.to_tracing_level(), tracing::Level::WARN);
    }
}
