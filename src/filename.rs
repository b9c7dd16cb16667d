//! Extracting validity timestamps embedded in remote filenames.
//!
//! Upstream names look like
//! `3B-HHR-L.MS.MRG.3IMERG.20150802-S083000-E085959.0510.V05B.1day.tif`;
//! the `20150802-S083000` portion carries the accumulation end time. Both
//! the search pattern and the date format are configuration values so the
//! pipeline survives upstream filename evolution.

use chrono::NaiveDateTime;
use regex::Regex;

use crate::error::{IngestError, Result};

/// Compiled filename timestamp extractor.
pub struct TimestampParser {
    pattern: Regex,
    format: String,
}

impl TimestampParser {
    pub fn new(pattern: &str, format: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| IngestError::Config(format!("invalid date pattern {pattern:?}: {e}")))?;

        Ok(TimestampParser {
            pattern,
            format: format.to_string(),
        })
    }

    /// Returns the timestamp embedded in `name`, or `None` when the pattern
    /// does not match or the matched text does not parse. Never fails loudly:
    /// an unparseable name is simply not a candidate.
    pub fn extract(&self, name: &str) -> Option<NaiveDateTime> {
        let matched = self.pattern.find(name)?;
        NaiveDateTime::parse_from_str(matched.as_str(), &self.format).ok()
    }
}

/// Returns the candidate with the maximal embedded timestamp. Names without
/// an extractable timestamp are excluded from consideration entirely, so a
/// malformed name can never be selected no matter how it sorts as a string.
/// Ties keep the first-encountered name in input order.
pub fn select_latest<'a, I>(names: I, parser: &TimestampParser) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut latest: Option<(&str, NaiveDateTime)> = None;

    for name in names {
        if let Some(date) = parser.extract(name) {
            match latest {
                Some((_, best)) if date <= best => {}
                _ => latest = Some((name, date)),
            }
        }
    }

    latest.map(|(name, _)| name)
}

// -- Tests -------------------------------------------------------------------
