//! Feed freshness bookkeeping.
//!
//! A small persisted JSON mapping from feed name to last-updated timestamp,
//! read-modify-written on every call. The serving side reads it to audit how
//! stale each feed is.

use std::fs;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Serialize, Deserialize)]
struct FeedFile {
    feeds: Vec<FeedRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FeedRecord {
    name: String,
    last_updated: String,
}

pub struct FreshnessTracker {
    path: PathBuf,
}

impl FreshnessTracker {
    pub fn new(path: PathBuf) -> Self {
        FreshnessTracker { path }
    }

    /// Overwrites the feed's last-updated timestamp, appending a new record
    /// for a feed not seen before. When the backing file does not exist the
    /// call is a logged no-op: the file is provisioned by the serving side
    /// and its absence means there is nothing to keep fresh.
    pub fn record_update(&self, feed: &str, when: NaiveDateTime) -> Result<()> {
        if !self.path.is_file() {
            info!(
                file = %self.path.display(),
                feed, "freshness file not found, skipping feed update"
            );
            return Ok(());
        }

        let text = fs::read_to_string(&self.path)?;
        let mut data: FeedFile = serde_json::from_str(&text)?;
        let stamp = when.format(TIMESTAMP_FORMAT).to_string();

        match data.feeds.iter_mut().find(|f| f.name == feed) {
            Some(record) => record.last_updated = stamp,
            None => data.feeds.push(FeedRecord {
                name: feed.to_string(),
                last_updated: stamp,
            }),
        }

        fs::write(&self.path, serde_json::to_string_pretty(&data)?)?;

        Ok(())
    }
}

// -- Tests -------------------------------------------------------------------
