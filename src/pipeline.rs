//! The ingestion orchestrator.
//!
//! One run lists the remote year/month partition, buckets the names by
//! accumulation category, and then processes each category independently:
//! select the latest candidate, fetch it, derive its validity interval, and
//! commit it into the mosaic store under the category's canonical load name.
//! A failure in one category never aborts the others; only a listing failure
//! is fatal to the run.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use chrono::NaiveDateTime;
use tracing::{debug, error, info, warn};

use crate::category::{classify, AccumulationCategory};
use crate::error::{IngestError, Result};
use crate::filename::{select_latest, TimestampParser};
use crate::freshness::FreshnessTracker;
use crate::remote::{remote_folder, RemoteClient, Transport};
use crate::settings::Settings;
use crate::store::{CommitAdapter, MosaicStore};

/// The time range a stored raster represents: `end` is the timestamp
/// embedded in the source filename, `start` trails it by the category's
/// accumulation window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidityInterval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ValidityInterval {
    pub fn ending_at(end: NaiveDateTime, category: AccumulationCategory) -> Self {
        ValidityInterval {
            start: end - chrono::Duration::days(category.window_days()),
            end,
        }
    }
}

/// Everything the commit adapter needs to load one fetched raster. Built
/// once per category per run and consumed exactly once.
#[derive(Debug, Clone)]
pub struct LoadDescriptor {
    pub original_name: String,
    pub local_path: PathBuf,
    pub load_name: &'static str,
    pub category: AccumulationCategory,
    pub target_dataset: String,
    pub validity: ValidityInterval,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub committed: Vec<AccumulationCategory>,
    pub skipped: Vec<AccumulationCategory>,
    pub failed: Vec<AccumulationCategory>,
}

pub struct Pipeline<T, S> {
    settings: Settings,
    client: RemoteClient<T>,
    committer: CommitAdapter<S>,
    bookkeeper: FreshnessTracker,
    parser: TimestampParser,
    extract_dir: PathBuf,
}

impl<T: Transport, S: MosaicStore> Pipeline<T, S> {
    pub fn new(
        settings: Settings,
        client: RemoteClient<T>,
        store: S,
        extract_dir: PathBuf,
    ) -> Result<Self> {
        let parser = TimestampParser::new(&settings.date_pattern, &settings.date_format)?;
        let bookkeeper = FreshnessTracker::new(settings.freshness_file.clone());

        Ok(Pipeline {
            client,
            committer: CommitAdapter::new(store),
            bookkeeper,
            parser,
            extract_dir,
            settings,
        })
    }

    /// Drives one run against the partition selected by `as_of`. Returns an
    /// error only when the remote listing itself fails; per-category
    /// problems are logged, counted in the summary, and do not stop the run.
    pub async fn run(&self, as_of: NaiveDateTime) -> Result<RunSummary> {
        let started = Instant::now();
        fs::create_dir_all(&self.extract_dir)?;

        let folder = remote_folder(&self.settings.remote_base_folder, as_of.date());
        info!(folder, as_of = %as_of, "starting accumulation run");

        let names = self.client.list_directory(&folder).await?;
        let buckets = classify(names.iter().map(String::as_str));

        let mut summary = RunSummary::default();
        for category in AccumulationCategory::ALL {
            let bucket = buckets.get(&category).map(Vec::as_slice).unwrap_or(&[]);

            match self.process_category(category, bucket, &folder).await {
                Ok(true) => summary.committed.push(category),
                Ok(false) => summary.skipped.push(category),
                Err(e) => {
                    error!(
                        category = %category, error = %e,
                        "category failed, continuing with the others"
                    );
                    summary.failed.push(category);
                }
            }

            // The freshness record stamps the attempt time for the feed
            // whether or not the commit landed.
            let feed = self.settings.category(category).feed.clone();
            if let Err(e) = self.bookkeeper.record_update(&feed, as_of) {
                let e = IngestError::bookkeeping(feed, e);
                warn!(error = %e, "feed freshness not recorded");
            }
        }

        let aggregate = self.settings.aggregate_feed.clone();
        if let Err(e) = self.bookkeeper.record_update(&aggregate, as_of) {
            let e = IngestError::bookkeeping(aggregate, e);
            warn!(error = %e, "aggregate feed freshness not recorded");
        }

        if summary.committed.is_empty() {
            warn!("run completed without ingesting any category");
        }

        info!(
            committed = summary.committed.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            elapsed = ?started.elapsed(),
            "accumulation run finished"
        );

        Ok(summary)
    }

    /// Returns `Ok(true)` when the category's raster was committed and
    /// `Ok(false)` when the category had nothing usable this run.
    async fn process_category(
        &self,
        category: AccumulationCategory,
        names: &[String],
        folder: &str,
    ) -> Result<bool> {
        let Some(latest) = select_latest(names.iter().map(String::as_str), &self.parser) else {
            info!(
                category = %category, candidates = names.len(),
                "no selectable file, skipping"
            );
            return Ok(false);
        };

        let Some(end) = self.parser.extract(latest) else {
            return Ok(false);
        };

        info!(category = %category, file = latest, "selected latest candidate");

        let remote_path = format!("{folder}/{latest}");
        let fetch_started = Instant::now();
        let local_path = self
            .client
            .fetch(&remote_path, &self.extract_dir.join(latest))
            .await?;
        debug!(category = %category, elapsed = ?fetch_started.elapsed(), "fetch complete");

        let load = LoadDescriptor {
            original_name: latest.to_string(),
            local_path: local_path.clone(),
            load_name: category.load_name(),
            category,
            target_dataset: self.settings.category(category).dataset.clone(),
            validity: ValidityInterval::ending_at(end, category),
        };

        // On commit failure the fetched file stays behind for inspection.
        self.committer.commit(&load)?;
        info!(
            category = %category, raster = load.load_name,
            dataset = %load.target_dataset, "raster committed"
        );

        if let Err(e) = fs::remove_file(&local_path) {
            warn!(file = %local_path.display(), error = %e, "fetched file not cleaned up");
        }

        Ok(true)
    }
}

// -- Tests -------------------------------------------------------------------
