//! Error taxonomy for the ingestion pipeline.
//!
//! Listing failures abort a run; everything else is scoped to a single
//! accumulation category and handled at the orchestrator call site.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("FTP error: {0}")]
    Ftp(#[from] suppaftp::FtpError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("listing of remote folder {folder} failed: {source}")]
    Listing {
        folder: String,
        source: Box<IngestError>,
    },

    #[error("fetch of {name} failed: {source}")]
    Fetch {
        name: String,
        source: Box<IngestError>,
    },

    #[error("commit of {name} into {dataset} failed: {source}")]
    Commit {
        name: String,
        dataset: String,
        source: Box<IngestError>,
    },

    #[error("validity metadata for {name} in {dataset} not written: {source}")]
    Metadata {
        name: String,
        dataset: String,
        source: Box<IngestError>,
    },

    #[error("no catalog entry named {name} in dataset {dataset}")]
    EntryNotFound { dataset: String, name: String },

    #[error("freshness update for feed {feed} failed: {source}")]
    Bookkeeping {
        feed: String,
        source: Box<IngestError>,
    },
}

impl IngestError {
    pub fn listing(folder: impl Into<String>, source: IngestError) -> Self {
        IngestError::Listing {
            folder: folder.into(),
            source: Box::new(source),
        }
    }

    pub fn fetch(name: impl Into<String>, source: IngestError) -> Self {
        IngestError::Fetch {
            name: name.into(),
            source: Box::new(source),
        }
    }

    pub fn commit(name: impl Into<String>, dataset: impl Into<String>, source: IngestError) -> Self {
        IngestError::Commit {
            name: name.into(),
            dataset: dataset.into(),
            source: Box::new(source),
        }
    }

    pub fn metadata(
        name: impl Into<String>,
        dataset: impl Into<String>,
        source: IngestError,
    ) -> Self {
        IngestError::Metadata {
            name: name.into(),
            dataset: dataset.into(),
            source: Box::new(source),
        }
    }

    pub fn bookkeeping(feed: impl Into<String>, source: IngestError) -> Self {
        IngestError::Bookkeeping {
            feed: feed.into(),
            source: Box::new(source),
        }
    }
}
