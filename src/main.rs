mod category;
mod cli;
mod error;
mod filename;
mod freshness;
mod logging;
mod pipeline;
mod remote;
mod settings;
mod store;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use clap::Parser;
use tempfile::TempDir;
use tracing::error;

use crate::cli::Cli;
use crate::error::{IngestError, Result};
use crate::pipeline::{Pipeline, RunSummary};
use crate::remote::{FtpTransport, RelayTransport, RemoteClient, Transport};
use crate::settings::{Settings, TransportKind};
use crate::store::FileMosaicStore;

/// Exit codes: 0 on success (including a degraded run that ingested no
/// category), 1 on a fatal run failure (remote listing), 2 on a
/// configuration or startup failure.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(2);
        }
    };

    let _log_guard = match logging::init(
        cli.logging.to_tracing_level(),
        settings.log_dir.as_deref(),
        &settings.log_file_prefix,
    ) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(2);
        }
    };

    let as_of = cli.as_of.unwrap_or_else(|| Local::now().naive_local());

    match run(&settings, as_of).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run aborted");
            ExitCode::from(1)
        }
    }
}

async fn run(settings: &Settings, as_of: NaiveDateTime) -> Result<RunSummary> {
    // Fetched rasters land in the configured extract folder, or in a
    // run-scoped temporary directory when none is configured.
    let (extract_dir, _extract_guard) = match &settings.extract_folder {
        Some(path) => (path.clone(), None),
        None => {
            let dir = TempDir::new()?;
            (dir.path().to_path_buf(), Some(dir))
        }
    };

    let timeout = Duration::from_secs(settings.fetch_timeout_secs);

    match settings.transport {
        TransportKind::Ftp => {
            let transport = FtpTransport::new(
                &settings.ftp_host,
                settings.ftp_port,
                &settings.ftp_user,
                &settings.ftp_password,
            );
            run_with(settings, transport, timeout, extract_dir, as_of).await
        }
        TransportKind::Relay => {
            let relay_url = settings.relay_url.as_deref().ok_or_else(|| {
                IngestError::Config("relay_url is required when transport is \"relay\"".to_string())
            })?;
            let transport = RelayTransport::new(relay_url, &settings.ftp_host)?;
            run_with(settings, transport, timeout, extract_dir, as_of).await
        }
    }
}

async fn run_with<T: Transport>(
    settings: &Settings,
    transport: T,
    timeout: Duration,
    extract_dir: PathBuf,
    as_of: NaiveDateTime,
) -> Result<RunSummary> {
    let client = RemoteClient::new(transport, timeout);
    let store = FileMosaicStore::new(settings.mosaic_root.clone());

    Pipeline::new(settings.clone(), client, store, extract_dir)?
        .run(as_of)
        .await
}
