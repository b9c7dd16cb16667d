//! Tracing subscriber setup.
//!
//! Logs always go to the console; when a log directory is configured a
//! daily-rotating file (`<prefix>.<date>`) is written as well, with ANSI
//! colors stripped. The returned guard must stay alive for the life of the
//! process so buffered file output is flushed.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init(level: Level, log_dir: Option<&Path>, file_prefix: &str) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    match log_dir {
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .try_init()
                .context("failed to initialise logging")?;

            Ok(None)
        }
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;

            let appender = tracing_appender::rolling::daily(dir, file_prefix);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

            tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .with(file_layer)
                .try_init()
                .context("failed to initialise logging")?;

            Ok(Some(guard))
        }
    }
}
