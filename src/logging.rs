//! Tracing setup shared by the binaries

use std::fs;
use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize tracing with stdout output plus a `scraper.log` file in the
/// data directory. The returned guard must be held for the lifetime of the
/// process so buffered log lines are flushed on exit.
pub fn init(data_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(data_dir)?;

    let file_appender = tracing_appender::rolling::never(data_dir, "scraper.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}
