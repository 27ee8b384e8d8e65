use md5::{Digest, Md5};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::error::AppError;

/// Install the global subscriber.
///
/// Without a log directory, human readable logs go to stdout. With one, JSON
/// lines go to `<logdir>/<md5 of url>.log`, so every source gets its own file.
/// The returned guard must live until the process exits.
pub fn init_logging(
    verbose: bool,
    logdir: Option<&Path>,
    url: &str,
) -> Result<Option<WorkerGuard>, AppError> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let Some(logdir) = logdir else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .map_err(|e| AppError::Logging(e.to_string()))?;
        return Ok(None);
    };

    std::fs::create_dir_all(logdir)?;
    let file_name = log_file_name(url);
    println!("hlsdump logs to {}", logdir.join(&file_name).display());

    let file_appender = tracing_appender::rolling::never(logdir, &file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))?;

    Ok(Some(guard))
}

/// `<hex md5 of url>.log`
pub fn log_file_name(url: &str) -> PathBuf {
    let digest = Md5::digest(url.as_bytes());
    PathBuf::from(format!("{}.log", hex::encode(digest)))
}
