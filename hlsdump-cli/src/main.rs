mod cli;
mod error;
mod logging;
mod utils;

use clap::Parser;
use hlsdump_engine::hls::{DumpReport, RetryPolicy, Termination};
use hlsdump_engine::{DownloaderConfig, HlsConfig, HlsDumper, ProxyAuth, ProxyConfig};
use mimalloc::MiMalloc;
use std::process;
use std::time::Duration;
use tracing::{error, info};

use crate::cli::Args;
use crate::error::AppError;
use crate::logging::init_logging;
use crate::utils::parse_headers;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let _guard = match init_logging(args.verbose, args.logdir.as_deref(), &args.url) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    match run(args).await {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(e) => {
            error!("Application error: {}", e);
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

/// `Ok(false)` when the run completed but some playlist failed.
async fn run(args: Args) -> Result<bool, AppError> {
    let config = build_config(&args)?;
    let dumper = HlsDumper::new(config)?;

    info!(url = %args.url, dir = %args.output_dir.display(), "Starting hlsdump");
    let report = dumper.dump(&args.url, &args.output_dir).await?;
    summarize(&report);
    Ok(report.is_success())
}

fn build_config(args: &Args) -> Result<HlsConfig, AppError> {
    if args.retry == 0 {
        return Err(AppError::InvalidInput("--retry must be at least 1".to_string()));
    }
    if args.workers == 0 {
        return Err(AppError::InvalidInput("--workers must be at least 1".to_string()));
    }

    let proxy = args.proxy.as_ref().map(|url| ProxyConfig {
        url: url.clone(),
        proxy_type: args.proxy_type,
        auth: args.proxy_user.as_ref().map(|username| ProxyAuth {
            username: username.clone(),
            password: args.proxy_pass.clone().unwrap_or_default(),
        }),
    });

    let timeout = Duration::from_secs(args.timeout);
    let base = DownloaderConfig::with_config(DownloaderConfig {
        timeout,
        follow_redirects: !args.no_follow_redirects,
        headers: parse_headers(&args.headers)?,
        proxy,
        use_system_proxy: !args.no_system_proxy,
        pool_max_idle_per_host: args.workers,
        ..Default::default()
    });

    let mut config = HlsConfig {
        base,
        ..Default::default()
    };
    config.playlist_config.playlist_fetch_timeout = timeout;
    config.pool_config.workers = args.workers;
    config.pool_config.max_attempts = args.retry;
    config.pool_config.retry_policy = if args.retry_delay == 0 {
        RetryPolicy::immediate()
    } else {
        RetryPolicy {
            base_delay: Duration::from_millis(args.retry_delay),
            ..Default::default()
        }
    };
    config.output_config.timestamp_root_dir = !args.no_timestamp;
    Ok(config)
}

fn summarize(report: &DumpReport) {
    let reports = match report {
        DumpReport::Media { report, .. } => std::slice::from_ref(report),
        DumpReport::Master(master) => master.variants.as_slice(),
    };

    for r in reports {
        match &r.termination {
            Termination::EndOfStream => info!(
                playlist = %r.label,
                segments = r.segments,
                downloaded = r.downloads.succeeded,
                failed = r.downloads.failed,
                "Playlist mirrored"
            ),
            Termination::Failed(e) => error!(
                playlist = %r.label,
                segments = r.segments,
                downloaded = r.downloads.succeeded,
                error = %e,
                "Playlist mirroring failed"
            ),
        }
    }
    info!(root = %report.root().display(), success = report.is_success(), "Done");
}
