use std::time::Duration;

use crate::DownloaderConfig;
use crate::hls::retry::RetryPolicy;

// --- Top-Level Configuration ---
#[derive(Debug, Clone, Default)]
pub struct HlsConfig {
    /// Base downloader configuration
    pub base: DownloaderConfig,
    pub playlist_config: HlsPlaylistConfig,
    pub pool_config: WorkerPoolConfig,
    pub output_config: HlsOutputConfig,
}

// --- Playlist Configuration ---
#[derive(Debug, Clone)]
pub struct HlsPlaylistConfig {
    /// Timeout for a single playlist fetch, zero disables it
    pub playlist_fetch_timeout: Duration,
    /// Consecutive non-success statuses tolerated before a synchronizer gives up.
    /// The synchronizer fails once the count goes strictly above this value.
    pub max_refresh_failures: u32,
    /// Lower bound of the pause between two refreshes, whatever the target duration says
    pub min_refresh_interval: Duration,
}

impl Default for HlsPlaylistConfig {
    fn default() -> Self {
        Self {
            playlist_fetch_timeout: Duration::from_secs(10),
            max_refresh_failures: 3,
            min_refresh_interval: Duration::from_secs(1),
        }
    }
}

// --- Worker Pool Configuration ---
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent download workers per playlist (default: 5)
    pub workers: usize,
    /// Total attempts per segment, including the first one (default: 3)
    pub max_attempts: u32,
    /// Backoff between two attempts of the same segment
    pub retry_policy: RetryPolicy,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            max_attempts: 3,
            retry_policy: RetryPolicy::default(),
        }
    }
}

// --- Output Configuration ---
#[derive(Debug, Clone)]
pub struct HlsOutputConfig {
    /// File name of the local index in every output directory
    pub index_file_name: String,
    /// Extension given to downloaded segments (`<sequence>.<ext>`)
    pub segment_extension: String,
    /// Append `-<unix seconds>` to the output root so repeated runs never collide
    pub timestamp_root_dir: bool,
}

impl Default for HlsOutputConfig {
    fn default() -> Self {
        Self {
            index_file_name: "index.m3u8".to_string(),
            segment_extension: "ts".to_string(),
            timestamp_root_dir: true,
        }
    }
}
