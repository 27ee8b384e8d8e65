// Media playlist synchronizer: polls one media playlist until it ends or breaks,
// mirroring every new segment into the local index and the download pool.

use chrono::Utc;
use reqwest::StatusCode;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::hls::HlsError;
use crate::hls::config::HlsConfig;
use crate::hls::cursor::{PlaylistCursor, StreamStatus};
use crate::hls::fetcher::SegmentDownloader;
use crate::hls::output::IndexWriter;
use crate::hls::playlist::{PlaylistSource, resolve_uri};
use crate::hls::worker_pool::{DownloadTask, PoolSummary, WorkerPool};

/// Where a media playlist lives and where its mirror goes. Never changes.
#[derive(Debug, Clone)]
pub struct MediaPlaylist {
    pub url: Url,
    pub output_dir: PathBuf,
    /// Short name used in logs
    pub label: String,
}

impl MediaPlaylist {
    pub fn new(url: Url, output_dir: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            url,
            output_dir: output_dir.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized,
    Polling,
    Draining,
    Terminated,
}

/// Why a synchronizer stopped.
#[derive(Debug)]
pub enum Termination {
    /// The playlist carried its end marker.
    EndOfStream,
    Failed(HlsError),
}

#[derive(Debug)]
pub struct SyncReport {
    pub label: String,
    pub index_path: PathBuf,
    /// Segments indexed and handed to the pool
    pub segments: u64,
    pub cycles: u64,
    pub stalls: u64,
    pub discontinuities: u64,
    pub downloads: PoolSummary,
    pub termination: Termination,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        matches!(self.termination, Termination::EndOfStream)
    }
}

/// Result of one refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    pub new_segments: usize,
    pub status: StreamStatus,
}

impl CycleOutcome {
    fn skipped() -> Self {
        Self {
            new_segments: 0,
            status: StreamStatus::Live,
        }
    }
}

/// Everything a synchronizer mutates while polling, owned by that synchronizer alone.
struct PollingState {
    cursor: PlaylistCursor,
    consecutive_failures: u32,
    index: Option<IndexWriter>,
    last_segment_at: Instant,
    segments: u64,
    cycles: u64,
    stalls: u64,
    discontinuities: u64,
}

pub struct MediaPlaylistSynchronizer {
    playlist: MediaPlaylist,
    config: Arc<HlsConfig>,
    source: Arc<dyn PlaylistSource>,
    pool: WorkerPool,
    state: SyncState,
    polling: PollingState,
    /// Body fetched by whoever classified the playlist, used instead of the first fetch
    prefetched: Option<String>,
}

impl MediaPlaylistSynchronizer {
    pub fn new(
        playlist: MediaPlaylist,
        config: Arc<HlsConfig>,
        source: Arc<dyn PlaylistSource>,
        downloader: Arc<dyn SegmentDownloader>,
    ) -> Self {
        let pool = WorkerPool::new(downloader, config.pool_config.clone());
        Self {
            playlist,
            config,
            source,
            pool,
            state: SyncState::Uninitialized,
            polling: PollingState {
                cursor: PlaylistCursor::new(),
                consecutive_failures: 0,
                index: None,
                last_segment_at: Instant::now(),
                segments: 0,
                cycles: 0,
                stalls: 0,
                discontinuities: 0,
            },
            prefetched: None,
        }
    }

    pub fn with_prefetched_body(mut self, body: impl Into<String>) -> Self {
        self.prefetched = Some(body.into());
        self
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn playlist(&self) -> &MediaPlaylist {
        &self.playlist
    }

    pub fn cursor(&self) -> &PlaylistCursor {
        &self.polling.cursor
    }

    fn index_path(&self) -> PathBuf {
        self.playlist
            .output_dir
            .join(&self.config.output_config.index_file_name)
    }

    /// Pause before the next refresh: the target duration, but never under the
    /// configured minimum.
    pub fn pacing(&self) -> Duration {
        Duration::from_secs(self.polling.cursor.target_duration())
            .max(self.config.playlist_config.min_refresh_interval)
    }

    /// One polling cycle: fetch, parse, index and enqueue the new segments.
    ///
    /// A non-success status within the failure budget is not an error, the
    /// cycle just yields nothing and counts as a stall.
    pub async fn refresh(&mut self) -> Result<CycleOutcome, HlsError> {
        if self.state == SyncState::Uninitialized {
            self.state = SyncState::Polling;
        }
        self.polling.cycles += 1;

        let body = match self.prefetched.take() {
            Some(body) => body,
            None => match self.fetch().await? {
                Some(body) => body,
                None => {
                    self.record_stall();
                    return Ok(CycleOutcome::skipped());
                }
            },
        };

        let outcome = self.polling.cursor.apply(&body)?;
        if outcome.discontinuity.is_some() {
            self.polling.discontinuities += 1;
        }

        info!(
            total = outcome.total_segments,
            new = outcome.segments.len(),
            target_duration = self.polling.cursor.target_duration(),
            "Refresh playlist done"
        );

        let index = match self.polling.index.take() {
            Some(writer) => self.polling.index.insert(writer),
            None => {
                let writer = IndexWriter::create(self.index_path()).await?;
                self.polling.index.insert(writer)
            }
        };

        if !outcome.header.is_empty() {
            index.write_header(&outcome.header).await?;
        }

        let extension = &self.config.output_config.segment_extension;
        for record in &outcome.segments {
            let url = resolve_uri(&self.playlist.url, &record.uri)?;
            let file_name = record.file_name(extension);
            index.append_segment(record, &file_name).await?;
            info!(
                name = %file_name,
                duration = record.duration,
                uri = %record.uri,
                "New segment found"
            );
            self.pool.enqueue(DownloadTask {
                url,
                destination: self.playlist.output_dir.join(&file_name),
                sequence: record.sequence,
            });
        }
        index.sync().await?;

        let new_segments = outcome.segments.len();
        if new_segments > 0 {
            self.polling.segments += new_segments as u64;
            self.polling.last_segment_at = Instant::now();
        } else if outcome.status == StreamStatus::Live {
            self.record_stall();
        }

        Ok(CycleOutcome {
            new_segments,
            status: outcome.status,
        })
    }

    fn record_stall(&mut self) {
        self.polling.stalls += 1;
        warn!(
            stalled_secs = self.polling.last_segment_at.elapsed().as_secs(),
            stalls = self.polling.stalls,
            "No new segments since last refresh"
        );
    }

    /// `Ok(None)` when the origin answered with an error status we still tolerate.
    async fn fetch(&mut self) -> Result<Option<String>, HlsError> {
        let start_time = Utc::now();
        let started = std::time::Instant::now();
        let response = self.source.fetch(&self.playlist.url).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        if !response.status.is_success() {
            return self.record_failure(response.status).map(|()| None);
        }

        self.polling.consecutive_failures = 0;
        debug!(
            start = %start_time.to_rfc3339(),
            end = %Utc::now().to_rfc3339(),
            latency_ms,
            bytes = response.body.len(),
            "Playlist fetched"
        );
        Ok(Some(response.body))
    }

    fn record_failure(&mut self, status: StatusCode) -> Result<(), HlsError> {
        self.polling.consecutive_failures += 1;
        let failures = self.polling.consecutive_failures;
        let budget = self.config.playlist_config.max_refresh_failures;
        if failures > budget {
            return Err(HlsError::RefreshFailed { status, failures });
        }
        warn!(%status, failures, budget, "Playlist refresh answered with error status");
        Ok(())
    }

    /// Poll until the stream ends or a fatal error occurs, then wait for every
    /// queued download.
    pub async fn run(mut self) -> SyncReport {
        info!(
            url = %self.playlist.url,
            dir = %self.playlist.output_dir.display(),
            "Start mirroring media playlist"
        );
        self.pool.run();

        let mut result = loop {
            match self.refresh().await {
                Ok(CycleOutcome {
                    status: StreamStatus::Ended,
                    ..
                }) => break Ok(()),
                Ok(cycle) => {
                    let pause = self.pacing();
                    debug!(
                        new = cycle.new_segments,
                        next_sequence = ?self.polling.cursor.next_sequence(),
                        pause_ms = pause.as_millis() as u64,
                        "Refresh cycle done"
                    );
                    tokio::time::sleep(pause).await;
                }
                Err(e) => break Err(e),
            }
        };

        self.state = SyncState::Draining;
        if result.is_ok() {
            result = self.finish_index().await;
        }
        let downloads = self.pool.drain_and_stop().await;
        self.state = SyncState::Terminated;

        let termination = match result {
            Ok(()) => {
                info!(
                    segments = self.polling.segments,
                    downloaded = downloads.succeeded,
                    failed = downloads.failed,
                    "Media playlist ended"
                );
                Termination::EndOfStream
            }
            Err(e) => {
                error!(error = %e, segments = self.polling.segments, "Media playlist mirroring failed");
                Termination::Failed(e)
            }
        };

        SyncReport {
            label: self.playlist.label.clone(),
            index_path: self.index_path(),
            segments: self.polling.segments,
            cycles: self.polling.cycles,
            stalls: self.polling.stalls,
            discontinuities: self.polling.discontinuities,
            downloads,
            termination,
        }
    }

    async fn finish_index(&mut self) -> Result<(), HlsError> {
        if let Some(index) = self.polling.index.as_mut() {
            index.write_end_list().await?;
            index.sync().await?;
        }
        Ok(())
    }
}
