// Entry point of a mirror run: fetch the root playlist once, classify it and hand
// it to the matching engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span};

use crate::hls::HlsError;
use crate::hls::config::HlsConfig;
use crate::hls::detector::{PlaylistKind, detect_playlist_kind};
use crate::hls::fetcher::{SegmentDownloader, SegmentFetcher};
use crate::hls::master::{MasterPlaylistOrchestrator, MasterReport};
use crate::hls::output::create_output_root;
use crate::hls::playlist::{HttpPlaylistSource, PlaylistSource, parse_source_url};
use crate::hls::synchronizer::{MediaPlaylist, MediaPlaylistSynchronizer, SyncReport};
use crate::{DownloadError, create_client};

/// What a finished run produced.
#[derive(Debug)]
pub enum DumpReport {
    Media { root: PathBuf, report: SyncReport },
    Master(MasterReport),
}

impl DumpReport {
    pub fn root(&self) -> &Path {
        match self {
            Self::Media { root, .. } => root,
            Self::Master(report) => &report.root,
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            Self::Media { report, .. } => report.is_success(),
            Self::Master(report) => report.is_success(),
        }
    }
}

pub struct HlsDumper {
    config: Arc<HlsConfig>,
    source: Arc<dyn PlaylistSource>,
    downloader: Arc<dyn SegmentDownloader>,
}

impl HlsDumper {
    /// Build a dumper talking HTTP through a client made from `config.base`.
    pub fn new(config: HlsConfig) -> Result<Self, DownloadError> {
        let client = create_client(&config.base)?;
        let source = Arc::new(HttpPlaylistSource::new(
            client.clone(),
            config.playlist_config.playlist_fetch_timeout,
        ));
        let downloader = Arc::new(SegmentFetcher::new(client));
        Ok(Self::with_components(config, source, downloader))
    }

    pub fn with_components(
        config: HlsConfig,
        source: Arc<dyn PlaylistSource>,
        downloader: Arc<dyn SegmentDownloader>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            source,
            downloader,
        }
    }

    /// Mirror the playlist at `source_url` into a new directory derived from `dest`.
    ///
    /// `Err` means nothing could be started. Failures after that, including a
    /// failing media playlist, are part of the returned report.
    pub async fn dump(&self, source_url: &str, dest: &Path) -> Result<DumpReport, HlsError> {
        let url = parse_source_url(source_url)?;

        let response = self.source.fetch(&url).await?;
        if !response.status.is_success() {
            error!(url = %url, status = %response.status, "Failed to fetch playlist");
            return Err(DownloadError::http_status(response.status, url.as_str(), "playlist").into());
        }

        match detect_playlist_kind(&response.body) {
            PlaylistKind::Invalid => {
                error!(url = %url, "Not an HLS playlist");
                Err(HlsError::InvalidPlaylist {
                    url: url.to_string(),
                })
            }
            PlaylistKind::Master => {
                info!(url = %url, "Master playlist detected");
                let orchestrator = MasterPlaylistOrchestrator::new(
                    Arc::clone(&self.config),
                    Arc::clone(&self.source),
                    Arc::clone(&self.downloader),
                );
                let report = orchestrator.load(&response.body, &url, dest).await?;
                Ok(DumpReport::Master(report))
            }
            PlaylistKind::Media => {
                info!(url = %url, "Media playlist detected");
                let root =
                    create_output_root(dest, self.config.output_config.timestamp_root_dir).await?;
                let playlist = MediaPlaylist::new(url, &root, "media");
                let report = MediaPlaylistSynchronizer::new(
                    playlist,
                    Arc::clone(&self.config),
                    Arc::clone(&self.source),
                    Arc::clone(&self.downloader),
                )
                .with_prefetched_body(response.body)
                .run()
                .instrument(info_span!("media"))
                .await;
                Ok(DumpReport::Media { root, report })
            }
        }
    }
}
