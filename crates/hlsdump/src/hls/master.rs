// Master playlist fan-out: one output directory and one synchronizer per variant,
// all running concurrently until each of them is done.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, info_span, warn};
use url::Url;

use crate::hls::HlsError;
use crate::hls::attributes::parse_attribute_list;
use crate::hls::config::HlsConfig;
use crate::hls::fetcher::SegmentDownloader;
use crate::hls::output::{create_dir, create_output_root, variant_dir_name, write_synced};
use crate::hls::playlist::{PlaylistSource, resolve_uri};
use crate::hls::synchronizer::{MediaPlaylist, MediaPlaylistSynchronizer, SyncReport};

const STREAM_INF: &str = "#EXT-X-STREAM-INF:";

/// One variant stream of a master playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantDescriptor {
    /// Absolute URL of the variant's media playlist
    pub url: Url,
    pub bandwidth: u64,
    pub average_bandwidth: Option<u64>,
    pub codecs: Option<String>,
    pub resolution: Option<String>,
    pub frame_rate: Option<f64>,
    pub audio_group: Option<String>,
    pub video_group: Option<String>,
    /// Directory of this variant under the output root
    pub dir_name: String,
}

/// A parsed master playlist together with its local mirror.
#[derive(Debug, Clone)]
pub struct ParsedMasterPlaylist {
    pub variants: Vec<VariantDescriptor>,
    /// The fetched document with every variant URI replaced by the local index path
    pub index: String,
}

/// Parse `body`, resolving variant URIs against `base_url`.
///
/// Any malformed variant rejects the whole document.
pub fn parse_master_playlist(
    body: &str,
    base_url: &Url,
    index_file_name: &str,
) -> Result<ParsedMasterPlaylist, HlsError> {
    let mut variants = Vec::new();
    let mut index = String::with_capacity(body.len());
    let mut lines = body.lines().map(|l| l.trim_end_matches('\r'));

    while let Some(raw) = lines.next() {
        push_line(&mut index, raw);

        let Some(attributes) = raw.trim().strip_prefix(STREAM_INF) else {
            continue;
        };

        // blank lines before the URI are mirrored as they are
        let uri = loop {
            match lines.next().map(|l| (l, l.trim())) {
                Some((blank, "")) => push_line(&mut index, blank),
                Some((_, uri)) if !uri.starts_with('#') => break Some(uri),
                _ => break None,
            }
        }
        .ok_or_else(|| HlsError::NoUriForVariant {
            attributes: attributes.to_string(),
        })?;

        let variant = parse_variant(attributes, uri, base_url, variants.len())?;
        index.push_str(&format!("{}/{index_file_name}\n", variant.dir_name));
        variants.push(variant);
    }

    Ok(ParsedMasterPlaylist { variants, index })
}

fn push_line(index: &mut String, line: &str) {
    index.push_str(line);
    index.push('\n');
}

fn parse_variant(
    attributes: &str,
    uri: &str,
    base_url: &Url,
    ordinal: usize,
) -> Result<VariantDescriptor, HlsError> {
    let mut attrs = parse_attribute_list(attributes)?;

    let raw_bandwidth = attrs
        .remove("BANDWIDTH")
        .ok_or_else(|| HlsError::BandwidthNotFound {
            attributes: attributes.to_string(),
        })?;
    let bandwidth = raw_bandwidth
        .parse::<u64>()
        .ok()
        .filter(|b| *b > 0)
        .ok_or(HlsError::InvalidBandwidth {
            value: raw_bandwidth,
        })?;

    let resolution = attrs.remove("RESOLUTION");
    let dir_name = variant_dir_name(ordinal, bandwidth, resolution.as_deref());

    Ok(VariantDescriptor {
        url: resolve_uri(base_url, uri)?,
        bandwidth,
        average_bandwidth: attrs
            .remove("AVERAGE-BANDWIDTH")
            .and_then(|v| v.parse().ok()),
        codecs: attrs.remove("CODECS"),
        resolution,
        frame_rate: attrs.remove("FRAME-RATE").and_then(|v| v.parse().ok()),
        audio_group: attrs.remove("AUDIO"),
        video_group: attrs.remove("VIDEO"),
        dir_name,
    })
}

/// Outcome of a whole master playlist mirror.
#[derive(Debug)]
pub struct MasterReport {
    pub root: PathBuf,
    pub variants: Vec<SyncReport>,
    /// Synchronizer tasks that panicked and produced no report
    pub aborted: usize,
}

impl MasterReport {
    pub fn failed(&self) -> usize {
        self.aborted + self.variants.iter().filter(|r| !r.is_success()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

pub struct MasterPlaylistOrchestrator {
    config: Arc<HlsConfig>,
    source: Arc<dyn PlaylistSource>,
    downloader: Arc<dyn SegmentDownloader>,
}

impl MasterPlaylistOrchestrator {
    pub fn new(
        config: Arc<HlsConfig>,
        source: Arc<dyn PlaylistSource>,
        downloader: Arc<dyn SegmentDownloader>,
    ) -> Self {
        Self {
            config,
            source,
            downloader,
        }
    }

    /// Mirror every variant of an already fetched master playlist under `dest`.
    ///
    /// Returns once every variant's synchronizer has terminated. A failing
    /// variant never stops its siblings.
    pub async fn load(
        &self,
        body: &str,
        base_url: &Url,
        dest: &Path,
    ) -> Result<MasterReport, HlsError> {
        let output = &self.config.output_config;
        let parsed = parse_master_playlist(body, base_url, &output.index_file_name)?;
        if parsed.variants.is_empty() {
            return Err(HlsError::InvalidPlaylist {
                url: base_url.to_string(),
            });
        }

        let root = create_output_root(dest, output.timestamp_root_dir).await?;
        for variant in &parsed.variants {
            create_dir(&root.join(&variant.dir_name)).await?;
        }
        write_synced(&root.join(&output.index_file_name), &parsed.index).await?;
        info!(
            root = %root.display(),
            variants = parsed.variants.len(),
            "Master playlist mirrored, starting variants"
        );

        let mut set = JoinSet::new();
        for variant in parsed.variants {
            info!(
                variant = %variant.dir_name,
                bandwidth = variant.bandwidth,
                resolution = variant.resolution.as_deref().unwrap_or("-"),
                codecs = variant.codecs.as_deref().unwrap_or("-"),
                url = %variant.url,
                "Adding variant"
            );
            let span = info_span!("variant", name = %variant.dir_name);
            let playlist = MediaPlaylist::new(
                variant.url,
                root.join(&variant.dir_name),
                variant.dir_name,
            );
            let synchronizer = MediaPlaylistSynchronizer::new(
                playlist,
                Arc::clone(&self.config),
                Arc::clone(&self.source),
                Arc::clone(&self.downloader),
            );
            set.spawn(synchronizer.run().instrument(span));
        }

        let mut reports = Vec::new();
        let mut aborted = 0;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(report) => {
                    if !report.is_success() {
                        warn!(variant = %report.label, "Variant stopped with an error");
                    }
                    reports.push(report);
                }
                Err(e) => {
                    aborted += 1;
                    error!(error = %e, "Variant task aborted");
                }
            }
        }
        reports.sort_by(|a, b| a.label.cmp(&b.label));

        let report = MasterReport {
            root,
            variants: reports,
            aborted,
        };
        info!(
            variants = report.variants.len() + report.aborted,
            failed = report.failed(),
            "All variants finished"
        );
        Ok(report)
    }
}
