// Segment fetcher: performs one download attempt of a segment, landing it on disk whole.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use crate::DownloadError;
use crate::hls::worker_pool::DownloadTask;

/// One attempt at materializing a task's destination file.
///
/// Returns the number of bytes written. Retrying is the caller's business.
#[async_trait]
pub trait SegmentDownloader: Send + Sync {
    async fn download(&self, task: &DownloadTask) -> Result<u64, DownloadError>;
}

pub struct SegmentFetcher {
    http_client: Client,
}

impl SegmentFetcher {
    pub fn new(http_client: Client) -> Self {
        Self { http_client }
    }
}

/// `<destination>.part`, where the body lands until it is complete.
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

async fn write_body(response: Response, path: &Path, sequence: u64) -> Result<u64, DownloadError> {
    let display = path.display().to_string();
    let mut file = File::create(path)
        .await
        .map_err(|e| DownloadError::file("creating", &display, e))?;

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::file("writing", &display, e))?;
        written += chunk.len() as u64;
        trace!(sequence, bytes = written, "Segment chunk written");
    }

    file.flush()
        .await
        .map_err(|e| DownloadError::file("flushing", &display, e))?;
    file.sync_all()
        .await
        .map_err(|e| DownloadError::file("syncing", &display, e))?;
    Ok(written)
}

#[async_trait]
impl SegmentDownloader for SegmentFetcher {
    async fn download(&self, task: &DownloadTask) -> Result<u64, DownloadError> {
        let download_start = std::time::Instant::now();

        let response = self.http_client.get(task.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(
                status,
                task.url.as_str(),
                "segment download",
            ));
        }

        // The destination only ever appears complete.
        let partial = partial_path(&task.destination);
        let written = match write_body(response, &partial, task.sequence).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(remove_err) = fs::remove_file(&partial).await {
                    warn!(
                        path = %partial.display(),
                        error = %remove_err,
                        "Failed to remove partial segment"
                    );
                }
                return Err(e);
            }
        };
        fs::rename(&partial, &task.destination).await.map_err(|e| {
            DownloadError::file("renaming", partial.display().to_string(), e)
        })?;

        debug!(
            sequence = task.sequence,
            bytes = written,
            latency_ms = download_start.elapsed().as_millis() as u64,
            "Segment stored"
        );
        Ok(written)
    }
}
