// Playlist retrieval: the one network call a synchronizer makes per refresh cycle.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

use crate::DownloadError;

/// Status and body of one playlist fetch.
///
/// The body is only read for success statuses; error pages are never parsed.
#[derive(Debug, Clone)]
pub struct PlaylistResponse {
    pub status: StatusCode,
    pub body: String,
}

impl PlaylistResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.into(),
        }
    }

    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }
}

/// Fetch capability handed to synchronizers.
///
/// `Err` means the origin could not be reached at all; an HTTP answer of any
/// status is an `Ok` response and the caller decides what it means.
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<PlaylistResponse, DownloadError>;
}

pub struct HttpPlaylistSource {
    client: Client,
    /// Per-request timeout, zero leaves only the client's own limits
    timeout: Duration,
}

impl HttpPlaylistSource {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl PlaylistSource for HttpPlaylistSource {
    async fn fetch(&self, url: &Url) -> Result<PlaylistResponse, DownloadError> {
        trace!(url = %url, "Fetching playlist");
        let mut request = self.client.get(url.clone());
        if !self.timeout.is_zero() {
            request = request.timeout(self.timeout);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, %status, "Playlist request answered with error status");
            return Ok(PlaylistResponse::status(status));
        }

        let body = response.text().await?;
        Ok(PlaylistResponse { status, body })
    }
}

/// Parse a user supplied source and make sure we can fetch it over HTTP.
pub fn parse_source_url(input: &str) -> Result<Url, DownloadError> {
    let url = Url::parse(input.trim()).map_err(|e| DownloadError::invalid_url(input, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(DownloadError::UnsupportedProtocol {
            protocol: other.to_string(),
        }),
    }
}

/// Resolve a playlist or segment reference against the document it came from.
pub fn resolve_uri(base: &Url, uri: &str) -> Result<Url, DownloadError> {
    base.join(uri)
        .map_err(|e| DownloadError::invalid_url(uri, e.to_string()))
}
