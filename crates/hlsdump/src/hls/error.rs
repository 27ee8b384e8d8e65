use reqwest::StatusCode;

use crate::DownloadError;

#[derive(Debug, thiserror::Error)]
pub enum HlsError {
    #[error("transport error: {0}")]
    Download(#[from] DownloadError),

    #[error("not an HLS playlist: no variant stream or segment duration tag in {url}")]
    InvalidPlaylist { url: String },

    #[error("no URI for variant with attributes `{attributes}`")]
    NoUriForVariant { attributes: String },

    #[error("BANDWIDTH attribute not found in `{attributes}`")]
    BandwidthNotFound { attributes: String },

    #[error("invalid BANDWIDTH value `{value}`")]
    InvalidBandwidth { value: String },

    #[error("malformed attribute list `{attributes}`: {reason}")]
    InvalidAttributeList { attributes: String, reason: String },

    #[error("no URI for segment {seqno}")]
    MissingSegmentUri { seqno: u64 },

    #[error("segment duration {duration} exceeds target duration {target_duration}")]
    OverflowMediaDuration { duration: f64, target_duration: u64 },

    #[error("invalid segment duration in `{line}`")]
    InvalidMediaDuration { line: String },

    #[error("invalid media sequence in `{line}`")]
    InvalidMediaSequence { line: String },

    #[error("invalid target duration in `{line}`")]
    InvalidTargetDuration { line: String },

    #[error("playlist refresh failed {failures} times in a row, last status {status}")]
    RefreshFailed { status: StatusCode, failures: u32 },
}

impl HlsError {
    /// True when the source broke the playlist grammar, as opposed to the
    /// network or the local disk failing us.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidPlaylist { .. }
                | Self::NoUriForVariant { .. }
                | Self::BandwidthNotFound { .. }
                | Self::InvalidBandwidth { .. }
                | Self::InvalidAttributeList { .. }
                | Self::MissingSegmentUri { .. }
                | Self::OverflowMediaDuration { .. }
                | Self::InvalidMediaDuration { .. }
                | Self::InvalidMediaSequence { .. }
                | Self::InvalidTargetDuration { .. }
        )
    }
}
