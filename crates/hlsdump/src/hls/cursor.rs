// Media playlist cursor: turns successive bodies of the same live playlist into
// the ordered list of segments we have not seen yet.

use chrono::{DateTime, Utc};
use std::iter::Peekable;
use tracing::{debug, error, trace, warn};

use crate::hls::HlsError;

pub(crate) const EXTINF: &str = "#EXTINF:";
pub(crate) const ENDLIST: &str = "#EXT-X-ENDLIST";
const MEDIA_SEQUENCE: &str = "#EXT-X-MEDIA-SEQUENCE:";
const TARGET_DURATION: &str = "#EXT-X-TARGETDURATION:";

/// One media segment seen for the first time.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRecord {
    pub sequence: u64,
    /// Declared duration in seconds
    pub duration: f64,
    /// URI as written in the playlist, possibly relative
    pub uri: String,
    /// The `#EXTINF:` line, verbatim
    pub inf_line: String,
    pub discovered_at: DateTime<Utc>,
}

impl SegmentRecord {
    /// Local file name of the segment, `<sequence>.<extension>`.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{extension}", self.sequence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// More segments may be published later.
    Live,
    /// `#EXT-X-ENDLIST` was seen.
    Ended,
}

/// The declared media sequence jumped past what we were tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discontinuity {
    pub expected: u64,
    pub declared: u64,
}

/// Result of feeding one playlist body to the cursor.
#[derive(Debug)]
pub struct RefreshOutcome {
    /// Segments not seen before, in sequence order.
    pub segments: Vec<SegmentRecord>,
    /// Playlist-level tag lines, only captured on the first successful refresh.
    /// The end marker is never part of it.
    pub header: Vec<String>,
    pub status: StreamStatus,
    /// Number of segment entries in the body, new or not.
    pub total_segments: usize,
    pub discontinuity: Option<Discontinuity>,
}

/// Sequence-number and pacing state of one media playlist.
///
/// Owned by exactly one synchronizer; every method takes `&mut self`.
#[derive(Debug, Clone, Default)]
pub struct PlaylistCursor {
    /// Sequence number of the next segment to emit, `None` until the first emission.
    next_sequence: Option<u64>,
    /// Last declared target duration in seconds, 0 until seen.
    target_duration: u64,
    header_captured: bool,
}

impl PlaylistCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_sequence(&self) -> Option<u64> {
        self.next_sequence
    }

    pub fn target_duration(&self) -> u64 {
        self.target_duration
    }

    /// Parse `body` and advance past every segment it introduces.
    ///
    /// On error the cursor is left exactly as it was.
    pub fn apply(&mut self, body: &str) -> Result<RefreshOutcome, HlsError> {
        let mut next = self.clone();
        let capture_header = !self.header_captured;

        let mut header = Vec::new();
        let mut segments = Vec::new();
        let mut status = StreamStatus::Live;
        let mut discontinuity = None;
        let mut total_segments = 0;
        // Sequence number of the next segment entry in this body
        let mut seqno: u64 = 0;

        let mut lines = body.lines().map(|l| l.trim_end_matches('\r')).peekable();
        while let Some(raw) = lines.next() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if line == ENDLIST {
                status = StreamStatus::Ended;
                break;
            }

            if capture_header && line.starts_with('#') && !line.starts_with(EXTINF) {
                header.push(raw.to_string());
            }

            if let Some(value) = line.strip_prefix(MEDIA_SEQUENCE) {
                let declared: u64 =
                    value
                        .trim()
                        .parse()
                        .map_err(|_| HlsError::InvalidMediaSequence {
                            line: line.to_string(),
                        })?;
                if let Some(expected) = next.next_sequence
                    && declared > expected
                {
                    warn!(
                        expected,
                        declared,
                        skipped = declared - expected,
                        "Media sequence discontinuity, segments were missed"
                    );
                    debug!(data = body, "Dump of the playlist that skipped ahead");
                    discontinuity = Some(Discontinuity { expected, declared });
                }
                seqno = declared;
                continue;
            }

            if let Some(value) = line.strip_prefix(TARGET_DURATION) {
                let target: u64 =
                    value
                        .trim()
                        .parse()
                        .map_err(|_| HlsError::InvalidTargetDuration {
                            line: line.to_string(),
                        })?;
                if next.target_duration != 0 && target != next.target_duration {
                    warn!(
                        old = next.target_duration,
                        new = target,
                        "Target duration changed"
                    );
                }
                next.target_duration = target;
                continue;
            }

            if let Some(value) = line.strip_prefix(EXTINF) {
                total_segments += 1;
                let duration =
                    parse_duration(value).ok_or_else(|| HlsError::InvalidMediaDuration {
                        line: line.to_string(),
                    })?;
                if duration.round() as u64 > next.target_duration {
                    error!(
                        duration,
                        target_duration = next.target_duration,
                        "Segment duration is larger than target duration"
                    );
                    return Err(HlsError::OverflowMediaDuration {
                        duration,
                        target_duration: next.target_duration,
                    });
                }

                let Some(uri) = take_segment_uri(&mut lines) else {
                    error!(seqno, "No URI for segment");
                    return Err(HlsError::MissingSegmentUri { seqno });
                };

                if let Some(expected) = next.next_sequence
                    && seqno < expected
                {
                    trace!(seqno, expected, "Ignoring already seen segment");
                    seqno += 1;
                    continue;
                }

                segments.push(SegmentRecord {
                    sequence: seqno,
                    duration,
                    uri: uri.to_string(),
                    inf_line: raw.to_string(),
                    discovered_at: Utc::now(),
                });
                seqno += 1;
                next.next_sequence = Some(seqno);
            }
        }

        if capture_header {
            next.header_captured = true;
        }
        *self = next;

        Ok(RefreshOutcome {
            segments,
            header,
            status,
            total_segments,
            discontinuity,
        })
    }
}

/// `#EXTINF:<duration>,[<title>]` -> duration, which must be a finite, non-negative number.
fn parse_duration(value: &str) -> Option<f64> {
    let raw = value.split(',').next().unwrap_or_default().trim();
    raw.parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// The URI belonging to the segment tag just consumed.
///
/// Tags in between (byte ranges, dates, ...) are skipped; running into the
/// next segment tag or the end of the playlist means the URI is missing.
fn take_segment_uri<'a, I>(lines: &mut Peekable<I>) -> Option<&'a str>
where
    I: Iterator<Item = &'a str>,
{
    loop {
        let line = (*lines.peek()?).trim();
        if line.is_empty() {
            lines.next();
            continue;
        }
        if line.starts_with(EXTINF) || line == ENDLIST {
            return None;
        }
        lines.next();
        if !line.starts_with('#') {
            return Some(line);
        }
    }
}
