//! Tells a variant-selection (master) playlist from a media playlist by
//! looking at the first tag that only one of them can carry.

/// Tags that only appear in master playlists.
const MASTER_TAGS: [&str; 2] = ["#EXT-X-STREAM-INF:", "#EXT-X-MEDIA:"];

/// Tag that only appears in media playlists.
const SEGMENT_TAG: &str = "#EXTINF:";

/// Classification of a freshly fetched playlist body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistKind {
    /// Neither a variant stream nor a segment was found.
    Invalid,
    /// Lists variants, each pointing to its own media playlist.
    Master,
    /// Lists media segments.
    Media,
}

/// Classify `body` without consuming or modifying it.
///
/// Lines are scanned in order and the first decisive tag wins.
pub fn detect_playlist_kind(body: &str) -> PlaylistKind {
    for line in body.lines() {
        let line = line.trim();
        if MASTER_TAGS.iter().any(|tag| line.starts_with(tag)) {
            return PlaylistKind::Master;
        }
        if line.starts_with(SEGMENT_TAG) {
            return PlaylistKind::Media;
        }
    }
    PlaylistKind::Invalid
}
