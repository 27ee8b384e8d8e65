// Live HLS mirroring: detection, per-playlist synchronization, segment download pool
// and master playlist fan-out.

mod attributes;
pub mod config;
mod cursor;
mod detector;
mod dumper;
pub mod error;
mod fetcher;
mod master;
mod output;
mod playlist;
pub mod retry;
mod synchronizer;
mod worker_pool;

// Re-exports for easier access
pub use attributes::parse_attribute_list;
pub use config::{HlsConfig, HlsOutputConfig, HlsPlaylistConfig, WorkerPoolConfig};
pub use cursor::{
    Discontinuity, PlaylistCursor, RefreshOutcome, SegmentRecord, StreamStatus,
};
pub use detector::{PlaylistKind, detect_playlist_kind};
pub use dumper::{DumpReport, HlsDumper};
pub use error::HlsError;
pub use fetcher::{SegmentDownloader, SegmentFetcher};
pub use master::{
    MasterPlaylistOrchestrator, MasterReport, ParsedMasterPlaylist, VariantDescriptor,
    parse_master_playlist,
};
pub use output::IndexWriter;
pub use playlist::{
    HttpPlaylistSource, PlaylistResponse, PlaylistSource, parse_source_url, resolve_uri,
};
pub use retry::{RetryAction, RetryOutcome, RetryPolicy, retry_with_backoff};
pub use synchronizer::{
    CycleOutcome, MediaPlaylist, MediaPlaylistSynchronizer, SyncReport, SyncState, Termination,
};
pub use worker_pool::{DownloadTask, PoolSummary, TaskQueue, WorkerPool};
