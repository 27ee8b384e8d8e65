// Local layout of a mirror: output roots, variant directories and the
// per-playlist index document.

use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::DownloadError;
use crate::hls::HlsError;
use crate::hls::cursor::{ENDLIST, SegmentRecord};

/// Append-only local index of one media playlist.
///
/// Owned by a single synchronizer. Appends are buffered until [`IndexWriter::sync`].
pub struct IndexWriter {
    path: PathBuf,
    file: BufWriter<File>,
}

impl IndexWriter {
    /// Create (or truncate) the index at `path`.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self, HlsError> {
        let path = path.into();
        let file = File::create(&path)
            .await
            .map_err(|e| DownloadError::file("creating", path.display().to_string(), e))?;
        debug!(path = %path.display(), "Index created");
        Ok(Self {
            path,
            file: BufWriter::new(file),
        })
    }

    pub async fn write_header(&mut self, lines: &[String]) -> Result<(), HlsError> {
        for line in lines {
            self.write_line(line).await?;
        }
        Ok(())
    }

    /// Three lines per segment: the playlist URI as a comment, the verbatim
    /// `#EXTINF` line and the local file name.
    pub async fn append_segment(
        &mut self,
        record: &SegmentRecord,
        file_name: &str,
    ) -> Result<(), HlsError> {
        self.write_line(&format!("##{}", record.uri)).await?;
        self.write_line(&record.inf_line).await?;
        self.write_line(file_name).await
    }

    pub async fn write_end_list(&mut self) -> Result<(), HlsError> {
        self.write_line(ENDLIST).await
    }

    /// Push everything written so far down to the disk.
    pub async fn sync(&mut self) -> Result<(), HlsError> {
        self.file
            .flush()
            .await
            .map_err(|e| self.error("flushing", e))?;
        self.file
            .get_ref()
            .sync_data()
            .await
            .map_err(|e| self.error("syncing", e))?;
        Ok(())
    }

    async fn write_line(&mut self, line: &str) -> Result<(), HlsError> {
        self.file
            .write_all(line.as_bytes())
            .await
            .map_err(|e| self.error("writing", e))?;
        self.file
            .write_all(b"\n")
            .await
            .map_err(|e| self.error("writing", e))?;
        Ok(())
    }

    fn error(&self, action: &'static str, source: std::io::Error) -> HlsError {
        DownloadError::file(action, self.path.display().to_string(), source).into()
    }
}

/// Create the directory a whole mirror run writes into.
///
/// With `timestamped`, `<dest>-<unix seconds>` is used, with a numeric suffix
/// added if that name is already taken, so two runs never share a root.
pub async fn create_output_root(dest: &Path, timestamped: bool) -> Result<PathBuf, HlsError> {
    if !timestamped {
        create_dir(dest).await?;
        return Ok(dest.to_path_buf());
    }

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir(parent).await?;
    }

    let stem = format!("{}-{}", dest.display(), Utc::now().timestamp());
    let mut candidate = PathBuf::from(&stem);
    let mut suffix = 1u32;
    loop {
        match fs::create_dir(&candidate).await {
            Ok(()) => {
                debug!(path = %candidate.display(), "Output root created");
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                candidate = PathBuf::from(format!("{stem}-{suffix}"));
                suffix += 1;
            }
            Err(e) => {
                return Err(
                    DownloadError::file("creating", candidate.display().to_string(), e).into(),
                );
            }
        }
    }
}

pub async fn create_dir(path: &Path) -> Result<(), HlsError> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| DownloadError::file("creating", path.display().to_string(), e))?;
    Ok(())
}

/// Write `contents` to `path` and wait for it to reach the disk.
pub async fn write_synced(path: &Path, contents: &str) -> Result<(), HlsError> {
    let display = path.display().to_string();
    let mut file = File::create(path)
        .await
        .map_err(|e| DownloadError::file("creating", &display, e))?;
    file.write_all(contents.as_bytes())
        .await
        .map_err(|e| DownloadError::file("writing", &display, e))?;
    file.sync_all()
        .await
        .map_err(|e| DownloadError::file("syncing", &display, e))?;
    Ok(())
}

/// `<index>-<bandwidth>[-<width>]`, with the width taken from `WIDTHxHEIGHT`.
pub fn variant_dir_name(index: usize, bandwidth: u64, resolution: Option<&str>) -> String {
    let width = resolution
        .map(|r| r.split('x').next().unwrap_or(r).trim())
        .filter(|w| !w.is_empty());
    match width {
        Some(width) => format!("{index}-{bandwidth}-{width}"),
        None => format!("{index}-{bandwidth}"),
    }
}
