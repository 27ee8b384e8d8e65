pub mod config;
pub mod error;
pub mod hls;
pub mod proxy;

pub use config::{DownloaderConfig, create_client};
pub use error::DownloadError;
pub use hls::{HlsConfig, HlsDumper, HlsError};
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
