use clap::Parser;
use hlsdump_engine::ProxyType;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "hlsdump",
    version,
    about = "Mirror a live or on-demand HLS playlist tree to local storage"
)]
pub struct Args {
    /// Playlist URL, master or media
    pub url: String,

    /// Output directory; `-<unix time>` is appended unless --no-timestamp is given
    pub output_dir: PathBuf,

    /// Timeout of every playlist and segment request in seconds, 0 to disable
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Download attempts per segment
    #[arg(long, default_value_t = 3)]
    pub retry: u32,

    /// Concurrent segment downloads per media playlist
    #[arg(long, default_value_t = 5)]
    pub workers: usize,

    /// Delay before the first retry of a segment in milliseconds, 0 retries immediately
    #[arg(long, default_value_t = 500)]
    pub retry_delay: u64,

    /// Proxy server URL
    #[arg(long)]
    pub proxy: Option<String>,

    #[arg(long, value_enum, default_value_t = ProxyType::Http)]
    pub proxy_type: ProxyType,

    #[arg(long, requires = "proxy")]
    pub proxy_user: Option<String>,

    #[arg(long, requires = "proxy_user")]
    pub proxy_pass: Option<String>,

    /// Ignore HTTP_PROXY / HTTPS_PROXY from the environment
    #[arg(long)]
    pub no_system_proxy: bool,

    /// Treat HTTP redirects as errors instead of following them
    #[arg(long)]
    pub no_follow_redirects: bool,

    /// Extra request header, `Name: value` (repeatable)
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Write the output into exactly the given directory
    #[arg(long)]
    pub no_timestamp: bool,

    /// Log file directory, logs go to stdout when absent
    #[arg(long)]
    pub logdir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}
