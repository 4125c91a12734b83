// Download orchestration over the external fetcher binary
//
// - Commands: argument vectors for downloads and metadata queries
// - Parser: line-by-line decoding of the binary's output
// - Process: spawning capability, swappable for an in-memory fake
// - Runner: supervision, cancellation, timeouts and result resolution
// - Info: metadata queries decoded into VideoInfo
// - Downloader: the pieces above behind DownloaderTrait

pub mod commands;
pub mod downloader;
pub mod info;
pub mod parser;
pub mod process;
pub mod runner;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use commands::*;
pub use downloader::*;
pub use info::{InfoMapper, InfoRetriever};
pub use parser::parse_line;
pub use process::{ProcessHandle, ProcessSpawner, TokioSpawner};
pub use runner::ProcessRunner;

use crate::config::DownloaderConfig;
use crate::error::ErrorKind;
use crate::models::{DownloadRequest, DownloadResult, VideoInfo};
use crate::sink::OutputSink;

/// Main trait for download operations
#[async_trait]
pub trait DownloaderTrait: Send + Sync {
    /// Download one request; always yields exactly one result
    async fn download(
        &self,
        request: &DownloadRequest,
        sink: &dyn OutputSink,
        cancel: &CancellationToken,
    ) -> DownloadResult;

    /// Query metadata without downloading
    async fn fetch_info(&self, url: &str, cancel: &CancellationToken) -> Result<VideoInfo, ErrorKind>;

    /// Check that the binary and its helper tools can be executed
    fn check_availability(&self) -> Result<PathBuf, ErrorKind>;
}

/// Factory for creating downloader instances
pub struct DownloaderFactory;

impl DownloaderFactory {
    /// yt-dlp driven through real child processes
    pub fn create_downloader(config: &DownloaderConfig) -> Box<dyn DownloaderTrait> {
        Self::create_with_spawner(config, Arc::new(TokioSpawner))
    }

    /// yt-dlp driven through the given spawning capability
    pub fn create_with_spawner(
        config: &DownloaderConfig,
        spawner: Arc<dyn ProcessSpawner>,
    ) -> Box<dyn DownloaderTrait> {
        Box::new(YtDlpDownloader::new(config, spawner))
    }
}
