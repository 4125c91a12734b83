use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use super::commands::FetchCommandBuilder;
use super::info::InfoRetriever;
use super::process::ProcessSpawner;
use super::runner::ProcessRunner;
use super::DownloaderTrait;
use crate::config::DownloaderConfig;
use crate::error::ErrorKind;
use crate::models::{validate_url, DownloadRequest, DownloadResult, OutputLine, StatusLine, VideoInfo};
use crate::sink::OutputSink;

/// yt-dlp backed downloader
pub struct YtDlpDownloader {
    builder: FetchCommandBuilder,
    runner: ProcessRunner,
    info: InfoRetriever,
}

impl YtDlpDownloader {
    pub fn new(config: &DownloaderConfig, spawner: Arc<dyn ProcessSpawner>) -> Self {
        let builder = FetchCommandBuilder::new(&config.binary_path)
            .with_ffmpeg(config.ffmpeg_path.as_deref())
            .with_extra_args(config.extra_args.clone());
        let runner = ProcessRunner::new(spawner)
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_grace_period(Duration::from_secs(config.grace_period_secs));
        let info = InfoRetriever::new(builder.clone(), runner.clone());

        Self { builder, runner, info }
    }

    async fn run_request(
        &self,
        request: &DownloadRequest,
        sink: &dyn OutputSink,
        cancel: &CancellationToken,
    ) -> DownloadResult {
        if let Err(error) = validate_url(request.url()) {
            return DownloadResult::from(error);
        }

        if let Err(e) = tokio::fs::create_dir_all(request.output_dir()).await {
            return DownloadResult::Failed {
                error: ErrorKind::ExternalTool {
                    exit_code: None,
                    message: Some(format!(
                        "cannot create output directory {}: {}",
                        request.output_dir().display(),
                        e
                    )),
                },
            };
        }

        let command = self.builder.download(request);
        info!("Downloading {} ({}, audio_only={})", request.url(), request.quality(), request.audio_only());

        let mut forward = |event: &OutputLine| match event {
            OutputLine::Progress(progress) => sink.progress(progress),
            OutputLine::Status(status) => report_status(status, sink),
        };
        self.runner.run(&command, &mut forward, cancel).await
    }
}

/// Surface the status lines a user cares about
fn report_status(status: &StatusLine, sink: &dyn OutputSink) {
    match status {
        StatusLine::Title(title) => sink.info(&format!("Downloading: {}", title)),
        StatusLine::Merging(path) => sink.info(&format!("Merging formats into {}", path.display())),
        StatusLine::Converting(path) => sink.info(&format!("Converting to {}", path.display())),
        StatusLine::AlreadyDownloaded(path) => {
            sink.info(&format!("Already downloaded: {}", path.display()))
        }
        other => debug!("{:?}", other),
    }
}

#[async_trait]
impl DownloaderTrait for YtDlpDownloader {
    async fn download(
        &self,
        request: &DownloadRequest,
        sink: &dyn OutputSink,
        cancel: &CancellationToken,
    ) -> DownloadResult {
        let span = info_span!("download", request_id = %request.id(), url = %request.url());
        let result = self.run_request(request, sink, cancel).instrument(span).await;

        match &result {
            DownloadResult::Success { output_path } => {
                sink.info(&format!("Download completed: {}", output_path.display()))
            }
            DownloadResult::Failed { error } => {
                sink.error(&format!("Download failed [{}]: {}", error.code(), error))
            }
            DownloadResult::Cancelled => sink.info("Download cancelled"),
        }

        result
    }

    async fn fetch_info(&self, url: &str, cancel: &CancellationToken) -> Result<VideoInfo, ErrorKind> {
        validate_url(url)?;
        let span = info_span!("info", url = %url);
        self.info.fetch(url, cancel).instrument(span).await
    }

    fn check_availability(&self) -> Result<PathBuf, ErrorKind> {
        let mut probe = self.builder.metadata("https://example.com");
        if let Some(ffmpeg) = self.builder.ffmpeg_path() {
            probe = probe.ffmpeg_location(ffmpeg);
        }
        self.runner.check_tools(&probe)
    }
}
