use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::commands::FetchCommandBuilder;
use super::runner::ProcessRunner;
use crate::error::ErrorKind;
use crate::models::{FormatDescriptor, VideoInfo};

/// The subset of yt-dlp's `--dump-json` document we read
#[derive(Debug, Clone, Deserialize)]
pub struct YtDlpInfoOutput {
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub channel: Option<String>,
    #[serde(default)]
    pub formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YtDlpFormat {
    pub format_id: String,
    pub ext: Option<String>,
    pub resolution: Option<String>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub filesize: Option<u64>,
    pub filesize_approx: Option<u64>,
    pub format_note: Option<String>,
}

/// Converts the binary's JSON into `VideoInfo`
pub struct InfoMapper;

impl InfoMapper {
    pub fn to_video_info(output: YtDlpInfoOutput) -> Result<VideoInfo, ErrorKind> {
        let title = output
            .title
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ErrorKind::MetadataUnavailable("document has no title".to_string()))?;

        let duration_seconds = output
            .duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(|d| d.round() as u64)
            .unwrap_or(0);

        let available_formats = output
            .formats
            .into_iter()
            .map(|f| FormatDescriptor {
                format_id: f.format_id,
                extension: f.ext.unwrap_or_else(|| "unknown".to_string()),
                resolution: f.resolution,
                height: f.height,
                fps: f.fps,
                video_codec: f.vcodec,
                audio_codec: f.acodec,
                filesize: f.filesize.or(f.filesize_approx),
                note: f.format_note,
            })
            .collect();

        Ok(VideoInfo {
            title,
            duration_seconds,
            uploader: output
                .uploader
                .or(output.channel)
                .unwrap_or_else(|| "Unknown".to_string()),
            available_formats,
        })
    }

    /// Decode the last JSON object line of the captured output
    pub fn from_lines(lines: &[String]) -> Result<VideoInfo, ErrorKind> {
        let document = lines
            .iter()
            .rev()
            .map(|line| line.trim())
            .find(|line| line.starts_with('{'))
            .ok_or_else(|| ErrorKind::MetadataUnavailable("no metadata document in output".to_string()))?;

        let output: YtDlpInfoOutput = serde_json::from_str(document)
            .map_err(|e| ErrorKind::MetadataUnavailable(format!("malformed metadata: {}", e)))?;

        Self::to_video_info(output)
    }
}

/// Runs the binary in metadata mode
#[derive(Clone)]
pub struct InfoRetriever {
    builder: FetchCommandBuilder,
    runner: ProcessRunner,
}

impl InfoRetriever {
    pub fn new(builder: FetchCommandBuilder, runner: ProcessRunner) -> Self {
        Self { builder, runner }
    }

    pub async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<VideoInfo, ErrorKind> {
        let command = self.builder.metadata(url);
        let captured = self.runner.capture(&command, cancel).await.map_err(|e| match e {
            ErrorKind::BinaryNotFound(_) | ErrorKind::Cancelled => e,
            other => ErrorKind::MetadataUnavailable(other.to_string()),
        })?;

        if captured.exit_code != Some(0) {
            let reason = captured
                .lines
                .iter()
                .rev()
                .find(|line| line.starts_with("ERROR:"))
                .cloned()
                .unwrap_or_else(|| match captured.exit_code {
                    Some(code) => format!("exit code {}", code),
                    None => "terminated by signal".to_string(),
                });
            warn!("Metadata query for {} failed: {}", url, reason);
            return Err(ErrorKind::MetadataUnavailable(reason));
        }

        let info = InfoMapper::from_lines(&captured.lines)?;
        debug!("Metadata for {}: {} formats", url, info.available_formats.len());
        Ok(info)
    }
}
