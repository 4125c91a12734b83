use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;
use uuid::Uuid;

use crate::error::ErrorKind;

/// Requested video quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "worst")]
    Worst,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
}

impl Quality {
    pub const ALL: [Quality; 5] = [
        Quality::Best,
        Quality::Worst,
        Quality::P1080,
        Quality::P720,
        Quality::P480,
    ];

    /// Height cap in pixels, if this quality is a resolution
    pub fn max_height(&self) -> Option<u32> {
        match self {
            Quality::P1080 => Some(1080),
            Quality::P720 => Some(720),
            Quality::P480 => Some(480),
            Quality::Best | Quality::Worst => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Best => "best",
            Quality::Worst => "worst",
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
            Quality::P480 => "480p",
        }
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality::Best
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Quality::ALL
            .iter()
            .copied()
            .find(|q| q.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "Invalid quality '{}'. Valid values: best, worst, 1080p, 720p, 480p",
                    s
                )
            })
    }
}

/// Defaults that seed every request of a session.
///
/// Fixed for the lifetime of a session: built once from configuration and
/// preset flags, then only read.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub quality: Quality,
    pub output_dir: PathBuf,
    pub audio_only: bool,
    /// Container for video downloads (e.g. "mp4")
    pub container_format: String,
    /// Container for extracted audio (e.g. "mp3")
    pub audio_format: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            quality: Quality::Best,
            output_dir: PathBuf::from("downloads"),
            audio_only: false,
            container_format: "mp4".to_string(),
            audio_format: "mp3".to_string(),
        }
    }
}

impl fmt::Display for SessionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "quality={}, output={}, audio_only={}",
            self.quality,
            self.output_dir.display(),
            self.audio_only
        )
    }
}

/// One download attempt. Fields are private so nothing can change a
/// request once it has been built.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    id: Uuid,
    url: String,
    quality: Quality,
    output_dir: PathBuf,
    audio_only: bool,
    container_format: String,
    audio_format: String,
}

impl DownloadRequest {
    /// Build a request for `url` using the session defaults
    pub fn new<S: Into<String>>(url: S, settings: &SessionSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            quality: settings.quality,
            output_dir: settings.output_dir.clone(),
            audio_only: settings.audio_only,
            container_format: settings.container_format.clone(),
            audio_format: settings.audio_format.clone(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn audio_only(&self) -> bool {
        self.audio_only
    }

    pub fn container_format(&self) -> &str {
        &self.container_format
    }

    pub fn audio_format(&self) -> &str {
        &self.audio_format
    }

    /// Extension the final file is expected to carry
    pub fn expected_extension(&self) -> &str {
        if self.audio_only {
            &self.audio_format
        } else {
            &self.container_format
        }
    }
}

/// Check that `input` is an absolute http(s) URL with a host.
pub fn validate_url(input: &str) -> Result<Url, ErrorKind> {
    let trimmed = input.trim();
    let parsed = Url::parse(trimmed).map_err(|_| ErrorKind::InvalidUrl(trimmed.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        _ => return Err(ErrorKind::InvalidUrl(trimmed.to_string())),
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ErrorKind::InvalidUrl(trimmed.to_string()));
    }

    Ok(parsed)
}

/// Metadata for a single video, as reported by the external binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub title: String,
    pub duration_seconds: u64,
    pub uploader: String,
    pub available_formats: Vec<FormatDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub format_id: String,
    pub extension: String,
    pub resolution: Option<String>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub filesize: Option<u64>,
    pub note: Option<String>,
}

impl FormatDescriptor {
    pub fn has_video(&self) -> bool {
        codec_present(&self.video_codec)
    }

    pub fn has_audio(&self) -> bool {
        codec_present(&self.audio_codec)
    }
}

fn codec_present(codec: &Option<String>) -> bool {
    matches!(codec.as_deref(), Some(c) if c != "none")
}

/// Processing stage a progress event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Downloading,
    Converting,
    Merging,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Downloading => f.write_str("downloading"),
            Stage::Converting => f.write_str("converting"),
            Stage::Merging => f.write_str("merging"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Always within [0, 100]
    pub percent: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub speed_bytes_per_sec: Option<f64>,
    pub eta_seconds: Option<u64>,
    pub stage: Stage,
}

impl ProgressEvent {
    pub fn new(percent: f64, stage: Stage) -> Self {
        Self {
            percent: clamp_percent(percent),
            downloaded_bytes: 0,
            total_bytes: None,
            speed_bytes_per_sec: None,
            eta_seconds: None,
            stage,
        }
    }
}

/// Clamp to [0, 100]; NaN becomes 0.
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// A recognised non-progress line from the external binary
#[derive(Debug, Clone, PartialEq)]
pub enum StatusLine {
    /// Final location of the finished file
    Destination(PathBuf),
    /// File a download stream is being written to
    DownloadTarget(PathBuf),
    AlreadyDownloaded(PathBuf),
    Merging(PathBuf),
    /// Audio extraction or remux into a new file
    Converting(PathBuf),
    /// A post-processor started or finished
    Postprocess { stage: Stage, name: String },
    Title(String),
    Warning(String),
    Error(String),
}

impl StatusLine {
    /// Path this line reports as the (current) output file, if any
    pub fn output_path(&self) -> Option<&Path> {
        match self {
            StatusLine::Destination(p)
            | StatusLine::DownloadTarget(p)
            | StatusLine::AlreadyDownloaded(p)
            | StatusLine::Merging(p)
            | StatusLine::Converting(p) => Some(p),
            _ => None,
        }
    }
}

/// What one line of subprocess output decoded to
#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    Progress(ProgressEvent),
    Status(StatusLine),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Success,
    Failed,
    Cancelled,
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadStatus::Success => f.write_str("success"),
            DownloadStatus::Failed => f.write_str("failed"),
            DownloadStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Terminal outcome of one request; exactly one is produced per request.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadResult {
    Success { output_path: PathBuf },
    Failed { error: ErrorKind },
    Cancelled,
}

impl DownloadResult {
    pub fn status(&self) -> DownloadStatus {
        match self {
            DownloadResult::Success { .. } => DownloadStatus::Success,
            DownloadResult::Failed { .. } => DownloadStatus::Failed,
            DownloadResult::Cancelled => DownloadStatus::Cancelled,
        }
    }

    pub fn output_path(&self) -> Option<&Path> {
        match self {
            DownloadResult::Success { output_path } => Some(output_path),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorKind> {
        match self {
            DownloadResult::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DownloadResult::Success { .. })
    }
}

impl From<ErrorKind> for DownloadResult {
    fn from(error: ErrorKind) -> Self {
        match error {
            ErrorKind::Cancelled => DownloadResult::Cancelled,
            error => DownloadResult::Failed { error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_parsing() {
        assert_eq!("720p".parse::<Quality>().unwrap(), Quality::P720);
        assert_eq!("BEST".parse::<Quality>().unwrap(), Quality::Best);
        assert!("4k".parse::<Quality>().is_err());
        assert_eq!(Quality::P1080.max_height(), Some(1080));
        assert_eq!(Quality::Worst.max_height(), None);
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/v1").is_ok());
        assert!(validate_url("  http://youtu.be/abc  ").is_ok());
        assert_eq!(
            validate_url("not-a-url"),
            Err(ErrorKind::InvalidUrl("not-a-url".to_string()))
        );
        assert!(validate_url("ftp://example.com/file").is_err());
        assert!(validate_url("file:///etc/passwd").is_err());
        assert!(validate_url("/relative/path").is_err());
    }

    #[test]
    fn test_request_takes_session_defaults() {
        let settings = SessionSettings {
            quality: Quality::P720,
            output_dir: PathBuf::from("/custom/output"),
            audio_only: true,
            ..SessionSettings::default()
        };
        let request = DownloadRequest::new("https://example.com/v1", &settings);

        assert_eq!(request.url(), "https://example.com/v1");
        assert_eq!(request.quality(), Quality::P720);
        assert_eq!(request.output_dir(), Path::new("/custom/output"));
        assert_eq!(request.expected_extension(), "mp3");
    }

    #[test]
    fn test_result_invariants() {
        let ok = DownloadResult::Success { output_path: PathBuf::from("a.mp4") };
        assert_eq!(ok.status(), DownloadStatus::Success);
        assert!(ok.error().is_none());

        let failed = DownloadResult::from(ErrorKind::IndeterminateOutput);
        assert_eq!(failed.status(), DownloadStatus::Failed);
        assert!(failed.output_path().is_none());

        assert_eq!(DownloadResult::from(ErrorKind::Cancelled), DownloadResult::Cancelled);
    }

    #[test]
    fn test_clamp_percent() {
        assert_eq!(clamp_percent(150.0), 100.0);
        assert_eq!(clamp_percent(-3.0), 0.0);
        assert_eq!(clamp_percent(f64::NAN), 0.0);
        assert_eq!(clamp_percent(42.5), 42.5);
    }
}
