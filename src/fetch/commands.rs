use std::fmt;
use std::path::{Path, PathBuf};

use crate::models::{DownloadRequest, Quality};

/// Prefix of the machine-readable download progress line
pub const PROGRESS_MARKER: &str = "[ytdl-progress]";
/// Prefix of the machine-readable post-processing line
pub const POSTPROCESS_MARKER: &str = "[ytdl-postprocess]";
/// Prefix of the line carrying the video title
pub const TITLE_MARKER: &str = "[ytdl-title]";
/// Prefix of the line carrying the final file path
pub const DESTINATION_MARKER: &str = "[ytdl-destination]";

const PROGRESS_TEMPLATE: &str = "download:[ytdl-progress] %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s %(progress.speed)s %(progress.eta)s";
const POSTPROCESS_TEMPLATE: &str = "postprocess:[ytdl-postprocess] %(progress.postprocessor)s %(progress.status)s";
const TITLE_PRINT: &str = "before_dl:[ytdl-title] %(title)s";
const DESTINATION_PRINT: &str = "after_move:[ytdl-destination] %(filepath)s";

/// One invocation of the external binary
#[derive(Debug, Clone, PartialEq)]
pub struct FetchCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
    /// Directory the download lands in, used when the binary never names the file
    pub output_dir: Option<PathBuf>,
    /// Extension of the finished file
    pub expected_extension: Option<String>,
    /// Helper programs the binary is pointed at; checked before spawning
    pub required_tools: Vec<String>,
}

impl FetchCommand {
    /// Create a new command for the given binary
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
            output_dir: None,
            expected_extension: None,
            required_tools: Vec::new(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Set the format selection expression
    pub fn format<S: Into<String>>(self, selector: S) -> Self {
        self.arg("-f").arg(selector)
    }

    /// Write files as `<dir>/<title>.<ext>`
    pub fn output_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        let dir = dir.as_ref();
        self.output_dir = Some(dir.to_path_buf());
        let template = dir.join("%(title)s.%(ext)s");
        self.arg("-o").arg(template.to_string_lossy().to_string())
    }

    /// Ask for progress in the fixed machine-readable form, one event per line
    pub fn machine_progress(self) -> Self {
        self.arg("--newline")
            .arg("--progress")
            .arg("--progress-template")
            .arg(PROGRESS_TEMPLATE)
            .arg("--progress-template")
            .arg(POSTPROCESS_TEMPLATE)
    }

    /// Print title and final path markers while still downloading
    pub fn print_markers(self) -> Self {
        self.arg("--print")
            .arg(TITLE_PRINT)
            .arg("--print")
            .arg(DESTINATION_PRINT)
            .arg("--no-simulate")
    }

    /// Download a single video even if the URL points into a playlist
    pub fn no_playlist(self) -> Self {
        self.arg("--no-playlist")
    }

    /// Extract the audio track into the given container
    pub fn extract_audio<S: Into<String>>(mut self, audio_format: S) -> Self {
        let audio_format = audio_format.into();
        self.expected_extension = Some(audio_format.clone());
        self.arg("-x").arg("--audio-format").arg(audio_format)
    }

    /// Remux the finished video into the given container
    pub fn remux_video<S: Into<String>>(mut self, container: S) -> Self {
        let container = container.into();
        self.expected_extension = Some(container.clone());
        self.arg("--remux-video").arg(container)
    }

    /// Container used when separate video and audio streams are merged
    pub fn merge_output_format<S: Into<String>>(mut self, container: S) -> Self {
        let container = container.into();
        self.expected_extension = Some(container.clone());
        self.arg("--merge-output-format").arg(container)
    }

    /// Point the binary at a specific ffmpeg
    pub fn ffmpeg_location<S: Into<String>>(mut self, path: S) -> Self {
        let path = path.into();
        self.required_tools.push(path.clone());
        self.arg("--ffmpeg-location").arg(path)
    }

    /// Emit one JSON metadata document instead of downloading
    pub fn dump_json(self) -> Self {
        self.arg("--dump-json").arg("--no-warnings")
    }

    /// The URL goes last
    pub fn url<S: Into<String>>(self, url: S) -> Self {
        self.arg(url)
    }

    /// Argument vector, not including the program itself
    pub fn argv(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for FetchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.binary_path)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Builder for yt-dlp invocations
#[derive(Debug, Clone)]
pub struct FetchCommandBuilder {
    binary_path: String,
    ffmpeg_path: Option<String>,
    extra_args: Vec<String>,
}

impl FetchCommandBuilder {
    /// Create a new command builder
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
            ffmpeg_path: None,
            extra_args: Vec::new(),
        }
    }

    pub fn with_ffmpeg<S: Into<String>>(mut self, ffmpeg_path: Option<S>) -> Self {
        self.ffmpeg_path = ffmpeg_path.map(Into::into);
        self
    }

    pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }

    pub fn binary_path(&self) -> &str {
        &self.binary_path
    }

    pub fn ffmpeg_path(&self) -> Option<&str> {
        self.ffmpeg_path.as_deref()
    }

    /// Build the download command for a request
    pub fn download(&self, request: &DownloadRequest) -> FetchCommand {
        let mut cmd = FetchCommand::new(&self.binary_path, format!("Download {}", request.url()))
            .no_playlist()
            .machine_progress()
            .print_markers()
            .output_dir(request.output_dir());

        if let Some(ffmpeg) = &self.ffmpeg_path {
            cmd = cmd.ffmpeg_location(ffmpeg.as_str());
        }

        cmd = if request.audio_only() {
            cmd.format("bestaudio/best")
                .extract_audio(request.audio_format())
        } else {
            let container = request.container_format();
            let cmd = cmd.format(format_selector(request.quality(), container));
            if container.eq_ignore_ascii_case("mp4") {
                cmd.remux_video("mp4")
            } else {
                cmd.merge_output_format(container)
            }
        };

        cmd.args(self.extra_args.iter().cloned()).url(request.url())
    }

    /// Build the metadata query command
    pub fn metadata(&self, url: &str) -> FetchCommand {
        FetchCommand::new(&self.binary_path, format!("Metadata {}", url))
            .no_playlist()
            .dump_json()
            .args(self.extra_args.iter().cloned())
            .url(url)
    }
}

/// Format selection expression for a video quality.
///
/// Resolution caps fall back to anything at or below the cap, then to the
/// smallest stream above it, so a missing exact match never fails the download.
pub fn format_selector(quality: Quality, container: &str) -> String {
    let prefer_mp4 = container.eq_ignore_ascii_case("mp4");

    match (quality, quality.max_height()) {
        (Quality::Worst, _) if prefer_mp4 => "wv*[ext=mp4]+wa[ext=m4a]/w[ext=mp4]/wv*+wa/w".to_string(),
        (Quality::Worst, _) => "wv*+wa/w".to_string(),
        (_, Some(height)) if prefer_mp4 => format!(
            "bv*[height<={h}][ext=mp4]+ba[ext=m4a]/bv*[height<={h}]+ba/b[height<={h}]/wv*+ba/w",
            h = height
        ),
        (_, Some(height)) => format!("bv*[height<={h}]+ba/b[height<={h}]/wv*+ba/w", h = height),
        (_, None) if prefer_mp4 => "bv*[ext=mp4]+ba[ext=m4a]/b[ext=mp4]/bv*+ba/b".to_string(),
        (_, None) => "bv*+ba/b".to_string(),
    }
}

/// Argument vector for a request with a default builder
pub fn build(binary_path: &str, request: &DownloadRequest) -> Vec<String> {
    FetchCommandBuilder::new(binary_path).download(request).args
}
