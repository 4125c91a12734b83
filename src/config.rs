use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{Result, YtdlError};
use crate::models::{Quality, SessionSettings};

// Default values for downloader configuration
fn default_binary_path() -> String {
    "yt-dlp".to_string()
}

fn default_timeout_secs() -> u64 {
    2 * 60 * 60
}

fn default_grace_period_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub downloader: DownloaderConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloaderConfig {
    /// Path to the yt-dlp binary, or a name looked up on PATH
    #[serde(default = "default_binary_path")]
    pub binary_path: String,
    /// Path to ffmpeg, passed to yt-dlp for merging and audio extraction
    #[serde(default)]
    pub ffmpeg_path: Option<String>,
    /// Upper bound on a single invocation, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// How long a terminated process gets to exit before it is killed
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    /// Extra arguments inserted before the URL
    /// e.g. ["--cookies", "cookies.txt"]
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub download_dir: PathBuf,
    pub quality: Quality,
    /// Container for video downloads
    pub format: String,
    /// Container for audio-only downloads
    pub audio_format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when --verbose is not given (error, warn, info, debug, trace)
    pub level: String,
    /// Directory for the rolling log file
    pub log_dir: PathBuf,
    /// Write logs to a file in addition to the console
    pub file_logging: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            binary_path: default_binary_path(),
            ffmpeg_path: None,
            timeout_secs: default_timeout_secs(),
            grace_period_secs: default_grace_period_secs(),
            extra_args: Vec::new(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            quality: Quality::Best,
            format: "mp4".to_string(),
            audio_format: "mp3".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from(".ytdl").join("log"),
            file_logging: true,
        }
    }
}

impl Config {
    /// Load configuration; `.json` files are read as JSON, everything else as TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| YtdlError::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

        if is_json(path) {
            serde_json::from_str(&content)
                .map_err(|e| YtdlError::Config(format!("Failed to parse config file: {}", e)))
        } else {
            toml::from_str(&content)
                .map_err(|e| YtdlError::Config(format!("Failed to parse config file: {}", e)))
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| YtdlError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            toml::to_string_pretty(self)
                .map_err(|e| YtdlError::Config(format!("Failed to serialize config: {}", e)))?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)
            .map_err(|e| YtdlError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// First config file found in `dir`, in lookup order
    pub fn discover<P: AsRef<Path>>(dir: P) -> Option<PathBuf> {
        let dir = dir.as_ref();
        ["ytdl.toml", "config/config.json"]
            .iter()
            .map(|candidate| dir.join(candidate))
            .find(|candidate| candidate.is_file())
    }

    /// Session defaults seeded from the `[defaults]` section
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            quality: self.defaults.quality,
            output_dir: self.defaults.download_dir.clone(),
            audio_only: false,
            container_format: self.defaults.format.clone(),
            audio_format: self.defaults.audio_format.clone(),
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
