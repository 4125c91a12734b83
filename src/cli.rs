use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::models::{Quality, SessionSettings};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path (.toml or .json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags that override the configured session defaults
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct PresetArgs {
    /// Output directory for downloaded files
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Video quality (best, worst, 1080p, 720p, 480p)
    #[arg(short, long)]
    pub quality: Option<Quality>,

    /// Download audio only
    #[arg(short, long)]
    pub audio_only: bool,

    /// Container format for video downloads (e.g. mp4, mkv, webm)
    #[arg(short, long)]
    pub format: Option<String>,
}

impl PresetArgs {
    /// Layer these flags over configured defaults
    pub fn apply(&self, mut settings: SessionSettings) -> SessionSettings {
        if let Some(output) = &self.output {
            settings.output_dir = output.clone();
        }
        if let Some(quality) = self.quality {
            settings.quality = quality;
        }
        if self.audio_only {
            settings.audio_only = true;
        }
        if let Some(format) = &self.format {
            settings.container_format = format.clone();
        }
        settings
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download a single video
    Get {
        /// Video URL
        url: String,

        #[command(flatten)]
        preset: PresetArgs,
    },

    /// Show video information without downloading
    Info {
        /// Video URL
        url: String,

        /// Also list every available format
        #[arg(long)]
        formats: bool,
    },

    /// Download every URL listed in a file, one per line ("-" reads stdin)
    Batch {
        /// File with one URL per line; blank lines and lines starting with # are ignored
        file: PathBuf,

        #[command(flatten)]
        preset: PresetArgs,
    },

    /// Enter URLs one at a time until 'quit'
    Interactive {
        #[command(flatten)]
        preset: PresetArgs,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write a configuration file with default values
    Init {
        /// Destination path; the extension selects TOML or JSON
        #[arg(default_value = "ytdl.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

/// URLs from a batch file body
pub fn batch_urls(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get_with_presets() {
        let args = Args::try_parse_from([
            "ytdl", "get", "https://example.com/v1", "-q", "720p", "-o", "/custom/output",
        ])
        .unwrap();

        match args.command {
            Commands::Get { url, preset } => {
                assert_eq!(url, "https://example.com/v1");
                assert_eq!(preset.quality, Some(Quality::P720));
                assert_eq!(preset.output, Some(PathBuf::from("/custom/output")));
                assert!(!preset.audio_only);
            }
            _ => panic!("expected get"),
        }
    }

    #[test]
    fn test_invalid_quality_rejected() {
        assert!(Args::try_parse_from(["ytdl", "get", "https://example.com", "-q", "4k"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from(["ytdl", "interactive", "--verbose", "--audio-only"]).unwrap();
        assert!(args.verbose);
        assert!(matches!(args.command, Commands::Interactive { preset } if preset.audio_only));
    }

    #[test]
    fn test_preset_overrides() {
        let preset = PresetArgs {
            quality: Some(Quality::P480),
            audio_only: true,
            format: Some("mkv".to_string()),
            ..Default::default()
        };
        let settings = preset.apply(SessionSettings::default());

        assert_eq!(settings.quality, Quality::P480);
        assert!(settings.audio_only);
        assert_eq!(settings.container_format, "mkv");
        assert_eq!(settings.output_dir, PathBuf::from("downloads"));
    }

    #[test]
    fn test_batch_urls() {
        let content = "# queue\nhttps://example.com/1\n\n   \n  https://example.com/2  \n";
        assert_eq!(
            batch_urls(content),
            vec!["https://example.com/1".to_string(), "https://example.com/2".to_string()]
        );
    }
}
