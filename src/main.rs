//! ytdl - download videos by driving yt-dlp
//!
//! Entry point: loads configuration once, sets up logging, and hands a
//! SessionController the mode picked on the command line.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ytdl::cli::{batch_urls, Args, Commands, ConfigAction, PresetArgs};
use ytdl::config::{Config, LoggingConfig};
use ytdl::fetch::{DownloaderFactory, DownloaderTrait};
use ytdl::models::{DownloadStatus, VideoInfo};
use ytdl::session::{stdin_lines, SessionController};
use ytdl::sink::{format_eta, format_file_size, ConsoleSink, OutputSink};

const EXIT_FAILED: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let (config, config_path) = load_config(args.config.as_deref())?;
    setup_logging(args.verbose, &config.logging)?;
    match &config_path {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    let shutdown = CancellationToken::new();
    spawn_interrupt_handler(shutdown.clone());

    let code = match args.command {
        Commands::Get { url, preset } => {
            let mut session = session(&config, &preset);
            let result = session.run_single(&url, &shutdown).await;
            match result.status() {
                DownloadStatus::Success => ExitCode::SUCCESS,
                DownloadStatus::Failed => ExitCode::from(EXIT_FAILED),
                DownloadStatus::Cancelled => ExitCode::from(EXIT_INTERRUPTED),
            }
        }
        Commands::Info { url, formats } => {
            let downloader = DownloaderFactory::create_downloader(&config.downloader);
            match downloader.fetch_info(&url, &shutdown).await {
                Ok(video) => {
                    print_info(&video, formats);
                    ExitCode::SUCCESS
                }
                Err(e) if shutdown.is_cancelled() => {
                    info!("{}", e);
                    ExitCode::from(EXIT_INTERRUPTED)
                }
                Err(e) => {
                    error!("Could not fetch video information [{}]: {}", e.code(), e);
                    ExitCode::from(EXIT_FAILED)
                }
            }
        }
        Commands::Batch { file, preset } => {
            let urls = batch_urls(&read_batch_file(&file).await?);
            if urls.is_empty() {
                warn!("No URLs found in {}", file.display());
                return Ok(ExitCode::SUCCESS);
            }

            info!("Processing {} URLs", urls.len());
            let mut session = session(&config, &preset);
            let report = session.run_queue(&urls, &shutdown).await;
            info!("Batch complete: {}", report);

            if shutdown.is_cancelled() {
                ExitCode::from(EXIT_INTERRUPTED)
            } else if report.has_failures() {
                ExitCode::from(EXIT_FAILED)
            } else {
                ExitCode::SUCCESS
            }
        }
        Commands::Interactive { preset } => {
            let mut session = session(&config, &preset);
            let mut input = stdin_lines();
            let report = session.run_interactive(&mut input, &shutdown).await;
            info!("Session summary: {}", report);

            if shutdown.is_cancelled() {
                // A stdin read is still parked on a blocking thread and would hold up runtime shutdown
                std::process::exit(0);
            }
            ExitCode::SUCCESS
        }
        Commands::Config { action } => {
            match action {
                ConfigAction::Init { path, force } => {
                    if path.exists() && !force {
                        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
                    }
                    Config::default().save_to_file(&path)?;
                    info!("Wrote default configuration to {}", path.display());
                }
                ConfigAction::Show => {
                    println!("{}", toml::to_string_pretty(&config)?);
                }
            }
            ExitCode::SUCCESS
        }
    };

    Ok(code)
}

/// `--config` wins; otherwise the first file found in the working directory
fn load_config(explicit: Option<&Path>) -> Result<(Config, Option<PathBuf>)> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => Config::discover(std::env::current_dir()?),
    };

    match path {
        Some(path) => {
            let config = Config::from_file(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            Ok((config, Some(path)))
        }
        None => Ok((Config::default(), None)),
    }
}

fn session(config: &Config, preset: &PresetArgs) -> SessionController {
    let settings = preset.apply(config.session_settings());
    let downloader = DownloaderFactory::create_downloader(&config.downloader);
    let sink: Arc<dyn OutputSink> = Arc::new(ConsoleSink::new());
    SessionController::new(settings, downloader, sink)
}

fn spawn_interrupt_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping");
            shutdown.cancel();
        }
    });
}

async fn read_batch_file(file: &Path) -> Result<String> {
    let mut content = String::new();
    if file == Path::new("-") {
        tokio::io::stdin().read_to_string(&mut content).await?;
    } else {
        content = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;
    }
    Ok(content)
}

fn print_info(video: &VideoInfo, with_formats: bool) {
    println!("Title: {}", video.title);
    println!("Duration: {} ({} seconds)", format_eta(video.duration_seconds), video.duration_seconds);
    println!("Uploader: {}", video.uploader);

    if with_formats && !video.available_formats.is_empty() {
        println!();
        println!("{:<10} {:<6} {:<12} {:<14} {:<14} {:<10}", "ID", "Ext", "Resolution", "Video", "Audio", "Size");
        println!("{}", "-".repeat(70));
        for format in &video.available_formats {
            println!(
                "{:<10} {:<6} {:<12} {:<14} {:<14} {:<10}",
                format.format_id,
                format.extension,
                format.resolution.as_deref().unwrap_or("-"),
                format.video_codec.as_deref().unwrap_or("-"),
                format.audio_codec.as_deref().unwrap_or("-"),
                format_file_size(format.filesize.unwrap_or(0)),
            );
        }
    }
}

fn setup_logging(verbose: bool, logging: &LoggingConfig) -> Result<()> {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow::anyhow!("Invalid log level '{}': {}", level, e))?;

    let console_layer = fmt::layer()
        .with_target(false)
        .without_time();

    // Set up file appender with daily rotation
    let file_layer = if logging.file_logging {
        std::fs::create_dir_all(&logging.log_dir)?;
        let file_appender = rolling::daily(&logging.log_dir, "ytdl.log");
        let (non_blocking_file, guard) = non_blocking(file_appender);
        // Keep the guard alive for the duration of the program
        std::mem::forget(guard);

        Some(
            fmt::layer()
                .with_writer(non_blocking_file)
                .with_target(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    if logging.file_logging {
        info!("Logging to {}", logging.log_dir.join("ytdl.log").display());
    }

    Ok(())
}
