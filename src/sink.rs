use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use tracing::{debug, error, info};

use crate::models::{ProgressEvent, Stage};

/// Receiver for everything the engine wants a user to see.
///
/// Implementations are called synchronously from the read loop and must
/// return quickly.
#[cfg_attr(test, mockall::automock)]
pub trait OutputSink: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
    fn progress(&self, event: &ProgressEvent);
}

/// Sink that only writes to the tracing subscriber
#[derive(Debug, Default)]
pub struct LogSink;

impl OutputSink for LogSink {
    fn info(&self, message: &str) {
        info!("{}", message);
    }

    fn error(&self, message: &str) {
        error!("{}", message);
    }

    fn progress(&self, event: &ProgressEvent) {
        debug!(
            "{} {:.1}% ({}){}",
            event.stage,
            event.percent,
            describe_bytes(event),
            event
                .eta_seconds
                .map(|eta| format!(" ETA {}", format_eta(eta)))
                .unwrap_or_default()
        );
    }
}

/// Interactive terminal sink: messages go through tracing, progress is
/// drawn as a single progress bar.
pub struct ConsoleSink {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self { bar: Mutex::new(None) }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(bar) = guard.take() {
                bar.finish();
            }
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for ConsoleSink {
    fn info(&self, message: &str) {
        self.finish_bar();
        info!("{}", message);
    }

    fn error(&self, message: &str) {
        self.finish_bar();
        error!("{}", message);
    }

    fn progress(&self, event: &ProgressEvent) {
        let Ok(mut guard) = self.bar.lock() else {
            return;
        };

        let bar = guard.get_or_insert_with(|| {
            let bar = ProgressBar::new(1000);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")
            {
                bar.set_style(style.progress_chars("#>-"));
            }
            bar
        });

        bar.set_position((event.percent * 10.0).round() as u64);
        let mut message = format!("{} {}", stage_label(event.stage), describe_bytes(event));
        if let Some(speed) = event.speed_bytes_per_sec {
            message.push_str(&format!(" at {}/s", format_file_size(speed as u64)));
        }
        if let Some(eta) = event.eta_seconds {
            message.push_str(&format!(" ETA {}", format_eta(eta)));
        }
        bar.set_message(message);
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Downloading => "Downloading",
        Stage::Converting => "Converting",
        Stage::Merging => "Merging",
    }
}

fn describe_bytes(event: &ProgressEvent) -> String {
    match event.total_bytes {
        Some(total) => format!(
            "{} / {}",
            format_file_size(event.downloaded_bytes),
            format_file_size(total)
        ),
        None => format_file_size(event.downloaded_bytes),
    }
}

/// Format a byte count for display
pub fn format_file_size(size_bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let size = size_bytes as f64;

    if size_bytes == 0 {
        "Unknown".to_string()
    } else if size < KIB {
        format!("{} B", size_bytes)
    } else if size < KIB * KIB {
        format!("{:.1} KB", size / KIB)
    } else if size < KIB * KIB * KIB {
        format!("{:.1} MB", size / (KIB * KIB))
    } else {
        format!("{:.1} GB", size / (KIB * KIB * KIB))
    }
}

/// Format seconds as MM:SS or HH:MM:SS
pub fn format_eta(seconds: u64) -> String {
    if seconds >= 3600 {
        format!("{:02}:{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60, seconds % 60)
    } else {
        format!("{:02}:{:02}", seconds / 60, seconds % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "Unknown");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(10 * 1024 * 1024 + 512 * 1024), "10.5 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(8), "00:08");
        assert_eq!(format_eta(754), "12:34");
        assert_eq!(format_eta(3661), "01:01:01");
    }
}
