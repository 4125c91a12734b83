use assert_fs::prelude::*;
use assert_fs::TempDir;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ytdl::config::DownloaderConfig;
use ytdl::models::ProgressEvent;
use ytdl::sink::OutputSink;

/// Write an executable shell script standing in for yt-dlp.
///
/// Every invocation appends its arguments to `invocations.log` next to the script.
pub fn stub_binary(dir: &TempDir, body: &str) -> PathBuf {
    let script = dir.child("yt-dlp");
    let log = dir.child("invocations.log");
    script
        .write_str(&format!(
            "#!/bin/sh\necho \"$*\" >> '{}'\n{}\n",
            log.path().display(),
            body
        ))
        .unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(script.path(), std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    script.path().to_path_buf()
}

/// Arguments of every recorded invocation, one string per call
pub fn invocations(dir: &TempDir) -> Vec<String> {
    std::fs::read_to_string(dir.child("invocations.log").path())
        .map(|content| content.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

pub fn config_for(binary: &Path) -> DownloaderConfig {
    DownloaderConfig {
        binary_path: binary.display().to_string(),
        timeout_secs: 30,
        grace_period_secs: 1,
        ..Default::default()
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub infos: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
    pub progress: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl OutputSink for RecordingSink {
    fn info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn progress(&self, event: &ProgressEvent) {
        self.progress.lock().unwrap().push(event.clone());
    }
}
