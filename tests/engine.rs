#![cfg(unix)]

mod common;

use assert_fs::TempDir;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use common::{config_for, invocations, stub_binary, RecordingSink};
use ytdl::config::DownloaderConfig;
use ytdl::error::ErrorKind;
use ytdl::fetch::{DownloaderFactory, DownloaderTrait};
use ytdl::models::{DownloadRequest, DownloadResult, Quality, SessionSettings};

fn request(dir: &TempDir, url: &str) -> DownloadRequest {
    let settings = SessionSettings {
        quality: Quality::P720,
        output_dir: dir.path().join("downloads"),
        audio_only: false,
        ..Default::default()
    };
    DownloadRequest::new(url, &settings)
}

#[tokio::test]
async fn download_succeeds_with_destination_marker() {
    let dir = TempDir::new().unwrap();
    let binary = stub_binary(
        &dir,
        r#"echo "[ytdl-title] Video One"
echo "[ytdl-progress] 524288 1048576 NA 1048576.0 1"
echo "[ytdl-progress] 1048576 1048576 NA 1048576.0 0"
echo "[ytdl-destination] downloads/video1.mp4"
exit 0"#,
    );
    let downloader = DownloaderFactory::create_downloader(&config_for(&binary));
    let sink = RecordingSink::shared();

    let result = downloader
        .download(&request(&dir, "https://example.com/v1"), sink.as_ref(), &CancellationToken::new())
        .await;

    assert_eq!(
        result,
        DownloadResult::Success { output_path: PathBuf::from("downloads/video1.mp4") }
    );

    let percents: Vec<f64> = sink.progress.lock().unwrap().iter().map(|p| p.percent).collect();
    assert_eq!(percents, vec![50.0, 100.0]);
    assert!(sink.errors.lock().unwrap().is_empty());

    let calls = invocations(&dir);
    assert_eq!(calls.len(), 1);
    assert!(calls[0].contains("height<=720"));
    assert!(calls[0].ends_with("https://example.com/v1"));
    assert!(dir.path().join("downloads").is_dir());
}

#[tokio::test]
async fn download_failure_carries_tool_error() {
    let dir = TempDir::new().unwrap();
    let binary = stub_binary(&dir, "echo 'ERROR: Video unavailable' >&2\nexit 1");
    let downloader = DownloaderFactory::create_downloader(&config_for(&binary));
    let sink = RecordingSink::shared();

    let result = downloader
        .download(&request(&dir, "https://example.com/v1"), sink.as_ref(), &CancellationToken::new())
        .await;

    let error = result.error().cloned().unwrap();
    assert_eq!(error.code(), "external-tool-error");
    assert_eq!(
        error,
        ErrorKind::ExternalTool {
            exit_code: Some(1),
            message: Some("ERROR: Video unavailable".to_string()),
        }
    );

    let errors = sink.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("ERROR: Video unavailable"));
}

#[tokio::test]
async fn clean_exit_without_output_is_indeterminate() {
    let dir = TempDir::new().unwrap();
    let binary = stub_binary(&dir, "echo '[youtube] abc: Downloading webpage'\nexit 0");
    let downloader = DownloaderFactory::create_downloader(&config_for(&binary));

    let result = downloader
        .download(&request(&dir, "https://example.com/v1"), &RecordingSink::default(), &CancellationToken::new())
        .await;

    assert_eq!(result.error(), Some(&ErrorKind::IndeterminateOutput));
}

#[tokio::test]
async fn missing_binary_fails_before_spawn() {
    let dir = TempDir::new().unwrap();
    let config = DownloaderConfig {
        binary_path: dir.path().join("no-such-yt-dlp").display().to_string(),
        ..Default::default()
    };
    let downloader = DownloaderFactory::create_downloader(&config);

    let result = downloader
        .download(&request(&dir, "https://example.com/v1"), &RecordingSink::default(), &CancellationToken::new())
        .await;

    assert_eq!(result.error().map(|e| e.code()), Some("binary-not-found"));
    assert!(downloader.check_availability().is_err());
}

#[tokio::test]
async fn missing_ffmpeg_fails_before_spawn() {
    let dir = TempDir::new().unwrap();
    let binary = stub_binary(&dir, "exit 0");
    let config = DownloaderConfig {
        ffmpeg_path: Some(dir.path().join("no-ffmpeg").display().to_string()),
        ..config_for(&binary)
    };
    let downloader = DownloaderFactory::create_downloader(&config);

    let result = downloader
        .download(&request(&dir, "https://example.com/v1"), &RecordingSink::default(), &CancellationToken::new())
        .await;

    assert_eq!(result.error().map(|e| e.code()), Some("binary-not-found"));
    assert!(invocations(&dir).is_empty());
}

#[tokio::test]
async fn cancellation_stops_a_running_download() {
    let dir = TempDir::new().unwrap();
    let binary = stub_binary(&dir, "echo '[download]   1.0% of 1.00MiB'\nexec sleep 30");
    let downloader = DownloaderFactory::create_downloader(&config_for(&binary));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = downloader
        .download(&request(&dir, "https://example.com/v1"), &RecordingSink::default(), &cancel)
        .await;

    assert_eq!(result, DownloadResult::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn timeout_terminates_the_process() {
    let dir = TempDir::new().unwrap();
    let binary = stub_binary(&dir, "exec sleep 30");
    let config = DownloaderConfig {
        timeout_secs: 1,
        ..config_for(&binary)
    };
    let downloader = DownloaderFactory::create_downloader(&config);

    let result = downloader
        .download(&request(&dir, "https://example.com/v1"), &RecordingSink::default(), &CancellationToken::new())
        .await;

    assert_eq!(result.error(), Some(&ErrorKind::TimedOut(1)));
}

#[tokio::test]
async fn info_decodes_metadata_document() {
    let dir = TempDir::new().unwrap();
    let binary = stub_binary(
        &dir,
        r#"echo '{"title": "Video One", "duration": 61.4, "uploader": "Someone", "formats": [{"format_id": "18", "ext": "mp4", "height": 360, "vcodec": "avc1", "acodec": "mp4a"}]}'"#,
    );
    let downloader = DownloaderFactory::create_downloader(&config_for(&binary));

    let info = downloader
        .fetch_info("https://example.com/v1", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(info.title, "Video One");
    assert_eq!(info.duration_seconds, 61);
    assert_eq!(info.uploader, "Someone");
    assert_eq!(info.available_formats.len(), 1);
    assert!(invocations(&dir)[0].contains("--dump-json"));
}

#[tokio::test]
async fn info_with_garbage_output_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let binary = stub_binary(&dir, "echo '{\"title\": '");
    let downloader = DownloaderFactory::create_downloader(&config_for(&binary));

    let err = downloader
        .fetch_info("https://example.com/v1", &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "metadata-unavailable");
}

#[tokio::test]
async fn non_utf8_output_does_not_break_the_download() {
    let dir = TempDir::new().unwrap();
    let binary = stub_binary(
        &dir,
        r#"printf '[ytdl-title] Caf\351 video\n'
echo "[ytdl-progress] 1048576 1048576 NA 1048576.0 0"
echo "[ytdl-destination] downloads/cafe.mp4"
exit 0"#,
    );
    let downloader = DownloaderFactory::create_downloader(&config_for(&binary));
    let sink = RecordingSink::shared();

    let result = downloader
        .download(&request(&dir, "https://example.com/v1"), sink.as_ref(), &CancellationToken::new())
        .await;

    assert_eq!(
        result,
        DownloadResult::Success { output_path: PathBuf::from("downloads/cafe.mp4") }
    );
    assert_eq!(sink.progress.lock().unwrap().len(), 1);
    assert!(sink
        .infos
        .lock()
        .unwrap()
        .contains(&"Downloading: Caf\u{FFFD} video".to_string()));
}
