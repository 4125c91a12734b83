#![cfg(unix)]

mod common;

use assert_fs::TempDir;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use common::{config_for, invocations, stub_binary, RecordingSink};
use ytdl::fetch::DownloaderFactory;
use ytdl::models::{DownloadStatus, SessionSettings};
use ytdl::session::{ReaderLineSource, ScriptedLines, SessionController, SessionState};

const FAIL_ON_MATCH: &str = r#"case "$*" in
  *unreachable*) echo "ERROR: Unable to download webpage: unreachable host" >&2; exit 1;;
esac
echo "[ytdl-destination] downloads/ok.mp4"
exit 0"#;

fn controller(dir: &TempDir, sink: Arc<RecordingSink>) -> SessionController {
    let binary = stub_binary(dir, FAIL_ON_MATCH);
    let settings = SessionSettings {
        output_dir: dir.path().join("downloads"),
        ..Default::default()
    };
    SessionController::new(
        settings,
        DownloaderFactory::create_downloader(&config_for(&binary)),
        sink,
    )
}

#[tokio::test]
async fn interactive_quit_makes_no_attempts() {
    let dir = TempDir::new().unwrap();
    let sink = RecordingSink::shared();
    let mut session = controller(&dir, sink.clone());

    let mut input = ScriptedLines::new(["quit"]);
    let report = session.run_interactive(&mut input, &CancellationToken::new()).await;

    assert!(report.results.is_empty());
    assert!(invocations(&dir).is_empty());
    assert_eq!(session.state(), SessionState::Terminated);
    assert_eq!(sink.infos.lock().unwrap().last().map(String::as_str), Some("Goodbye!"));
}

#[tokio::test]
async fn interactive_rejects_malformed_url_without_spawning() {
    let dir = TempDir::new().unwrap();
    let sink = RecordingSink::shared();
    let mut session = controller(&dir, sink.clone());

    let reader = tokio_test::io::Builder::new()
        .read(b"not-a-url\n")
        .read(b"quit\n")
        .build();
    let mut input = ReaderLineSource::new(BufReader::new(reader));
    let report = session.run_interactive(&mut input, &CancellationToken::new()).await;

    assert_eq!(report.rejected, 1);
    assert!(report.results.is_empty());
    assert!(invocations(&dir).is_empty());
    assert_eq!(
        *sink.errors.lock().unwrap(),
        vec!["Please enter a valid URL starting with http".to_string()]
    );
}

#[tokio::test]
async fn interactive_downloads_until_exit_token() {
    let dir = TempDir::new().unwrap();
    let sink = RecordingSink::shared();
    let mut session = controller(&dir, sink.clone());

    let mut input = ScriptedLines::new([
        "https://example.com/1",
        "https://unreachable.invalid/2",
        "https://example.com/3",
        "Quit",
    ]);
    let report = session.run_interactive(&mut input, &CancellationToken::new()).await;

    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(invocations(&dir).len(), 3);
    assert!(sink
        .errors
        .lock()
        .unwrap()
        .contains(&"Download failed, continuing...".to_string()));
}

#[tokio::test]
async fn queue_produces_every_result_in_order() {
    let dir = TempDir::new().unwrap();
    let mut session = controller(&dir, RecordingSink::shared());

    let urls = vec![
        "https://example.com/a".to_string(),
        "https://example.com/b".to_string(),
        "https://unreachable.invalid/c".to_string(),
        "https://example.com/d".to_string(),
    ];
    let report = session.run_queue(&urls, &CancellationToken::new()).await;

    let statuses: Vec<DownloadStatus> = report.results.iter().map(|r| r.status()).collect();
    assert_eq!(
        statuses,
        vec![
            DownloadStatus::Success,
            DownloadStatus::Success,
            DownloadStatus::Failed,
            DownloadStatus::Success,
        ]
    );

    let calls = invocations(&dir);
    assert_eq!(calls.len(), 4);
    for (call, url) in calls.iter().zip(&urls) {
        assert!(call.ends_with(url.as_str()));
    }

    let failure = report.results[2].error().unwrap();
    assert_eq!(failure.code(), "external-tool-error");
}

#[tokio::test]
async fn queue_reports_invalid_urls_as_failures() {
    let dir = TempDir::new().unwrap();
    let mut session = controller(&dir, RecordingSink::shared());

    let report = session
        .run_queue(["notaurl", "https://example.com/ok"], &CancellationToken::new())
        .await;

    assert_eq!(report.results[0].error().map(|e| e.code()), Some("invalid-url"));
    assert!(report.results[1].is_success());
    assert_eq!(invocations(&dir).len(), 1);
}
