use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fetch::DownloaderTrait;
use crate::models::{validate_url, DownloadRequest, DownloadResult, DownloadStatus, SessionSettings};
use crate::sink::OutputSink;

const EXIT_TOKENS: [&str; 3] = ["quit", "exit", "q"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Terminated,
}

/// Where interactive mode reads its lines from
#[async_trait]
pub trait LineSource: Send {
    /// Next line without its terminator; `None` at end of input
    async fn next_line(&mut self) -> io::Result<Option<String>>;
}

/// Line source over any buffered async reader. Bytes that are not UTF-8
/// are replaced rather than treated as a read error.
pub struct ReaderLineSource<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin + Send> ReaderLineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

/// Lines typed on the terminal
pub fn stdin_lines() -> ReaderLineSource<BufReader<Stdin>> {
    ReaderLineSource::new(BufReader::new(tokio::io::stdin()))
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> LineSource for ReaderLineSource<R> {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }
}

/// Pre-recorded input, mostly for replaying sessions
#[derive(Debug, Default, Clone)]
pub struct ScriptedLines {
    lines: VecDeque<String>,
}

impl ScriptedLines {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl LineSource for ScriptedLines {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

/// Results of a queue or interactive session, in request order
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SessionReport {
    pub results: Vec<DownloadResult>,
    /// Interactive lines rejected before any download was attempted
    pub rejected: usize,
}

impl SessionReport {
    fn count(&self, status: DownloadStatus) -> usize {
        self.results.iter().filter(|r| r.status() == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(DownloadStatus::Success)
    }

    pub fn failed(&self) -> usize {
        self.count(DownloadStatus::Failed)
    }

    pub fn cancelled(&self) -> usize {
        self.count(DownloadStatus::Cancelled)
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} downloads: {} succeeded, {} failed, {} cancelled",
            self.results.len(),
            self.succeeded(),
            self.failed(),
            self.cancelled()
        )?;
        if self.rejected > 0 {
            write!(f, ", {} rejected", self.rejected)?;
        }
        Ok(())
    }
}

/// Runs downloads one at a time with settings fixed at construction.
pub struct SessionController {
    settings: SessionSettings,
    downloader: Box<dyn DownloaderTrait>,
    sink: Arc<dyn OutputSink>,
    state: SessionState,
}

impl SessionController {
    pub fn new(
        settings: SessionSettings,
        downloader: Box<dyn DownloaderTrait>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            settings,
            downloader,
            sink,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Download one URL and end the session; the result is returned unchanged
    pub async fn run_single(&mut self, url: &str, cancel: &CancellationToken) -> DownloadResult {
        let result = self.execute(url, cancel).await;
        self.state = SessionState::Terminated;
        result
    }

    /// Download every URL in order; a failed item never stops the queue
    pub async fn run_queue<I, S>(&mut self, urls: I, cancel: &CancellationToken) -> SessionReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let urls: Vec<S> = urls.into_iter().collect();
        let total = urls.len();
        let mut report = SessionReport::default();

        for (index, url) in urls.iter().enumerate() {
            let url = url.as_ref();
            if cancel.is_cancelled() {
                debug!("Skipping {} after cancellation", url);
                report.results.push(DownloadResult::Cancelled);
                continue;
            }

            self.sink.info(&format!("[{}/{}] {}", index + 1, total, url));
            let result = self.execute(url, cancel).await;
            if result.status() == DownloadStatus::Failed {
                warn!("Queue item {} failed, continuing", index + 1);
                if index + 1 < total {
                    self.sink.error("Download failed, continuing...");
                }
            }
            report.results.push(result);
        }

        info!("Queue finished: {}", report);
        self.state = SessionState::Terminated;
        report
    }

    /// Read URLs from `input` until an exit token, end of input, or `shutdown`
    pub async fn run_interactive(
        &mut self,
        input: &mut dyn LineSource,
        shutdown: &CancellationToken,
    ) -> SessionReport {
        let mut report = SessionReport::default();

        self.sink
            .info("Interactive mode - Enter URLs to download (type 'quit' to exit)");
        self.sink
            .info(&format!("Current settings: {}", self.settings));

        loop {
            let line = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    self.sink.info("Exiting interactive mode");
                    break;
                }
                line = input.next_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read input: {}", e);
                    break;
                }
            };

            let url = line.trim();
            if url.is_empty() {
                continue;
            }
            if is_exit_token(url) {
                break;
            }
            if validate_url(url).is_err() {
                self.sink.error("Please enter a valid URL starting with http");
                report.rejected += 1;
                continue;
            }

            let result = self.execute(url, shutdown).await;
            match result.status() {
                DownloadStatus::Failed => self.sink.error("Download failed, continuing..."),
                DownloadStatus::Cancelled if shutdown.is_cancelled() => {
                    report.results.push(result);
                    self.sink.info("Exiting interactive mode");
                    break;
                }
                _ => {}
            }
            report.results.push(result);
        }

        self.sink.info("Goodbye!");
        self.state = SessionState::Terminated;
        report
    }

    async fn execute(&mut self, url: &str, cancel: &CancellationToken) -> DownloadResult {
        if self.state == SessionState::Terminated {
            warn!("Session already terminated, ignoring {}", url);
            return DownloadResult::Cancelled;
        }

        let request = DownloadRequest::new(url, &self.settings);
        self.state = SessionState::Running;
        let result = self
            .downloader
            .download(&request, self.sink.as_ref(), cancel)
            .await;
        self.state = SessionState::Idle;

        debug!("{} -> {}", url, result.status());
        result
    }
}

fn is_exit_token(line: &str) -> bool {
    EXIT_TOKENS.iter().any(|token| line.eq_ignore_ascii_case(token))
}
