use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::commands::FetchCommand;
use super::parser::parse_line;
use super::process::{ProcessHandle, ProcessSpawner};
use crate::error::ErrorKind;
use crate::models::{DownloadResult, OutputLine, ProgressEvent, Stage, StatusLine};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Supervises one invocation of the external binary at a time.
#[derive(Clone)]
pub struct ProcessRunner {
    spawner: Arc<dyn ProcessSpawner>,
    timeout: Duration,
    grace_period: Duration,
}

/// Exit status plus every line the process printed
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedOutput {
    pub exit_code: Option<i32>,
    pub lines: Vec<String>,
}

impl ProcessRunner {
    pub fn new(spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self {
            spawner,
            timeout: DEFAULT_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Run a download command, forwarding every decoded line to `on_event`
    /// before the next one is read.
    pub async fn run(
        &self,
        command: &FetchCommand,
        on_event: &mut (dyn FnMut(&OutputLine) + Send),
        cancel: &CancellationToken,
    ) -> DownloadResult {
        let mut stream = StreamState::default();

        let exit_code = match self
            .supervise(command, cancel, &mut |line: String| {
                if let Some(event) = parse_line(&line) {
                    stream.observe(event, &mut *on_event);
                }
            })
            .await
        {
            Ok(code) => code,
            Err(error) => return DownloadResult::from(error),
        };

        if exit_code != Some(0) {
            let error = ErrorKind::ExternalTool {
                exit_code,
                message: stream.last_error.take(),
            };
            warn!("{} failed: {}", command.description, error);
            return DownloadResult::Failed { error };
        }

        match stream.resolve_output(command) {
            Some(output_path) => {
                info!("{} finished: {}", command.description, output_path.display());
                DownloadResult::Success { output_path }
            }
            None => {
                warn!("{} exited cleanly without naming an output file", command.description);
                DownloadResult::Failed {
                    error: ErrorKind::IndeterminateOutput,
                }
            }
        }
    }

    /// Run a command to completion and collect its output without parsing it
    pub async fn capture(
        &self,
        command: &FetchCommand,
        cancel: &CancellationToken,
    ) -> Result<CapturedOutput, ErrorKind> {
        let mut lines = Vec::new();
        let exit_code = self
            .supervise(command, cancel, &mut |line: String| lines.push(line))
            .await?;
        Ok(CapturedOutput { exit_code, lines })
    }

    /// Check that the binary and every helper tool it is pointed at can be executed
    pub fn check_tools(&self, command: &FetchCommand) -> Result<PathBuf, ErrorKind> {
        let program = self
            .spawner
            .locate(&command.binary_path)
            .ok_or_else(|| ErrorKind::BinaryNotFound(command.binary_path.clone()))?;

        for tool in &command.required_tools {
            if self.spawner.locate(tool).is_none() {
                return Err(ErrorKind::BinaryNotFound(tool.clone()));
            }
        }

        Ok(program)
    }

    async fn supervise(
        &self,
        command: &FetchCommand,
        cancel: &CancellationToken,
        on_line: &mut (dyn FnMut(String) + Send),
    ) -> Result<Option<i32>, ErrorKind> {
        let program = self.check_tools(command)?;

        if cancel.is_cancelled() {
            return Err(ErrorKind::Cancelled);
        }

        debug!("Executing: {}", command);
        let mut handle = self
            .spawner
            .spawn(&program, &command.args)
            .await
            .map_err(|e| spawn_error(&command.binary_path, e))?;

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Cancelling: {}", command.description);
                    self.shutdown(handle.as_mut()).await;
                    return Err(ErrorKind::Cancelled);
                }
                _ = &mut deadline => {
                    warn!("{} exceeded {}s, terminating", command.description, self.timeout.as_secs());
                    self.shutdown(handle.as_mut()).await;
                    return Err(ErrorKind::TimedOut(self.timeout.as_secs()));
                }
                line = handle.next_line() => match line {
                    Some(line) => on_line(line),
                    None => break,
                },
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.shutdown(handle.as_mut()).await;
                Err(ErrorKind::Cancelled)
            }
            _ = &mut deadline => {
                self.shutdown(handle.as_mut()).await;
                Err(ErrorKind::TimedOut(self.timeout.as_secs()))
            }
            status = handle.wait() => status.map_err(|e| ErrorKind::ExternalTool {
                exit_code: None,
                message: Some(e.to_string()),
            }),
        }
    }

    /// Terminate, give the process the grace period, then kill it
    async fn shutdown(&self, handle: &mut dyn ProcessHandle) {
        if let Err(e) = handle.terminate().await {
            debug!("Terminate request failed: {}", e);
        }

        match tokio::time::timeout(self.grace_period, handle.wait()).await {
            Ok(_) => {}
            Err(_) => {
                warn!("Process ignored termination for {:?}, killing", self.grace_period);
                if let Err(e) = handle.kill() {
                    debug!("Kill failed: {}", e);
                }
                let _ = tokio::time::timeout(self.grace_period, handle.wait()).await;
            }
        }
    }
}

fn spawn_error(binary: &str, error: io::Error) -> ErrorKind {
    match error.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
            ErrorKind::BinaryNotFound(binary.to_string())
        }
        _ => ErrorKind::ExternalTool {
            exit_code: None,
            message: Some(format!("failed to start {}: {}", binary, error)),
        },
    }
}

/// What the runner has learned from the output stream so far
#[derive(Debug, Default)]
struct StreamState {
    max_percent: f64,
    stage: Option<Stage>,
    last_error: Option<String>,
    destination: Option<PathBuf>,
    merged: Option<PathBuf>,
    stream_path: Option<PathBuf>,
    title: Option<String>,
}

impl StreamState {
    fn observe(&mut self, line: OutputLine, on_event: &mut (dyn FnMut(&OutputLine) + Send)) {
        match line {
            OutputLine::Progress(mut event) => {
                // Separate video and audio streams each restart at 0%
                event.percent = event.percent.max(self.max_percent);
                self.max_percent = event.percent;
                if let Some(stage) = self.stage {
                    event.stage = stage;
                }
                on_event(&OutputLine::Progress(event));
            }
            OutputLine::Status(status) => {
                let stage = self.record(&status);
                on_event(&OutputLine::Status(status));

                if let Some(stage) = stage {
                    if self.stage != Some(stage) {
                        self.stage = Some(stage);
                        on_event(&OutputLine::Progress(ProgressEvent::new(self.max_percent, stage)));
                    }
                }
            }
        }
    }

    /// Remember anything needed to resolve the result; returns a stage change
    fn record(&mut self, status: &StatusLine) -> Option<Stage> {
        match status {
            StatusLine::Destination(path) => self.destination = Some(path.clone()),
            StatusLine::Merging(path) => {
                self.merged = Some(path.clone());
                return Some(Stage::Merging);
            }
            StatusLine::Converting(path) => {
                self.stream_path = Some(path.clone());
                return Some(Stage::Converting);
            }
            StatusLine::DownloadTarget(path) | StatusLine::AlreadyDownloaded(path) => {
                self.stream_path = Some(path.clone());
            }
            StatusLine::Postprocess { stage, .. } => return Some(*stage),
            StatusLine::Title(title) => self.title = Some(title.clone()),
            StatusLine::Error(message) => self.last_error = Some(message.clone()),
            StatusLine::Warning(message) => debug!("{}", message),
        }
        None
    }

    fn resolve_output(&self, command: &FetchCommand) -> Option<PathBuf> {
        self.destination
            .clone()
            .or_else(|| self.merged.clone())
            .or_else(|| self.stream_path.clone())
            .or_else(|| {
                let dir = command.output_dir.as_ref()?;
                let title = self.title.as_ref()?;
                let ext = command.expected_extension.as_ref()?;
                Some(dir.join(format!("{}.{}", sanitize_file_name(title), ext)))
            })
    }
}

/// Make a title usable as a single path component, the way the binary does
/// before naming the file
fn sanitize_file_name(title: &str) -> String {
    title
        .chars()
        .map(|c| match c {
            '/' => '\u{29F8}',
            '\\' => '\u{29F9}',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect()
}
