use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::debug;

/// Lines buffered between the pipe readers and the consumer. Once full the
/// readers stop draining the pipes and the child blocks on write.
const LINE_BUFFER: usize = 64;

/// Capability the runner needs from the operating system: find a program,
/// start it, and get back a handle to its merged output.
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    /// Resolve `program` to an executable path, or `None` if it cannot be run
    fn locate(&self, program: &str) -> Option<PathBuf>;

    async fn spawn(&self, program: &Path, args: &[String]) -> io::Result<Box<dyn ProcessHandle>>;
}

/// A running child process.
#[async_trait]
pub trait ProcessHandle: Send {
    /// Next line of stdout or stderr, in arrival order; `None` once both are closed
    async fn next_line(&mut self) -> Option<String>;

    /// Ask the process to exit
    async fn terminate(&mut self) -> io::Result<()>;

    /// Stop the process without waiting for it to cooperate
    fn kill(&mut self) -> io::Result<()>;

    /// Wait for exit; `None` when the process was ended by a signal
    async fn wait(&mut self) -> io::Result<Option<i32>>;
}

/// Spawner backed by `tokio::process`
#[derive(Debug, Default, Clone)]
pub struct TokioSpawner;

#[async_trait]
impl ProcessSpawner for TokioSpawner {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        locate_executable(program)
    }

    async fn spawn(&self, program: &Path, args: &[String]) -> io::Result<Box<dyn ProcessHandle>> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx);
        }

        debug!("Spawned {} (pid {:?})", program.display(), child.id());
        Ok(Box::new(TokioProcess { child, lines: rx }))
    }
}

fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    // Titles and paths are not guaranteed to be UTF-8
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\n', '\r'])
                        .to_string();
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Stopped reading child output: {}", e);
                    break;
                }
            }
        }
    });
}

struct TokioProcess {
    child: Child,
    lines: mpsc::Receiver<String>,
}

#[async_trait]
impl ProcessHandle for TokioProcess {
    async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    async fn terminate(&mut self) -> io::Result<()> {
        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                match Command::new("kill")
                    .arg("-TERM")
                    .arg(pid.to_string())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .await
                {
                    Ok(status) if status.success() => return Ok(()),
                    Ok(status) => debug!("kill -TERM {} exited with {}, killing instead", pid, status),
                    Err(e) => debug!("kill -TERM unavailable ({}), killing instead", e),
                }
            }
        }

        self.child.start_kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }
}

/// Resolve a configured program the way a shell would: paths are checked
/// directly, bare names are searched on PATH.
pub fn locate_executable(program: &str) -> Option<PathBuf> {
    if program.trim().is_empty() {
        return None;
    }

    let path = Path::new(program);
    if path.components().count() > 1 || path.is_absolute() {
        return is_executable(path).then(|| path.to_path_buf());
    }

    which::which(program).ok()
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        std::fs::metadata(path)
            .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
