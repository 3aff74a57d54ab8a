//! Process handles for relay pipelines.
//!
//! A pipeline is a single shell command (resolve the source, transcode, push)
//! launched in its own process group. The group id is tracked at spawn time so
//! every process the shell forks can be signaled as one unit.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;

use crate::error::{Error, Result};

/// Default composite command.
///
/// Positional parameters: `$1` source locator, `$2` target address,
/// `$3` credentials file handed to the locator resolver.
pub const DEFAULT_PIPELINE_SCRIPT: &str =
    r#"ffmpeg -re -i "$(yt-dlp -g --cookies "$3" "$1")" -c:v copy -c:a copy -f flv "$2""#;

/// Default shell used to run the pipeline script.
pub const DEFAULT_SHELL: &str = "bash";

/// Longest stderr line forwarded as one log record; longer runs are split.
const MAX_STDERR_LINE: usize = 4096;

/// How pipelines are launched.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Shell program, resolved through `PATH` when not absolute.
    pub shell: String,
    /// Script run with `shell -c`.
    pub script: String,
    /// Credentials file passed to the script as `$3`.
    pub credentials_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            script: DEFAULT_PIPELINE_SCRIPT.to_string(),
            credentials_path: PathBuf::new(),
        }
    }
}

impl PipelineConfig {
    /// Config running `script` under `sh`, mostly useful for tests and tooling.
    pub fn with_script(script: impl Into<String>) -> Self {
        Self {
            shell: "sh".to_string(),
            script: script.into(),
            credentials_path: PathBuf::new(),
        }
    }
}

/// Signals the supervisor sends to a pipeline group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Graceful termination request (SIGTERM).
    Terminate,
    /// Forceful kill (SIGKILL).
    Kill,
}

impl Signal {
    fn as_raw(self) -> libc::c_int {
        match self {
            Self::Terminate => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Terminate => "SIGTERM",
            Self::Kill => "SIGKILL",
        }
    }
}

/// Handle to a running pipeline.
///
/// Cheap to query from request handlers; the blocking wait lives in the
/// paired [`ProcessWaiter`], which only the monitor task drives.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    pgid: i32,
    exited: watch::Receiver<bool>,
}

/// Owner of the child process. Consumed by the monitor task.
#[derive(Debug)]
pub struct ProcessWaiter {
    child: Child,
    exited: watch::Sender<bool>,
}

impl ProcessHandle {
    /// Spawn a pipeline relaying `source` to `target` in a new process group.
    pub fn spawn(
        config: &PipelineConfig,
        source: &str,
        target: &str,
    ) -> Result<(ProcessHandle, ProcessWaiter)> {
        let shell = which::which(&config.shell).map_err(|e| Error::Spawn {
            message: format!("shell '{}' not found: {}", config.shell, e),
        })?;

        let mut child = Command::new(&shell)
            .arg("-c")
            .arg(&config.script)
            .arg("restream")
            .arg(source)
            .arg(target)
            .arg(&config.credentials_path)
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Spawn {
                message: format!("failed to launch '{}': {}", shell.display(), e),
            })?;

        let pid = child.id().ok_or_else(|| Error::Spawn {
            message: "pipeline exited before its pid was read".to_string(),
        })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                drain_lines(BufReader::new(stderr), |line| {
                    tracing::debug!("pipeline {} stderr: {}", pid, String::from_utf8_lossy(line));
                })
                .await;
            });
        }

        let (tx, rx) = watch::channel(false);
        let handle = ProcessHandle {
            pid,
            // process_group(0) makes the child the leader of a group named after its pid
            pgid: pid as i32,
            exited: rx,
        };

        Ok((handle, ProcessWaiter { child, exited: tx }))
    }

    /// Process id of the shell running the pipeline.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Process group id shared by the shell and everything it forks.
    pub fn pgid(&self) -> i32 {
        self.pgid
    }

    /// Non-blocking liveness check.
    pub fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }

    /// Deliver `signal` to the whole process group.
    pub fn signal(&self, signal: Signal) -> Result<()> {
        // SAFETY: killpg has no memory-safety preconditions.
        let rc = unsafe { libc::killpg(self.pgid, signal.as_raw()) };
        if rc == -1 {
            return Err(Error::Signal {
                pgid: self.pgid,
                signal: signal.name(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    /// Wait until the pipeline exits.
    pub async fn wait_exit(&self) {
        let mut rx = self.exited.clone();
        let _ = rx.wait_for(|exited| *exited).await;
    }

    /// Wait up to `timeout` for the pipeline to exit.
    ///
    /// Returns as soon as the exit is observed; `false` means it is still alive.
    pub async fn wait_exit_timeout(&self, timeout: Duration) -> bool {
        let mut rx = self.exited.clone();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|exited| *exited)).await,
            Ok(Ok(_))
        )
    }
}

impl ProcessWaiter {
    /// Block until the child exits and publish the exit to its handle.
    pub async fn wait(mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait().await;
        self.exited.send_replace(true);
        status
    }
}

/// Read `reader` to EOF, handing each `\n` or `\r` terminated line to `on_line`.
///
/// Lines are raw bytes and capped at [`MAX_STDERR_LINE`]. The pipe is drained
/// until EOF even after a read error, so the pipeline never sees EPIPE.
async fn drain_lines<R>(mut reader: R, mut on_line: impl FnMut(&[u8]))
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::with_capacity(256);
    let mut failed = None;

    loop {
        let chunk = match reader.fill_buf().await {
            Ok([]) => break,
            Ok(chunk) => chunk,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                failed = Some(e);
                break;
            }
        };

        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if !line.is_empty() {
                    on_line(&line);
                    line.clear();
                }
            } else {
                line.push(byte);
                if line.len() >= MAX_STDERR_LINE {
                    on_line(&line);
                    line.clear();
                }
            }
        }
        let consumed = chunk.len();
        reader.consume(consumed);
    }

    if !line.is_empty() {
        on_line(&line);
    }

    if let Some(e) = failed {
        tracing::debug!("stderr read failed, discarding the rest: {}", e);
        let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
    }
}

/// Human-readable description of an exit status.
pub fn describe_exit(status: &ExitStatus) -> String {
    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exit code {}", code),
        (None, Some(signal)) => format!("signal {}", signal),
        (None, None) => "unknown status".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_reports_pid_and_group() {
        let config = PipelineConfig::with_script("sleep 30");
        let (handle, waiter) = ProcessHandle::spawn(&config, "src", "dst").unwrap();

        assert!(handle.pid() > 0);
        assert_eq!(handle.pgid(), handle.pid() as i32);
        assert!(!handle.has_exited());

        handle.signal(Signal::Kill).unwrap();
        let status = waiter.wait().await.unwrap();
        assert!(!status.success());
        assert!(handle.has_exited());
    }

    #[tokio::test]
    async fn test_positional_arguments_reach_script() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("args.txt");
        let config = PipelineConfig {
            credentials_path: PathBuf::from("/tmp/cookies.txt"),
            ..PipelineConfig::with_script(format!(
                r#"printf '%s|%s|%s' "$1" "$2" "$3" > '{}'"#,
                out.display()
            ))
        };

        let (_handle, waiter) =
            ProcessHandle::spawn(&config, "https://example.com/v?a=1&b=2", "rtmp://h/live/k")
                .unwrap();
        assert!(waiter.wait().await.unwrap().success());

        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written, "https://example.com/v?a=1&b=2|rtmp://h/live/k|/tmp/cookies.txt");
    }

    #[tokio::test]
    async fn test_missing_shell_is_spawn_error() {
        let config = PipelineConfig {
            shell: "definitely-not-a-shell-restream".to_string(),
            ..PipelineConfig::with_script("true")
        };
        let err = ProcessHandle::spawn(&config, "src", "dst").unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_wait_exit_timeout_returns_early() {
        let config = PipelineConfig::with_script("exit 0");
        let (handle, waiter) = ProcessHandle::spawn(&config, "src", "dst").unwrap();
        tokio::spawn(waiter.wait());

        assert!(handle.wait_exit_timeout(Duration::from_secs(5)).await);
        assert!(handle.has_exited());
    }

    #[tokio::test]
    async fn test_signal_reaches_grandchildren() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("child.pid");
        // The backgrounded sleep is a grandchild of the supervisor.
        let config = PipelineConfig::with_script(format!(
            "sleep 30 & echo $! > '{}'; wait",
            marker.display()
        ));
        let (handle, waiter) = ProcessHandle::spawn(&config, "src", "dst").unwrap();

        let mut grandchild = None;
        for _ in 0..100 {
            if let Ok(text) = std::fs::read_to_string(&marker) {
                if let Ok(pid) = text.trim().parse::<i32>() {
                    grandchild = Some(pid);
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let grandchild = grandchild.expect("grandchild pid written");

        handle.signal(Signal::Kill).unwrap();
        waiter.wait().await.unwrap();

        let mut gone = false;
        for _ in 0..100 {
            if !is_live(grandchild) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gone, "grandchild {} survived group kill", grandchild);
    }

    /// Alive and not a zombie waiting for its new parent to reap it.
    fn is_live(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    #[tokio::test]
    async fn test_drain_lines_is_byte_oriented() {
        let input: &[u8] = b"title: caf\xe9\nframe=1\rframe=2\r\nlast";
        let mut lines = Vec::new();
        drain_lines(input, |line| lines.push(line.to_vec())).await;

        assert_eq!(
            lines,
            vec![
                b"title: caf\xe9".to_vec(),
                b"frame=1".to_vec(),
                b"frame=2".to_vec(),
                b"last".to_vec(),
            ]
        );
    }

    #[tokio::test]
    async fn test_drain_lines_caps_unterminated_output() {
        let input = vec![b'x'; MAX_STDERR_LINE * 2 + 10];
        let mut lengths = Vec::new();
        drain_lines(&input[..], |line| lengths.push(line.len())).await;

        assert_eq!(lengths, vec![MAX_STDERR_LINE, MAX_STDERR_LINE, 10]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_on_stderr_keeps_pipeline_alive() {
        // Once the reader stops draining, the next write would hit EPIPE.
        let config = PipelineConfig::with_script(
            r#"printf '\377\n' >&2; sleep 0.3; i=0; while [ $i -lt 50 ]; do echo progress >&2; i=$((i+1)); done"#,
        );
        let (_handle, waiter) = ProcessHandle::spawn(&config, "src", "dst").unwrap();

        let status = waiter.wait().await.unwrap();
        assert!(status.success(), "pipeline died: {}", describe_exit(&status));
    }

    #[test]
    fn test_describe_exit() {
        assert_eq!(describe_exit(&ExitStatus::from_raw(0)), "exit code 0");
        assert_eq!(describe_exit(&ExitStatus::from_raw(3 << 8)), "exit code 3");
        assert_eq!(describe_exit(&ExitStatus::from_raw(9)), "signal 9");
    }
}
