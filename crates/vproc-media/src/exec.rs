//! Running transcoder invocations.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::command::FfmpegInvocation;
use crate::error::{MediaError, MediaResult};

/// Captured result of a successful invocation.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Everything the process wrote to stdout
    pub stdout: String,
    /// Exit code (0 on the success path)
    pub exit_code: i32,
}

/// Runs one invocation at a time with captured output and a hard timeout.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    timeout: Duration,
}

impl FfmpegRunner {
    /// Create a runner with the configured per-invocation timeout.
    pub fn new(timeout_minutes: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_minutes * 60),
        }
    }

    /// Override the timeout with an exact duration.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run an invocation to completion.
    ///
    /// stdout and stderr are drained line-by-line while the process runs so
    /// a chatty transcoder can never fill a pipe and deadlock. A non-zero
    /// exit is always an error carrying the full stderr text; exceeding the
    /// timeout kills the process.
    pub async fn run(&self, invocation: &FfmpegInvocation) -> MediaResult<ExecOutput> {
        debug!("Running transcoder: {}", invocation.display());

        let mut child = Command::new(&invocation.binary)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    MediaError::BinaryNotFound(invocation.binary.clone())
                }
                _ => MediaError::Io(e),
            })?;

        let stdout_task = drain(child.stdout.take().expect("stdout not captured"));
        let stderr_task = drain(child.stderr.take().expect("stderr not captured"));

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(result) => result?,
            Err(_) => {
                let secs = self.timeout.as_secs();
                warn!("Transcoder timed out after {} seconds, killing process", secs);
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(MediaError::Timeout(secs));
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(stderr),
                status.code(),
            ));
        }

        Ok(ExecOutput {
            stdout,
            exit_code: status.code().unwrap_or(0),
        })
    }
}

/// Lightweight availability probe: spawn `<binary> -version` and report
/// whether it exits cleanly. A spawn failure is simply "not available".
pub async fn is_available(binary: &Path) -> bool {
    match Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        Ok(status) => status.success(),
        Err(_) => false,
    }
}

/// Collect a stream into a string line-by-line.
fn drain(stream: impl AsyncRead + Unpin + Send + 'static) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        let mut collected = String::new();
        while let Ok(Some(line)) = lines.next_line().await {
            collected.push_str(&line);
            collected.push('\n');
        }
        collected
    })
}
