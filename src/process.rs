//! Subprocess execution with piped stdio and a hard wall-clock timeout.
//!
//! The document travels over stdin; the pipe is closed after writing so
//! the tool sees end-of-input. Output is collected concurrently with the
//! child running, and the child is killed outright once the budget
//! elapses, so the calling await always resolves.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::error::LintError;

/// Wall-clock budget for a lint run.
pub const LINT_TIMEOUT: Duration = Duration::from_secs(300);

/// Budget for the quick `--version` probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Captured output of a finished subprocess.
#[derive(Debug)]
pub struct ProcessOutput {
    /// stdout, UTF-8 decoded and trimmed.
    pub stdout: String,
    /// stderr, UTF-8 decoded and trimmed.
    pub stderr: String,
    /// Exit status. Not authoritative for lint runs; classification is
    /// driven by output content.
    pub status: std::process::ExitStatus,
}

/// Run `executable` with `args`, writing `stdin_text` to its stdin.
pub async fn run(
    executable: &Path,
    args: &[String],
    stdin_text: &str,
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<ProcessOutput, LintError> {
    let mut cmd = Command::new(executable);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| LintError::Spawn(format!("{}: {e}", executable.display())))?;

    let Some(mut stdin) = child.stdin.take() else {
        return Err(LintError::Spawn("failed to open stdin pipe".to_string()));
    };
    let Some(mut stdout_pipe) = child.stdout.take() else {
        return Err(LintError::Spawn("failed to open stdout pipe".to_string()));
    };
    let Some(mut stderr_pipe) = child.stderr.take() else {
        return Err(LintError::Spawn("failed to open stderr pipe".to_string()));
    };

    // Write concurrently with reading: the tool may start emitting output
    // before it has consumed all of its input. A write failure here means
    // the child exited early, which the output classification handles.
    let payload = stdin_text.as_bytes().to_vec();
    let writer = tokio::spawn(async move {
        let _ = stdin.write_all(&payload).await;
        let _ = stdin.shutdown().await;
    });

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf).await;
        buf
    });

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => status.map_err(|e| LintError::Spawn(e.to_string()))?,
        Err(_elapsed) => {
            tracing::warn!(
                executable = %executable.display(),
                timeout_secs = timeout.as_secs(),
                "subprocess exceeded its budget, killing"
            );
            let _ = child.kill().await;
            writer.abort();
            return Err(LintError::Timeout(timeout));
        }
    };

    let stdout = collect(stdout_task.await);
    let stderr = collect(stderr_task.await);

    Ok(ProcessOutput {
        stdout,
        stderr,
        status,
    })
}

fn collect(buf: Result<Vec<u8>, tokio::task::JoinError>) -> String {
    buf.map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
        .unwrap_or_default()
}
