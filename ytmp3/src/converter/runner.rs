//! External process execution with live progress.
//!
//! [`run_tool`] launches one tool, reads stdout and stderr concurrently on two
//! reader tasks, feeds every line through the stage's [`ProgressParser`] and a
//! [`MonotonicClamp`], and forwards the resulting stage-local percentage to a
//! caller-supplied callback. The callback runs on the caller's task, so it can
//! borrow caller state mutably without locking.

use std::process::{ExitStatus, Stdio};

use process_utils::tool_command;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::clamp::MonotonicClamp;
use super::output_reader::ToolOutputReader;
use super::progress::ProgressParser;
use crate::{Error, Result};

/// One external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Short tool name used in logs and error messages, e.g. `yt-dlp`.
    pub tool: String,
    /// Executable path or name.
    pub program: String,
    /// Argument list, passed without shell interpretation.
    pub args: Vec<String>,
}

impl ToolInvocation {
    pub fn new(tool: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            tool: tool.into(),
            program: program.into(),
            args,
        }
    }
}

/// Per-run options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Upper bound for values reported while the process is still running.
    /// The post-exit report of 100 is not affected.
    pub cap_while_running: Option<f64>,
}

/// Run a tool to completion, reporting stage-local progress.
///
/// Both output streams are drained to end-of-stream before the exit status is
/// awaited. On a zero exit status `on_progress` is called a final time with
/// 100; a non-zero status fails with [`Error::ExternalTool`]. Cancelling
/// `cancel` kills the process and fails with [`Error::Cancelled`].
pub async fn run_tool<F>(
    invocation: &ToolInvocation,
    parser: ProgressParser,
    options: RunOptions,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> Result<()>
where
    F: FnMut(f64),
{
    let tool = invocation.tool.as_str();
    debug!(tool, program = %invocation.program, args = ?invocation.args, "Starting external tool");

    let mut child = tool_command(&invocation.program, &invocation.args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| Error::Spawn {
            tool: tool.to_string(),
            source,
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Other(format!("Failed to capture {} stdout", tool)))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Other(format!("Failed to capture {} stderr", tool)))?;

    let (tx, mut rx) = mpsc::unbounded_channel::<f64>();
    let stdout_reader = spawn_reader(stdout, parser, tx.clone(), tool, "stdout");
    let stderr_reader = spawn_reader(stderr, parser, tx, tool, "stderr");

    let mut clamp = MonotonicClamp::new();
    let cap = options.cap_while_running.unwrap_or(100.0);

    // The channel closes once both readers have hit end-of-stream.
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                stdout_reader.abort();
                stderr_reader.abort();
                let _ = child.kill().await;
                return Err(Error::Cancelled(format!("{} was stopped", tool)));
            }
            value = rx.recv() => match value {
                Some(raw) => on_progress(clamp.apply(raw).min(cap)),
                None => break,
            }
        }
    }

    let last_stdout = stdout_reader.await.ok().flatten();
    let last_stderr = stderr_reader.await.ok().flatten();

    let status: ExitStatus = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            return Err(Error::Cancelled(format!("{} was stopped", tool)));
        }
        status = child.wait() => status.map_err(|e| {
            Error::Other(format!("Failed to wait for {}: {}", tool, e))
        })?,
    };

    if !status.success() {
        warn!(
            tool,
            code = ?status.code(),
            last_stderr = last_stderr.as_deref().unwrap_or(""),
            last_stdout = last_stdout.as_deref().unwrap_or(""),
            "External tool failed"
        );
        return Err(Error::external_tool(tool, status.code()));
    }

    on_progress(clamp.apply(100.0));
    debug!(tool, "External tool finished");
    Ok(())
}

/// Read one output stream line by line, sending parsed progress values.
///
/// Resolves to the last line that carried no progress, which is usually the
/// tool's final diagnostic on failure.
fn spawn_reader<R>(
    stream: R,
    parser: ProgressParser,
    tx: mpsc::UnboundedSender<f64>,
    tool: &str,
    stream_name: &'static str,
) -> JoinHandle<Option<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let tool = tool.to_string();
    tokio::spawn(async move {
        let mut reader = ToolOutputReader::new(stream);
        let mut last_message = None;

        loop {
            match reader.next_line().await {
                Ok(Some(line)) => {
                    trace!(tool = %tool, stream = stream_name, "{}", line);
                    match parser.parse_line(&line) {
                        Some(value) => {
                            let _ = tx.send(value);
                        }
                        None => last_message = Some(line),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(tool = %tool, stream = stream_name, error = %e, "Error reading tool output");
                    break;
                }
            }
        }

        last_message
    })
}
