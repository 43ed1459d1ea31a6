//! Media duration probing via ffprobe.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use process_utils::tool_command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::progress::DEFAULT_DURATION_US;
use crate::{Error, Result};

fn probe_args(input: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        input.to_string_lossy().to_string(),
    ]
}

/// Parse ffprobe's `format=duration` output (seconds) into microseconds.
///
/// Returns `None` for `N/A`, garbage, non-finite, and non-positive values.
pub fn parse_duration_output(stdout: &str) -> Option<u64> {
    let secs: f64 = stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())?
        .parse()
        .ok()?;
    if !secs.is_finite() || secs <= 0.0 {
        return None;
    }
    let micros = (secs * 1_000_000.0).round() as u64;
    (micros > 0).then_some(micros)
}

/// Probe the duration of `input` in microseconds.
pub async fn probe_duration_us(
    ffprobe_path: &str,
    input: &Path,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut cmd = tool_command(ffprobe_path, probe_args(input));
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    // Dropping the `output()` future kills the child (`kill_on_drop`).
    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(Error::Cancelled("duration probe was stopped".to_string()));
        }
        result = tokio::time::timeout(timeout, cmd.output()) => match result {
            Ok(output) => output.map_err(|source| Error::Spawn {
                tool: "ffprobe".to_string(),
                source,
            })?,
            Err(_) => {
                return Err(Error::Probe(format!(
                    "ffprobe timed out after {}s",
                    timeout.as_secs()
                )));
            }
        },
    };

    if !output.status.success() {
        return Err(Error::Probe(format!(
            "ffprobe exited with {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_duration_output(&stdout)
        .ok_or_else(|| Error::Probe(format!("unusable duration '{}'", stdout.trim())))
}

/// Probe the duration of `input`, substituting [`DEFAULT_DURATION_US`] when
/// the probe fails or reports zero.
///
/// Only cancellation is returned as an error; a bad probe degrades progress
/// accuracy but never fails the job.
pub async fn probe_duration_or_default(
    ffprobe_path: &str,
    input: &Path,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<u64> {
    match probe_duration_us(ffprobe_path, input, timeout, cancel).await {
        Ok(micros) => {
            debug!(input = %input.display(), micros, "Probed media duration");
            Ok(micros)
        }
        Err(e @ Error::Cancelled(_)) => Err(e),
        Err(e) => {
            warn!(
                input = %input.display(),
                error = %e,
                default_us = DEFAULT_DURATION_US,
                "Duration probe failed; transcoding progress will be approximate"
            );
            Ok(DEFAULT_DURATION_US)
        }
    }
}
