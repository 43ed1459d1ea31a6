//! Converter configuration.
//!
//! Values come from environment variables (optionally seeded from a `.env`
//! file by the binary) and fall back to defaults that work when the tools are
//! on `PATH`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::{Error, Result};

/// Default audio bitrate passed to the MP3 encoder.
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

/// Default cadence of progress stream polling.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(450);

/// Configuration for the conversion pipeline.
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Path to the acquisition tool (yt-dlp).
    pub ytdlp_path: String,
    /// Path to the transcoding tool (ffmpeg).
    pub ffmpeg_path: String,
    /// Path to the duration probe tool (ffprobe).
    pub ffprobe_path: String,
    /// MP3 bitrate, e.g. `128k`.
    pub audio_bitrate: String,
    /// Directory where finished artifacts wait for retrieval.
    pub artifact_dir: PathBuf,
    /// Parent directory of the per-job scratch directories.
    pub work_dir: PathBuf,
    /// Cadence at which progress streams poll their job.
    pub progress_interval: Duration,
    /// Upper bound for a single duration probe.
    pub probe_timeout: Duration,
    /// Upper bound for a title lookup.
    pub title_timeout: Duration,
    /// Upper bound for a whole job; `None` disables the limit.
    pub job_timeout: Option<Duration>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        let base = std::env::temp_dir().join("ytmp3");
        Self {
            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            artifact_dir: base.join("artifacts"),
            work_dir: base.join("work"),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            probe_timeout: Duration::from_secs(30),
            title_timeout: Duration::from_secs(60),
            job_timeout: Some(Duration::from_secs(3600)),
        }
    }
}

impl ConverterConfig {
    /// Load converter config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `YTDLP_PATH`, `FFMPEG_PATH`, `FFPROBE_PATH`
    /// - `AUDIO_BITRATE` (e.g. "192k")
    /// - `ARTIFACT_DIR`, `WORK_DIR`
    /// - `PROGRESS_INTERVAL_MS`
    /// - `PROBE_TIMEOUT_SECS`, `TITLE_TIMEOUT_SECS`
    /// - `JOB_TIMEOUT_SECS` (`0` disables the job timeout)
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Some(path) = non_empty_var("YTDLP_PATH") {
            config.ytdlp_path = path;
        }
        if let Some(path) = non_empty_var("FFMPEG_PATH") {
            config.ffmpeg_path = path;
        }
        if let Some(path) = non_empty_var("FFPROBE_PATH") {
            config.ffprobe_path = path;
        }
        if let Some(bitrate) = non_empty_var("AUDIO_BITRATE") {
            config.audio_bitrate = bitrate;
        }
        if let Some(dir) = non_empty_var("ARTIFACT_DIR") {
            config.artifact_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty_var("WORK_DIR") {
            config.work_dir = PathBuf::from(dir);
        }
        if let Some(ms) = parsed_var::<u64>("PROGRESS_INTERVAL_MS").filter(|ms| *ms > 0) {
            config.progress_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parsed_var::<u64>("PROBE_TIMEOUT_SECS").filter(|s| *s > 0) {
            config.probe_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed_var::<u64>("TITLE_TIMEOUT_SECS").filter(|s| *s > 0) {
            config.title_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed_var::<u64>("JOB_TIMEOUT_SECS") {
            config.job_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        config
    }

    /// Reject settings the tools would only fail on later, per job.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("YTDLP_PATH", &self.ytdlp_path),
            ("FFMPEG_PATH", &self.ffmpeg_path),
            ("FFPROBE_PATH", &self.ffprobe_path),
        ] {
            if value.trim().is_empty() {
                return Err(Error::config(format!("{} must not be empty", name)));
            }
        }

        let bitrate = self.audio_bitrate.trim();
        let digits = bitrate.strip_suffix(['k', 'K']).unwrap_or(bitrate);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::config(format!(
                "AUDIO_BITRATE must look like '128k', got '{}'",
                self.audio_bitrate
            )));
        }

        if self.artifact_dir == self.work_dir {
            return Err(Error::config(
                "ARTIFACT_DIR and WORK_DIR must be different directories",
            ));
        }

        Ok(())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: FromStr>(key: &str) -> Option<T> {
    let raw = non_empty_var(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring invalid numeric environment variable");
            None
        }
    }
}
