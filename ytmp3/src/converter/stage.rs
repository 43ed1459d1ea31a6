//! Stage descriptors for the conversion pipeline.
//!
//! A job's pipeline is a plain ordered list of [`StageDescriptor`]s iterated by
//! one stage runner; per-tool differences live here as data.

use std::path::{Path, PathBuf};

use super::progress::ProgressPattern;
use super::runner::ToolInvocation;
use crate::config::ConverterConfig;

/// File name of the acquired media inside the job's work directory.
pub const SOURCE_FILE_NAME: &str = "source.webm";

/// File name of the transcoded artifact inside the job's work directory.
pub const OUTPUT_FILE_NAME: &str = "audio.mp3";

/// Share of overall progress attributed to acquisition.
pub const ACQUISITION_WEIGHT: f64 = 50.0;

/// Share of overall progress attributed to transcoding.
pub const TRANSCODING_WEIGHT: f64 = 50.0;

/// Highest stage-local value a transcoding run may report before it exits.
pub const TRANSCODING_RUNNING_CAP: f64 = 99.9;

/// One external-process step of a job.
#[derive(Debug, Clone)]
pub struct StageDescriptor {
    pub invocation: ToolInvocation,
    pub pattern: ProgressPattern,
    /// Share of overall progress, in percent.
    pub weight: f64,
    pub cap_while_running: Option<f64>,
    /// Media whose duration scales elapsed-time progress; probed right before
    /// the stage starts.
    pub duration_source: Option<PathBuf>,
}

/// The stages of one job plus where the final output lands.
#[derive(Debug, Clone)]
pub struct StagePlan {
    pub stages: Vec<StageDescriptor>,
    pub output: PathBuf,
}

impl StagePlan {
    /// Build the acquisition + transcoding plan for `url` inside `workspace`.
    pub fn audio_conversion(config: &ConverterConfig, url: &str, workspace: &Path) -> Self {
        let source = workspace.join(SOURCE_FILE_NAME);
        let output = workspace.join(OUTPUT_FILE_NAME);

        let acquisition = StageDescriptor {
            invocation: ToolInvocation::new(
                "yt-dlp",
                config.ytdlp_path.clone(),
                acquisition_args(url, &source),
            ),
            pattern: ProgressPattern::Percentage,
            weight: ACQUISITION_WEIGHT,
            cap_while_running: None,
            duration_source: None,
        };

        let transcoding = StageDescriptor {
            invocation: ToolInvocation::new(
                "ffmpeg",
                config.ffmpeg_path.clone(),
                transcoding_args(&source, &output, &config.audio_bitrate),
            ),
            pattern: ProgressPattern::ElapsedTime,
            weight: TRANSCODING_WEIGHT,
            cap_while_running: Some(TRANSCODING_RUNNING_CAP),
            duration_source: Some(source),
        };

        Self {
            stages: vec![acquisition, transcoding],
            output,
        }
    }

    pub fn weights(&self) -> Vec<f64> {
        self.stages.iter().map(|s| s.weight).collect()
    }
}

/// yt-dlp arguments: best audio-only format, one progress line per update.
fn acquisition_args(url: &str, output: &Path) -> Vec<String> {
    vec![
        "-f".to_string(),
        "bestaudio".to_string(),
        "--no-playlist".to_string(),
        "--newline".to_string(),
        "-o".to_string(),
        output.to_string_lossy().to_string(),
        "--".to_string(),
        url.to_string(),
    ]
}

/// ffmpeg arguments: audio-only MP3 with machine-readable progress on stdout.
fn transcoding_args(input: &Path, output: &Path, bitrate: &str) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-nostats".to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-vn".to_string(),
        "-c:a".to_string(),
        "libmp3lame".to_string(),
        "-b:a".to_string(),
        bitrate.to_string(),
        "-progress".to_string(),
        "pipe:1".to_string(),
        output.to_string_lossy().to_string(),
    ]
}
