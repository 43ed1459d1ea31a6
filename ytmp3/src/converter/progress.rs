//! Progress extraction from external tool output.
//!
//! Each tool reports progress in its own text format. A [`ProgressParser`]
//! turns one line of output into a stage-local percentage in `[0, 100]`, or
//! `None` when the line carries no progress. Unrecognised lines are expected
//! (banners, warnings, metadata) and are never an error.

use std::sync::LazyLock;

use regex::Regex;

/// Duration substituted when probing fails or reports zero, in microseconds.
pub const DEFAULT_DURATION_US: u64 = 1_000_000;

/// Percentage literal anywhere in a line, e.g. `[download]  42.8% of 3.1MiB`.
static PERCENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").unwrap());

/// How a tool reports progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPattern {
    /// Free-form text with an embedded percentage (yt-dlp).
    Percentage,
    /// Machine-readable `key=value` lines carrying elapsed output time in
    /// microseconds (`ffmpeg -progress`).
    ElapsedTime,
}

/// Stateless per-line progress matcher for one stage.
#[derive(Debug, Clone, Copy)]
pub struct ProgressParser {
    pattern: ProgressPattern,
    total_duration_us: u64,
}

impl ProgressParser {
    /// Parser for percentage literals.
    pub fn percentage() -> Self {
        Self {
            pattern: ProgressPattern::Percentage,
            total_duration_us: DEFAULT_DURATION_US,
        }
    }

    /// Parser for elapsed-time lines scaled against `total_duration_us`.
    ///
    /// A zero duration is replaced by [`DEFAULT_DURATION_US`].
    pub fn elapsed(total_duration_us: u64) -> Self {
        Self {
            pattern: ProgressPattern::ElapsedTime,
            total_duration_us: if total_duration_us == 0 {
                DEFAULT_DURATION_US
            } else {
                total_duration_us
            },
        }
    }

    pub fn pattern(&self) -> ProgressPattern {
        self.pattern
    }

    pub fn total_duration_us(&self) -> u64 {
        self.total_duration_us
    }

    /// Extract a stage-local percentage from one output line.
    pub fn parse_line(&self, line: &str) -> Option<f64> {
        let value = match self.pattern {
            ProgressPattern::Percentage => parse_percentage(line)?,
            ProgressPattern::ElapsedTime => {
                if is_progress_end(line) {
                    100.0
                } else {
                    let elapsed = parse_elapsed_us(line)?;
                    elapsed as f64 / self.total_duration_us as f64 * 100.0
                }
            }
        };

        value.is_finite().then(|| value.clamp(0.0, 100.0))
    }
}

/// Parse the first percentage literal in a line.
pub fn parse_percentage(line: &str) -> Option<f64> {
    let captures = PERCENT_REGEX.captures(line)?;
    captures.get(1)?.as_str().parse().ok()
}

/// Parse elapsed output time from an `ffmpeg -progress` line.
///
/// ffmpeg reports microseconds under both `out_time_us` and the misnamed
/// `out_time_ms`; `out_time` carries the same value as `HH:MM:SS.micro`.
/// Negative values (emitted before the first frame) and `N/A` are ignored.
pub fn parse_elapsed_us(line: &str) -> Option<u64> {
    let (key, value) = line.trim().split_once('=')?;
    let value = value.trim();

    match key.trim() {
        "out_time_us" | "out_time_ms" => {
            let micros: i64 = value.parse().ok()?;
            u64::try_from(micros).ok()
        }
        "out_time" => {
            let secs = parse_clock_time(value)?;
            (secs >= 0.0).then(|| (secs * 1_000_000.0).round() as u64)
        }
        _ => None,
    }
}

/// Whether the line is the final `progress=end` marker.
pub fn is_progress_end(line: &str) -> bool {
    line.trim()
        .split_once('=')
        .is_some_and(|(key, value)| key.trim() == "progress" && value.trim() == "end")
}

/// Parse `HH:MM:SS.frac` into seconds.
fn parse_clock_time(time_str: &str) -> Option<f64> {
    let mut parts = time_str.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
