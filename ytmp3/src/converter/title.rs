//! Title lookup performed before a job is created.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use process_utils::tool_command;
use tracing::{debug, warn};

/// Resolves a human-readable title for a media URL.
///
/// `None` means the URL is unusable; the caller rejects the request.
#[async_trait]
pub trait TitleLookup: Send + Sync {
    async fn lookup_title(&self, url: &str) -> Option<String>;
}

/// Asks yt-dlp for the title without downloading anything.
#[derive(Debug, Clone)]
pub struct YtDlpTitleLookup {
    ytdlp_path: String,
    timeout: Duration,
}

impl YtDlpTitleLookup {
    pub fn new(ytdlp_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            timeout,
        }
    }

    fn build_args(url: &str) -> Vec<String> {
        vec![
            "--no-playlist".to_string(),
            "--skip-download".to_string(),
            "--print".to_string(),
            "title".to_string(),
            "--".to_string(),
            url.to_string(),
        ]
    }
}

#[async_trait]
impl TitleLookup for YtDlpTitleLookup {
    async fn lookup_title(&self, url: &str) -> Option<String> {
        let mut cmd = tool_command(&self.ytdlp_path, Self::build_args(url));
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(url, error = %e, "Failed to run title lookup");
                return None;
            }
            Err(_) => {
                warn!(url, timeout_secs = self.timeout.as_secs(), "Title lookup timed out");
                return None;
            }
        };

        if !output.status.success() {
            warn!(
                url,
                code = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Title lookup failed"
            );
            return None;
        }

        let title = first_non_empty_line(&String::from_utf8_lossy(&output.stdout));
        debug!(url, title = ?title, "Resolved title");
        title
    }
}

fn first_non_empty_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
