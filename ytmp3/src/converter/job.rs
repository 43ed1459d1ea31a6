//! Job state and its transitions.
//!
//! A [`Job`] is a plain value. The registry stores it behind a watch channel
//! and replaces it as a whole, so readers always see a consistent snapshot.
//! The transition methods enforce the lifecycle: once a job is terminal,
//! nothing about it changes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest percentage stored while a job is still running. Exactly 100 is
/// written only by [`Job::complete`].
pub const MAX_IN_FLIGHT_PERCENT: f64 = 99.9;

/// Job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job has been registered but its pipeline has not started.
    Created,
    /// Pipeline is running.
    Running,
    /// Artifact is ready for retrieval.
    Completed,
    /// Pipeline failed; see the job's error.
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One conversion request.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    id: String,
    title: String,
    file_path: Option<PathBuf>,
    percent: f64,
    status: JobStatus,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            file_path: None,
            percent: 0.0,
            status: JobStatus::Created,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `Created -> Running`.
    pub fn start(&mut self) -> bool {
        if self.status != JobStatus::Created {
            return false;
        }
        self.status = JobStatus::Running;
        self.touch();
        true
    }

    /// Raise the percentage. Returns `false` when nothing changed.
    ///
    /// Values are clamped to `[current, MAX_IN_FLIGHT_PERCENT]`.
    pub fn advance(&mut self, percent: f64) -> bool {
        if self.is_terminal() || percent.is_nan() {
            return false;
        }
        let next = percent.min(MAX_IN_FLIGHT_PERCENT);
        if next <= self.percent {
            return false;
        }
        self.percent = next;
        self.touch();
        true
    }

    /// Terminal success: records the artifact and sets the percentage to 100.
    pub fn complete(&mut self, file_path: PathBuf) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.file_path = Some(file_path);
        self.percent = 100.0;
        self.status = JobStatus::Completed;
        self.touch();
        true
    }

    /// Terminal failure. An empty message is replaced so the error is never blank.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        let message = message.into();
        self.error = Some(if message.trim().is_empty() {
            "conversion failed".to_string()
        } else {
            message
        });
        self.status = JobStatus::Failed;
        self.touch();
        true
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job() {
        let job = Job::new("abc", "Title");
        assert_eq!(job.status(), JobStatus::Created);
        assert_eq!(job.percent(), 0.0);
        assert!(job.file_path().is_none());
        assert!(job.error().is_none());
    }

    #[test]
    fn test_advance_is_monotonic_and_capped() {
        let mut job = Job::new("abc", "Title");
        assert!(job.start());
        assert!(job.advance(30.0));
        assert!(!job.advance(20.0));
        assert_eq!(job.percent(), 30.0);
        assert!(job.advance(100.0));
        assert_eq!(job.percent(), MAX_IN_FLIGHT_PERCENT);
        assert!(!job.advance(100.0));
    }

    #[test]
    fn test_complete_sets_everything_at_once() {
        let mut job = Job::new("abc", "Title");
        job.start();
        job.advance(60.0);
        assert!(job.complete(PathBuf::from("/tmp/abc.mp3")));
        assert!(job.is_completed());
        assert_eq!(job.percent(), 100.0);
        assert_eq!(job.file_path(), Some(Path::new("/tmp/abc.mp3")));
        assert!(job.error().is_none());
    }

    #[test]
    fn test_terminal_state_is_frozen() {
        let mut job = Job::new("abc", "Title");
        job.start();
        assert!(job.fail("yt-dlp failed (exit code 1)"));
        let frozen = job.clone();

        assert!(!job.complete(PathBuf::from("/tmp/x.mp3")));
        assert!(!job.fail("again"));
        assert!(!job.advance(80.0));
        assert!(!job.start());
        assert_eq!(job, frozen);
        assert!(!job.is_completed());
        assert_eq!(job.error(), Some("yt-dlp failed (exit code 1)"));
    }

    #[test]
    fn test_start_only_once() {
        let mut job = Job::new("abc", "Title");
        assert!(job.start());
        assert!(!job.start());
    }

    #[test]
    fn test_blank_failure_message_is_replaced() {
        let mut job = Job::new("abc", "Title");
        job.fail("  ");
        assert_eq!(job.error(), Some("conversion failed"));
    }
}
