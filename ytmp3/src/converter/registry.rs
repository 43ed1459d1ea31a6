//! Concurrent job registry.
//!
//! Each entry is a `watch::Sender<Job>`: writers modify the snapshot in place
//! under the channel's lock and subscribers are woken on every change.

use std::path::PathBuf;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use super::job::Job;

/// Owns every live job, keyed by job id.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<String, watch::Sender<Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job with a fresh id and return its initial snapshot.
    pub fn create(&self, title: impl Into<String>) -> Job {
        let id = Uuid::new_v4().simple().to_string();
        let job = Job::new(id.clone(), title);
        let (tx, _rx) = watch::channel(job.clone());
        self.jobs.insert(id.clone(), tx);
        debug!(job_id = %id, "Registered job");
        job
    }

    /// Current snapshot of a job.
    pub fn get(&self, id: &str) -> Option<Job> {
        self.jobs.get(id).map(|entry| entry.borrow().clone())
    }

    /// Subscribe to a job's snapshots.
    pub fn subscribe(&self, id: &str) -> Option<watch::Receiver<Job>> {
        self.jobs.get(id).map(|entry| entry.subscribe())
    }

    /// Apply `modify` to a job. Subscribers are notified only when it returns
    /// `true`. Returns whether the job existed and changed.
    pub fn update<F>(&self, id: &str, modify: F) -> bool
    where
        F: FnOnce(&mut Job) -> bool,
    {
        match self.jobs.get(id) {
            Some(entry) => entry.send_if_modified(modify),
            None => false,
        }
    }

    pub fn start(&self, id: &str) -> bool {
        self.update(id, Job::start)
    }

    pub fn advance(&self, id: &str, percent: f64) -> bool {
        self.update(id, |job| job.advance(percent))
    }

    pub fn complete(&self, id: &str, file_path: PathBuf) -> bool {
        self.update(id, |job| job.complete(file_path))
    }

    pub fn fail(&self, id: &str, message: impl Into<String>) -> bool {
        let message = message.into();
        self.update(id, |job| job.fail(message))
    }

    /// Remove a job only if it has completed, returning its final snapshot.
    ///
    /// This is the single-delivery gate: concurrent callers race on the map
    /// entry and at most one of them gets the job.
    pub fn take_completed(&self, id: &str) -> Option<Job> {
        self.jobs
            .remove_if(id, |_, tx| tx.borrow().is_completed())
            .map(|(_, tx)| tx.borrow().clone())
    }

    /// Remove a job regardless of state.
    pub fn remove(&self, id: &str) -> Option<Job> {
        self.jobs.remove(id).map(|(_, tx)| tx.borrow().clone())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Number of jobs that have not reached a terminal state.
    pub fn active_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|entry| !entry.borrow().is_terminal())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::job::JobStatus;
    use std::sync::Arc;

    #[test]
    fn test_create_and_get() {
        let registry = JobRegistry::new();
        let job = registry.create("Song");
        assert!(!job.id().is_empty());

        let fetched = registry.get(job.id()).unwrap();
        assert_eq!(fetched.title(), "Song");
        assert_eq!(fetched.status(), JobStatus::Created);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = JobRegistry::new();
        let a = registry.create("a");
        let b = registry.create("b");
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_update_unknown_job() {
        let registry = JobRegistry::new();
        assert!(!registry.advance("missing", 10.0));
        assert!(!registry.fail("missing", "x"));
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let registry = JobRegistry::new();
        let id = registry.create("Song").id().to_string();
        let mut rx = registry.subscribe(&id).unwrap();

        registry.start(&id);
        registry.advance(&id, 25.0);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().percent(), 25.0);

        // A non-change does not wake subscribers.
        assert!(!registry.advance(&id, 10.0));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_take_completed_is_single_delivery() {
        let registry = JobRegistry::new();
        let id = registry.create("Song").id().to_string();

        assert!(registry.take_completed(&id).is_none());
        assert_eq!(registry.len(), 1);

        registry.start(&id);
        registry.complete(&id, PathBuf::from("/tmp/song.mp3"));
        let job = registry.take_completed(&id).unwrap();
        assert_eq!(job.percent(), 100.0);
        assert!(registry.take_completed(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_take_completed_yields_once() {
        let registry = Arc::new(JobRegistry::new());
        let id = registry.create("Song").id().to_string();
        registry.start(&id);
        registry.complete(&id, PathBuf::from("/tmp/song.mp3"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let id = id.clone();
                std::thread::spawn(move || registry.take_completed(&id).is_some())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_active_count() {
        let registry = JobRegistry::new();
        let a = registry.create("a").id().to_string();
        let b = registry.create("b").id().to_string();
        registry.fail(&a, "boom");
        assert_eq!(registry.active_count(), 1);
        registry.remove(&b);
        assert_eq!(registry.active_count(), 0);
        assert_eq!(registry.len(), 1);
    }
}
