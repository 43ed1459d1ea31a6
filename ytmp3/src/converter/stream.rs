//! Per-subscriber progress event streams.
//!
//! A stream emits the job's percentage on a fixed cadence and immediately
//! whenever the job changes, then exactly one terminal event, then ends.
//! Every subscriber reads the same registry entry, so concurrent subscribers
//! see the same non-decreasing sequence of values.

use std::collections::VecDeque;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::job::Job;
use super::registry::JobRegistry;

/// One event pushed to a progress subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Current overall percentage.
    Progress(f64),
    /// The job completed; carries the job id.
    Complete(String),
    /// The job failed; carries the error message.
    Error(String),
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}

/// Round a percentage to one decimal place for display.
pub fn display_percent(percent: f64) -> f64 {
    (percent * 10.0).round() / 10.0
}

struct Subscription {
    rx: watch::Receiver<Job>,
    ticker: Interval,
    queued: VecDeque<ProgressEvent>,
    last_sent: Option<f64>,
    emit_now: bool,
    closed: bool,
    finished: bool,
}

impl Subscription {
    /// Queue the terminal events for a finished job.
    fn finish(&mut self, job: &Job) {
        self.finished = true;
        if job.is_completed() {
            if self.last_sent != Some(job.percent()) {
                self.queued.push_back(ProgressEvent::Progress(job.percent()));
            }
            self.queued
                .push_back(ProgressEvent::Complete(job.id().to_string()));
        } else {
            self.queued.push_back(ProgressEvent::Error(
                job.error().unwrap_or("conversion failed").to_string(),
            ));
        }
    }

    async fn next_event(&mut self) -> Option<ProgressEvent> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Some(event);
            }
            if self.finished {
                return None;
            }

            let job = self.rx.borrow_and_update().clone();
            if job.is_terminal() {
                self.finish(&job);
                continue;
            }
            // Registry entry removed before the job finished.
            if self.closed {
                return None;
            }

            let percent = job.percent();
            if self.emit_now || self.last_sent.is_none_or(|last| percent > last) {
                self.emit_now = false;
                self.last_sent = Some(percent);
                return Some(ProgressEvent::Progress(percent));
            }

            tokio::select! {
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        self.closed = true;
                    }
                }
                _ = self.ticker.tick() => {
                    self.emit_now = true;
                }
            }
        }
    }
}

/// Subscribe to a job's progress.
///
/// Unknown ids yield an empty stream.
pub fn progress_events(
    registry: &JobRegistry,
    job_id: &str,
    interval: Duration,
) -> BoxStream<'static, ProgressEvent> {
    let Some(rx) = registry.subscribe(job_id) else {
        return stream::empty().boxed();
    };

    let period = interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let subscription = Subscription {
        rx,
        ticker,
        queued: VecDeque::new(),
        last_sent: None,
        emit_now: true,
        closed: false,
        finished: false,
    };

    stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.next_event().await?;
        Some((event, subscription))
    })
    .boxed()
}
