//! The conversion subsystem: jobs, their pipelines, and progress reporting.
//!
//! Layout, leaves first:
//! - [`progress`], [`clamp`], [`output_reader`]: turning tool output into
//!   stage-local percentages
//! - [`runner`], [`probe`], [`title`]: external tool invocations
//! - [`stage`], [`aggregator`]: the pipeline definition and weighting
//! - [`job`], [`registry`]: job state and its concurrent store
//! - [`pipeline`], [`artifact`]: background execution and file lifecycle
//! - [`stream`]: progress subscriptions

pub mod aggregator;
pub mod artifact;
pub mod clamp;
pub mod job;
pub mod output_reader;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod registry;
pub mod runner;
pub mod stage;
pub mod stream;
pub mod title;

pub use aggregator::ProgressAggregator;
pub use artifact::{ArtifactGuard, ArtifactStore};
pub use clamp::MonotonicClamp;
pub use job::{Job, JobStatus};
pub use pipeline::JobRunner;
pub use progress::{ProgressParser, ProgressPattern};
pub use registry::JobRegistry;
pub use runner::{RunOptions, ToolInvocation, run_tool};
pub use stage::{StageDescriptor, StagePlan};
pub use stream::{ProgressEvent, progress_events};
pub use title::{TitleLookup, YtDlpTitleLookup};
