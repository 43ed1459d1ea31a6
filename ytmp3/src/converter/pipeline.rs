//! Background execution of one conversion job.
//!
//! [`JobRunner::spawn`] detaches a task that walks the job's [`StagePlan`],
//! feeds every stage's progress through one [`ProgressAggregator`] into the
//! registry, and ends the job in exactly one terminal state.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::aggregator::ProgressAggregator;
use super::artifact::ArtifactStore;
use super::probe::probe_duration_or_default;
use super::progress::{DEFAULT_DURATION_US, ProgressParser, ProgressPattern};
use super::registry::JobRegistry;
use super::runner::{RunOptions, run_tool};
use super::stage::{StageDescriptor, StagePlan};
use crate::config::ConverterConfig;
use crate::{Error, Result};

/// Drives job pipelines. Cheap to clone.
#[derive(Clone)]
pub struct JobRunner {
    registry: Arc<JobRegistry>,
    artifacts: Arc<ArtifactStore>,
    config: Arc<ConverterConfig>,
    shutdown: CancellationToken,
}

impl JobRunner {
    pub fn new(
        registry: Arc<JobRegistry>,
        artifacts: Arc<ArtifactStore>,
        config: Arc<ConverterConfig>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            artifacts,
            config,
            shutdown,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    /// Run the job's pipeline on a detached task.
    ///
    /// The task outlives the request that created the job.
    pub fn spawn(&self, job_id: String, url: String) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move { runner.run(&job_id, &url).await })
    }

    /// Run the job's pipeline to a terminal state.
    pub async fn run(&self, job_id: &str, url: &str) {
        if !self.registry.start(job_id) {
            warn!(job_id, "Job is unknown or already started; not running it");
            return;
        }
        info!(job_id, url, "Job started");

        // Cancelled by server shutdown; the job timeout drops the pipeline
        // future instead, which kills the running tool via kill_on_drop.
        let cancel = self.shutdown.child_token();
        let result = match self.config.job_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.execute(job_id, url, &cancel)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Cancelled(format!("job timed out after {:?}", limit))),
                }
            }
            None => self.execute(job_id, url, &cancel).await,
        };

        match result {
            Ok(artifact) => {
                if self.registry.complete(job_id, artifact.clone()) {
                    info!(job_id, path = %artifact.display(), "Job completed");
                } else {
                    // The job vanished while running; nobody can retrieve the file.
                    warn!(job_id, "Job no longer registered; discarding artifact");
                    if let Err(e) = self.artifacts.discard(&artifact).await {
                        warn!(job_id, error = %e, "Failed to discard artifact");
                    }
                }
            }
            Err(e) => {
                error!(job_id, error = %e, "Job failed");
                self.registry.fail(job_id, e.to_string());
            }
        }
    }

    /// Acquire, probe, transcode, persist. The work directory is removed when
    /// this returns, whichever way it returns.
    async fn execute(&self, job_id: &str, url: &str, cancel: &CancellationToken) -> Result<PathBuf> {
        let workspace = self.artifacts.create_workspace(job_id).await?;
        let plan = StagePlan::audio_conversion(&self.config, url, workspace.path());
        let mut aggregator = ProgressAggregator::new(plan.weights())?;

        for (index, stage) in plan.stages.iter().enumerate() {
            let parser = self.parser_for(stage, cancel).await?;
            debug!(
                job_id,
                tool = %stage.invocation.tool,
                stage = index,
                "Stage started"
            );

            let registry = &self.registry;
            let options = RunOptions {
                cap_while_running: stage.cap_while_running,
            };
            run_tool(&stage.invocation, parser, options, cancel, |local| {
                let overall = aggregator.update(index, local);
                if registry.advance(job_id, overall) {
                    trace!(job_id, percent = overall, "Progress");
                }
            })
            .await?;

            info!(
                job_id,
                tool = %stage.invocation.tool,
                percent = aggregator.overall(),
                "Stage finished"
            );
        }

        self.artifacts.persist(job_id, &plan.output).await
    }

    async fn parser_for(
        &self,
        stage: &StageDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ProgressParser> {
        Ok(match stage.pattern {
            ProgressPattern::Percentage => ProgressParser::percentage(),
            ProgressPattern::ElapsedTime => {
                let duration = match &stage.duration_source {
                    Some(source) => {
                        probe_duration_or_default(
                            &self.config.ffprobe_path,
                            source,
                            self.config.probe_timeout,
                            cancel,
                        )
                        .await?
                    }
                    None => DEFAULT_DURATION_US,
                };
                ProgressParser::elapsed(duration)
            }
        })
    }
}
