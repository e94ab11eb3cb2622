//! Bulk registration of job definitions against a queue manager.

use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::backend::{EventKind, WorkerEvent};
use crate::error::{QmError, Result};
use crate::job::{JobHandler, JobsOptions};
use crate::manager::QueueManager;

/// One job to wire up: the queue it lives on, its name, whether it recurs,
/// its options and the handler the queue's worker runs.
#[derive(Clone)]
pub struct JobDefinition {
    /// Queue the job is added to and consumed from.
    pub queue: String,
    /// Job name.
    pub name: String,
    /// Add the job at registration time so its repeat options take effect.
    pub is_cron_job: bool,
    /// Options passed to `add` for cron jobs.
    pub options: JobsOptions,
    /// Handler for the queue's worker.
    pub handle: JobHandler,
}

impl JobDefinition {
    /// A plain job definition.
    pub fn new(queue: impl Into<String>, name: impl Into<String>, handle: JobHandler) -> Self {
        Self {
            queue: queue.into(),
            name: name.into(),
            is_cron_job: false,
            options: JobsOptions::default(),
            handle,
        }
    }

    /// A cron job definition added with `options` at registration.
    pub fn cron(
        queue: impl Into<String>,
        name: impl Into<String>,
        options: JobsOptions,
        handle: JobHandler,
    ) -> Self {
        Self {
            is_cron_job: true,
            options,
            ..Self::new(queue, name, handle)
        }
    }

    /// Set the options.
    pub fn options(mut self, options: JobsOptions) -> Self {
        self.options = options;
        self
    }
}

impl std::fmt::Debug for JobDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDefinition")
            .field("queue", &self.queue)
            .field("name", &self.name)
            .field("is_cron_job", &self.is_cron_job)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Create the queues and workers for `definitions` and attach logging.
///
/// Definitions are processed in order. For each one the queue is fetched
/// (or created), a cron job is added and awaited before moving on, the
/// worker is fetched (or created) with the definition's handler, and
/// `completed`/`failed` loggers are attached.
///
/// Readiness of every queue and worker is started as soon as the handle is
/// obtained and joined only after the loop: all queues first, then all
/// workers. The first error is returned. Nothing is undone on failure.
pub async fn register_jobs<I>(definitions: I, manager: &QueueManager) -> Result<()>
where
    I: IntoIterator<Item = JobDefinition>,
{
    let mut queue_ready = JoinSet::new();
    let mut worker_ready = JoinSet::new();

    for definition in definitions {
        let queue = manager.get_queue(&definition.queue, None)?;
        {
            let queue = queue.clone();
            queue_ready.spawn(async move { queue.wait_until_ready().await });
        }

        if definition.is_cron_job {
            queue
                .add(&definition.name, json!({}), definition.options.clone())
                .await?;
            tracing::debug!(
                queue = %definition.queue,
                job_name = %definition.name,
                "Cron job added"
            );
        }

        let worker = manager.get_worker(&definition.queue, definition.handle.clone(), None)?;
        {
            let worker = worker.clone();
            worker_ready.spawn(async move { worker.wait_until_ready().await });
        }

        worker.on(
            EventKind::Completed,
            Arc::new(|event: &WorkerEvent<'_>| {
                if let WorkerEvent::Completed { job } = event {
                    tracing::info!(
                        queue = %job.queue,
                        job_id = %job.id,
                        "Job {} completed successfully",
                        job.id
                    );
                }
            }),
        );

        worker.on(
            EventKind::Failed,
            Arc::new(|event: &WorkerEvent<'_>| {
                if let WorkerEvent::Failed { job, error } = event {
                    tracing::error!(
                        queue = %job.queue,
                        job_id = %job.id,
                        error = %error.message,
                        "Job {} failed with error {}",
                        job.id,
                        error.message
                    );
                }
            }),
        );
    }

    join_all(&mut queue_ready).await?;
    join_all(&mut worker_ready).await?;

    tracing::info!(
        queues = manager.queue_names().len(),
        workers = manager.worker_names().len(),
        "Jobs registered"
    );
    Ok(())
}

/// Wait for every task; return the first failure after all have finished.
async fn join_all(tasks: &mut JoinSet<Result<()>>) -> Result<()> {
    let mut first_error = None;
    while let Some(result) = tasks.join_next().await {
        let outcome = result.map_err(|e| QmError::Backend(format!("readiness task failed: {}", e)));
        if let Err(e) = outcome.and_then(|r| r) {
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
