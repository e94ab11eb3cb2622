//! # qm - Queue Manager
//!
//! A registry for job queue handles. One [`QueueManager`] per process keeps
//! at most one queue, one worker and one scheduler per queue name, all
//! sharing the manager's connection settings. [`register_jobs`] wires up a
//! list of job definitions in one call.
//!
//! ## Features
//!
//! - **Cached handles**: repeated lookups by name return the same handle
//! - **Pluggable backend**: storage sits behind the [`Backend`] trait, Redis ships in-crate
//! - **Cron registration**: repeatable jobs are recorded during registration
//! - **Lifecycle logging**: completed and failed jobs are logged through `tracing`
//!
//! Nothing in this crate evaluates cron expressions. The Redis backend only
//! records repeatable jobs in the queue's `:repeat` hash (see
//! [`RedisQueue::repeatable_jobs`]); an external repeat processor has to
//! turn those entries into jobs on the wait list before a worker sees them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use qm::{
//!     handler, register_jobs, Job, JobDefinition, JobResult, JobsOptions, ManagerConfig,
//!     QueueManager, RepeatOptions,
//! };
//!
//! async fn send_digest(job: Job) -> JobResult {
//!     println!("Sending digest for job {}", job.id);
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> qm::Result<()> {
//!     let manager = QueueManager::get_instance(Some(ManagerConfig::from_env()))?;
//!
//!     // Records the repeatable job; it runs once a repeat processor enqueues it.
//!     register_jobs(
//!         vec![JobDefinition::cron(
//!             "digests",
//!             "daily-digest",
//!             JobsOptions::repeat(RepeatOptions::cron("0 8 * * *")),
//!             handler(send_digest),
//!         )],
//!         &manager,
//!     )
//!     .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     manager.close().await
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod job;
pub mod manager;
pub mod queue;
pub mod redis_keys;
pub mod registrar;
pub mod scheduler;
pub mod worker;

#[cfg(test)]
mod testing;

// Re-export main types
pub use backend::redis::RedisBackend;
pub use backend::{
    Backend, Component, ComponentKind, DynBackend, EventKind, Listener, Queue, QueueOptions,
    QueueScheduler, SchedulerOptions, Worker, WorkerEvent, WorkerOptions,
};
pub use config::{Connection, ManagerConfig, ManagerConfigBuilder, StorageConfig};
pub use error::{QmError, Result};
pub use job::{handler, Job, JobError, JobHandler, JobId, JobResult, JobsOptions, RepeatOptions};
pub use manager::QueueManager;
pub use queue::RedisQueue;
pub use redis_keys::RedisKeys;
pub use registrar::{register_jobs, JobDefinition};
pub use scheduler::RedisQueueScheduler;
pub use worker::RedisWorker;
