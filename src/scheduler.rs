//! Scheduler for moving delayed jobs to the wait list.

use ::redis::AsyncCommands;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time;

use crate::backend::redis::LazyConnection;
use crate::backend::{QueueScheduler, SchedulerOptions, DEFAULT_PREFIX};
use crate::error::Result;
use crate::job::current_timestamp_millis;
use crate::redis_keys::RedisKeys;

/// Scheduler that moves delayed jobs to the wait list when their time comes.
pub struct RedisQueueScheduler {
    name: String,
    conn: LazyConnection,
    keys: RedisKeys,
    interval: Duration,
    batch_size: usize,
    running: AtomicBool,
    closed: AtomicBool,
    stop: Notify,
}

impl RedisQueueScheduler {
    /// Create a scheduler handle. Does not connect.
    ///
    /// With `autorun` set and a tokio runtime available, ticking starts in
    /// the background right away; otherwise call [`run`](QueueScheduler::run).
    pub fn new(name: &str, options: SchedulerOptions) -> Result<Arc<Self>> {
        let connection = options.connection.unwrap_or_default();
        let prefix = options.prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        let scheduler = Arc::new(Self {
            name: name.to_string(),
            conn: LazyConnection::open(&connection)?,
            keys: RedisKeys::new(prefix, name),
            interval: options.interval,
            batch_size: options.batch_size,
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            stop: Notify::new(),
        });

        if options.autorun {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let scheduler = scheduler.clone();
                    handle.spawn(async move {
                        if let Err(e) = scheduler.run().await {
                            tracing::error!(
                                queue = %scheduler.name,
                                error = %e,
                                "Scheduler run failed"
                            );
                        }
                    });
                }
                Err(_) => {
                    tracing::warn!(
                        queue = %name,
                        "No tokio runtime, scheduler not started until run() is called"
                    );
                }
            }
        }

        Ok(scheduler)
    }

    /// Check if the scheduler loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Process one tick. Returns the number of jobs moved.
    pub async fn tick(&self) -> Result<usize> {
        let now = current_timestamp_millis();
        let mut conn = self.conn.get().await?;

        let jobs: Vec<String> = conn
            .zrangebyscore_limit(self.keys.delayed(), "-inf", now, 0, self.batch_size as isize)
            .await?;

        if jobs.is_empty() {
            return Ok(0);
        }

        tracing::debug!(queue = %self.name, count = jobs.len(), "Moving delayed jobs to wait list");

        let delayed_key = self.keys.delayed();
        let wait_key = self.keys.wait();

        for job_json in &jobs {
            let mut pipe = ::redis::pipe();
            pipe.atomic().zrem(&delayed_key, job_json).lpush(&wait_key, job_json);

            pipe.query_async::<()>(&mut conn).await?;
        }

        Ok(jobs.len())
    }
}

#[async_trait]
impl QueueScheduler for RedisQueueScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    /// Run the scheduler loop.
    ///
    /// This will continuously check the delayed set and move jobs whose
    /// time has passed to the wait list, until closed.
    async fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // close() may have run before this task was first polled.
        if self.closed.load(Ordering::SeqCst) {
            self.running.store(false, Ordering::SeqCst);
            return Ok(());
        }

        tracing::info!(queue = %self.name, "Scheduler started");

        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.tick().await {
                tracing::error!(queue = %self.name, error = %e, "Scheduler tick failed");
            }

            tokio::select! {
                _ = self.stop.notified() => {}
                _ = time::sleep(self.interval) => {}
            }
        }

        tracing::info!(queue = %self.name, "Scheduler stopped");
        Ok(())
    }

    async fn wait_until_ready(&self) -> Result<()> {
        self.conn.ping().await
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.stop.notify_one();
        Ok(())
    }
}
