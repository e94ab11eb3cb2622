//! Redis worker for processing jobs.

use ::redis::aio::ConnectionManager;
use ::redis::AsyncCommands;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::backend::redis::LazyConnection;
use crate::backend::{
    EventKind, Listener, Listeners, Worker, WorkerEvent, WorkerOptions, DEFAULT_PREFIX,
};
use crate::error::Result;
use crate::job::{Job, JobHandler};
use crate::redis_keys::RedisKeys;

/// Consumer handle for one Redis-backed queue.
///
/// Runs `concurrency` fetch loops. Each loop pops a job, runs the handler
/// and emits `Completed` or `Failed`. There are no retries: a failed job is
/// kept in the failed list unless its options say otherwise.
pub struct RedisWorker {
    name: String,
    conn: LazyConnection,
    keys: RedisKeys,
    handler: JobHandler,
    concurrency: usize,
    fetch_timeout: Duration,
    shutdown_timeout: Duration,
    running: AtomicBool,
    closed: AtomicBool,
    in_progress: AtomicUsize,
    drain_notify: Notify,
    listeners: Listeners,
}

impl RedisWorker {
    /// Create a worker handle. Does not connect.
    ///
    /// With `autorun` set and a tokio runtime available, processing starts
    /// in the background right away; otherwise call [`run`](Worker::run).
    pub fn new(name: &str, handler: JobHandler, options: WorkerOptions) -> Result<Arc<Self>> {
        let connection = options.connection.unwrap_or_default();
        let prefix = options.prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        let worker = Arc::new(Self {
            name: name.to_string(),
            conn: LazyConnection::open(&connection)?,
            keys: RedisKeys::new(prefix, name),
            handler,
            concurrency: options.concurrency.max(1),
            fetch_timeout: options.fetch_timeout,
            shutdown_timeout: options.shutdown_timeout,
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            in_progress: AtomicUsize::new(0),
            drain_notify: Notify::new(),
            listeners: Listeners::new(),
        });

        if options.autorun {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let worker = worker.clone();
                    handle.spawn(async move {
                        if let Err(e) = worker.run().await {
                            tracing::error!(queue = %worker.name, error = %e, "Worker run failed");
                        }
                    });
                }
                Err(_) => {
                    tracing::warn!(
                        queue = %name,
                        "No tokio runtime, worker not started until run() is called"
                    );
                }
            }
        }

        Ok(worker)
    }

    /// Check if the worker is processing jobs.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the number of jobs currently in a handler.
    pub fn in_progress_count(&self) -> usize {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Number of listeners attached for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.count(kind)
    }

    async fn fetch_loop(&self, loop_id: usize) {
        let mut blocking: Option<ConnectionManager> = None;

        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.fetch_and_process(&mut blocking).await {
                tracing::error!(queue = %self.name, loop_id = loop_id, error = %e, "Worker error");
                blocking = None;
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }

    async fn fetch_and_process(&self, blocking: &mut Option<ConnectionManager>) -> Result<bool> {
        let mut fetch_conn = match blocking.clone() {
            Some(conn) => conn,
            None => {
                let conn = self.conn.dedicated().await?;
                *blocking = Some(conn.clone());
                conn
            }
        };

        let result: Option<(String, String)> = fetch_conn
            .brpop(self.keys.wait(), self.fetch_timeout.as_secs_f64())
            .await?;

        let job_json = match result {
            Some((_, json)) => json,
            None => return Ok(false),
        };

        let mut conn = self.conn.get().await?;

        // Closed while blocked: hand the job back to the end BRPOP reads from.
        if !self.running.load(Ordering::SeqCst) {
            conn.rpush::<_, _, ()>(self.keys.wait(), &job_json).await?;
            tracing::debug!(queue = %self.name, "Worker closed, job returned to wait list");
            return Ok(false);
        }

        self.in_progress.fetch_add(1, Ordering::SeqCst);
        let outcome = self.process(&mut conn, &job_json).await;
        self.in_progress.fetch_sub(1, Ordering::SeqCst);
        self.drain_notify.notify_waiters();

        outcome.map(|_| true)
    }

    async fn process(&self, conn: &mut ConnectionManager, job_json: &str) -> Result<()> {
        let mut job = match Job::from_json(job_json) {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(
                    queue = %self.name,
                    error = %e,
                    "Failed to parse job, moving to failed list"
                );
                conn.lpush::<_, _, ()>(self.keys.failed(), job_json).await?;
                return Ok(());
            }
        };

        tracing::debug!(
            queue = %self.name,
            job_id = %job.id,
            job_name = %job.name,
            "Processing job"
        );

        match (self.handler)(job.clone()).await {
            Ok(()) => {
                if job.opts.remove_on_complete != Some(true) {
                    conn.lpush::<_, _, ()>(self.keys.completed(), job.to_json()?).await?;
                }
                self.listeners.emit(&WorkerEvent::Completed { job: &job });
            }
            Err(err) => {
                job.failed_reason = Some(err.message.clone());
                if job.opts.remove_on_fail != Some(true) {
                    conn.lpush::<_, _, ()>(self.keys.failed(), job.to_json()?).await?;
                }
                self.listeners.emit(&WorkerEvent::Failed {
                    job: &job,
                    error: &err,
                });
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Worker for RedisWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn on(&self, kind: EventKind, listener: Listener) {
        self.listeners.add(kind, listener);
    }

    async fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // close() may have run before this task was first polled.
        if self.closed.load(Ordering::SeqCst) {
            self.running.store(false, Ordering::SeqCst);
            return Ok(());
        }

        tracing::info!(queue = %self.name, concurrency = self.concurrency, "Worker started");

        let loops = (0..self.concurrency).map(|loop_id| self.fetch_loop(loop_id));
        futures::future::join_all(loops).await;

        tracing::info!(queue = %self.name, "Worker stopped");
        Ok(())
    }

    async fn wait_until_ready(&self) -> Result<()> {
        self.conn.ping().await
    }

    /// Stop fetching and wait up to the shutdown timeout for jobs that are
    /// already in a handler.
    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        tracing::debug!(queue = %self.name, "Worker closing");

        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;
        while self.in_progress.load(Ordering::SeqCst) > 0 {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    queue = %self.name,
                    in_progress = self.in_progress.load(Ordering::SeqCst),
                    "Shutdown timeout reached, closing with jobs in flight"
                );
                break;
            }

            tokio::select! {
                _ = self.drain_notify.notified() => {}
                _ = tokio::time::sleep(Duration::from_millis(100)) => {}
            }
        }

        Ok(())
    }
}
