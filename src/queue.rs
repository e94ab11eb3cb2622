//! Redis queue handle for adding jobs.

use ::redis::AsyncCommands;
use async_trait::async_trait;
use serde_json::Value;

use crate::backend::redis::LazyConnection;
use crate::backend::{Queue, QueueOptions, DEFAULT_PREFIX};
use crate::error::Result;
use crate::job::{Job, JobsOptions};
use crate::redis_keys::RedisKeys;

/// Producer handle for one Redis-backed queue.
#[derive(Clone)]
pub struct RedisQueue {
    name: String,
    conn: LazyConnection,
    keys: RedisKeys,
    default_job_options: JobsOptions,
}

impl RedisQueue {
    /// Create a queue handle. Does not connect.
    pub fn new(name: &str, options: QueueOptions) -> Result<Self> {
        let connection = options.connection.unwrap_or_default();
        let prefix = options.prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        Ok(Self {
            name: name.to_string(),
            conn: LazyConnection::open(&connection)?,
            keys: RedisKeys::new(prefix, name),
            default_job_options: options.default_job_options.unwrap_or_default(),
        })
    }

    /// Options every added job starts from.
    pub fn default_job_options(&self) -> &JobsOptions {
        &self.default_job_options
    }

    /// Get the Redis keys of this queue.
    pub fn keys(&self) -> &RedisKeys {
        &self.keys
    }

    /// Get the number of jobs waiting to be processed.
    pub async fn wait_len(&self) -> Result<usize> {
        let mut conn = self.conn.get().await?;
        let len: usize = conn.llen(self.keys.wait()).await?;
        Ok(len)
    }

    /// Get the number of delayed jobs.
    pub async fn delayed_len(&self) -> Result<usize> {
        let mut conn = self.conn.get().await?;
        let len: usize = conn.zcard(self.keys.delayed()).await?;
        Ok(len)
    }

    /// Get the number of completed jobs kept in the store.
    pub async fn completed_len(&self) -> Result<usize> {
        let mut conn = self.conn.get().await?;
        let len: usize = conn.llen(self.keys.completed()).await?;
        Ok(len)
    }

    /// Get the number of failed jobs kept in the store.
    pub async fn failed_len(&self) -> Result<usize> {
        let mut conn = self.conn.get().await?;
        let len: usize = conn.llen(self.keys.failed()).await?;
        Ok(len)
    }

    /// Names of the registered repeatable jobs.
    pub async fn repeatable_jobs(&self) -> Result<Vec<String>> {
        let mut conn = self.conn.get().await?;
        let names: Vec<String> = conn.hkeys(self.keys.repeat()).await?;
        Ok(names)
    }

    /// Remove a repeatable job registration. Returns whether it existed.
    pub async fn remove_repeatable(&self, name: &str) -> Result<bool> {
        let mut conn = self.conn.get().await?;
        let removed: usize = conn.hdel(self.keys.repeat(), name).await?;
        Ok(removed > 0)
    }
}

#[async_trait]
impl Queue for RedisQueue {
    fn name(&self) -> &str {
        &self.name
    }

    /// Add a job.
    ///
    /// Repeatable jobs are only recorded in the repeat hash, replacing an
    /// earlier registration with the same name. Nothing here runs them: an
    /// external repeat processor must enqueue each occurrence. Jobs with a
    /// positive delay go to the delayed set; everything else is pushed to
    /// the wait list.
    async fn add(&self, name: &str, data: Value, opts: JobsOptions) -> Result<Job> {
        let opts = self.default_job_options.merged_with(&opts);
        let job = Job::new(&self.name, name, data, opts);
        let json = job.to_json()?;

        let mut conn = self.conn.get().await?;

        if job.opts.repeat.is_some() {
            conn.hset::<_, _, _, ()>(self.keys.repeat(), &job.name, &json).await?;
            tracing::debug!(queue = %self.name, job_name = %job.name, "Repeatable job registered");
        } else if let Some(delay) = job.opts.delay.filter(|d| *d > 0) {
            let run_at = job.timestamp + delay as i64;
            conn.zadd::<_, _, _, ()>(self.keys.delayed(), &json, run_at).await?;
            tracing::debug!(queue = %self.name, job_id = %job.id, run_at = run_at, "Job delayed");
        } else {
            conn.lpush::<_, _, ()>(self.keys.wait(), &json).await?;
            tracing::debug!(queue = %self.name, job_id = %job.id, "Job enqueued");
        }

        Ok(job)
    }

    async fn wait_until_ready(&self) -> Result<()> {
        self.conn.ping().await
    }

    async fn close(&self) -> Result<()> {
        tracing::debug!(queue = %self.name, "Queue closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;

    #[test]
    fn test_queue_defaults() {
        let queue = RedisQueue::new("reports", QueueOptions::default()).unwrap();
        assert_eq!(queue.name(), "reports");
        assert_eq!(queue.keys().wait(), "qm:reports:wait");
        assert_eq!(queue.default_job_options(), &JobsOptions::default());
    }

    #[test]
    fn test_queue_options_applied() {
        let connection = ManagerConfig::builder().host("localhost").build().connection();
        let options = QueueOptions::default()
            .connection(connection)
            .prefix("app")
            .default_job_options(JobsOptions::retention_default());
        let queue = RedisQueue::new("reports", options).unwrap();
        assert_eq!(queue.keys().delayed(), "app:reports:delayed");
        assert_eq!(queue.default_job_options().remove_on_complete, Some(true));
        assert_eq!(queue.default_job_options().remove_on_fail, Some(false));
    }
}
