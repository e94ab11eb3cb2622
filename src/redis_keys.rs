//! Redis key management with prefix and queue name.

/// Manages the Redis keys of one queue.
#[derive(Debug, Clone)]
pub struct RedisKeys {
    prefix: String,
    queue: String,
}

impl RedisKeys {
    /// Create a new RedisKeys instance for `queue` under `prefix`.
    pub fn new(prefix: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            queue: queue.into(),
        }
    }

    /// Get the queue name.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}:{}", self.prefix, self.queue, suffix)
    }

    /// Key for the jobs ready to be processed (LIST).
    pub fn wait(&self) -> String {
        self.key("wait")
    }

    /// Key for delayed jobs (ZSET).
    /// Score is the Unix timestamp in milliseconds when the job becomes due.
    pub fn delayed(&self) -> String {
        self.key("delayed")
    }

    /// Key for completed jobs kept for inspection (LIST).
    pub fn completed(&self) -> String {
        self.key("completed")
    }

    /// Key for failed jobs kept for inspection (LIST).
    pub fn failed(&self) -> String {
        self.key("failed")
    }

    /// Key for repeatable job registrations (HASH, job name -> job JSON).
    pub fn repeat(&self) -> String {
        self.key("repeat")
    }
}
