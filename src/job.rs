//! Job definition and related types.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random JobId.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Recurrence settings for a repeatable job.
///
/// The expression is stored as given; evaluating it is left to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepeatOptions {
    /// Cron expression, e.g. `*/1 * * * *`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    /// Fixed interval in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub every: Option<u64>,
    /// Maximum number of repetitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl RepeatOptions {
    /// Repeat on a cron expression.
    pub fn cron(expression: impl Into<String>) -> Self {
        Self {
            cron: Some(expression.into()),
            ..Default::default()
        }
    }

    /// Repeat every `millis` milliseconds.
    pub fn every(millis: u64) -> Self {
        Self {
            every: Some(millis),
            ..Default::default()
        }
    }
}

/// Per-job options bag.
///
/// Well-known keys are typed; anything else is kept verbatim in `extra` and
/// handed to the backend untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsOptions {
    /// Delay in milliseconds before the job becomes available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    /// Recurrence settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<RepeatOptions>,
    /// Caller-chosen job id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Drop the job record once it completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_on_complete: Option<bool>,
    /// Drop the job record once it fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_on_fail: Option<bool>,
    /// Backend-specific settings.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobsOptions {
    /// Retention policy applied to queues that don't set their own:
    /// completed jobs are removed, failed jobs are kept.
    pub fn retention_default() -> Self {
        Self {
            remove_on_complete: Some(true),
            remove_on_fail: Some(false),
            ..Default::default()
        }
    }

    /// Options that recur according to `repeat`.
    pub fn repeat(repeat: RepeatOptions) -> Self {
        Self {
            repeat: Some(repeat),
            ..Default::default()
        }
    }

    /// Set the delay in milliseconds.
    pub fn delay(mut self, millis: u64) -> Self {
        self.delay = Some(millis);
        self
    }

    /// Set a custom job id.
    pub fn job_id(mut self, id: impl Into<String>) -> Self {
        self.job_id = Some(id.into());
        self
    }

    /// Set a backend-specific option.
    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Overlay `other` on top of `self`: fields set in `other` win.
    pub fn merged_with(&self, other: &JobsOptions) -> JobsOptions {
        let mut extra = self.extra.clone();
        extra.extend(other.extra.clone());
        JobsOptions {
            delay: other.delay.or(self.delay),
            repeat: other.repeat.clone().or_else(|| self.repeat.clone()),
            job_id: other.job_id.clone().or_else(|| self.job_id.clone()),
            remove_on_complete: other.remove_on_complete.or(self.remove_on_complete),
            remove_on_fail: other.remove_on_fail.or(self.remove_on_fail),
            extra,
        }
    }
}

/// A job with its payload and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// Job name within its queue.
    pub name: String,
    /// Queue the job belongs to.
    pub queue: String,
    /// The job payload.
    pub data: Value,
    /// Options the job was added with.
    pub opts: JobsOptions,
    /// Creation time (Unix epoch milliseconds).
    pub timestamp: i64,
    /// Error message from the failed attempt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
}

impl Job {
    /// Create a new job. The id comes from `opts.job_id` when set.
    pub fn new(
        queue: impl Into<String>,
        name: impl Into<String>,
        data: Value,
        opts: JobsOptions,
    ) -> Self {
        let id = opts.job_id.as_deref().map(JobId::from).unwrap_or_default();
        Self {
            id,
            name: name.into(),
            queue: queue.into(),
            data,
            opts,
            timestamp: current_timestamp_millis(),
            failed_reason: None,
        }
    }

    /// Serialize the job to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize a job from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Result type for job handlers.
pub type JobResult = std::result::Result<(), JobError>;

/// Error returned from job handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobError {
    /// Error message.
    pub message: String,
}

impl JobError {
    /// Create a new job error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl<E: std::error::Error> From<E> for JobError {
    fn from(err: E) -> Self {
        Self::new(err.to_string())
    }
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Type-erased job handler executed by workers.
pub type JobHandler = Arc<dyn Fn(Job) -> BoxFuture<'static, JobResult> + Send + Sync>;

/// Wrap an async function into a [`JobHandler`].
///
/// ```rust
/// use qm::{handler, Job, JobResult};
///
/// async fn cleanup(job: Job) -> JobResult {
///     println!("running {}", job.name);
///     Ok(())
/// }
///
/// let handle = handler(cleanup);
/// ```
pub fn handler<F, Fut>(f: F) -> JobHandler
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JobResult> + Send + 'static,
{
    Arc::new(move |job: Job| -> BoxFuture<'static, JobResult> { Box::pin(f(job)) })
}

/// Get current Unix timestamp in milliseconds.
pub(crate) fn current_timestamp_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_creation() {
        let job = Job::new("mail", "send", json!({"to": "a@example.com"}), JobsOptions::default());
        assert_eq!(job.queue, "mail");
        assert_eq!(job.name, "send");
        assert!(job.failed_reason.is_none());
        assert!(job.timestamp > 0);
    }

    #[test]
    fn test_job_uses_custom_id() {
        let job = Job::new("mail", "send", json!({}), JobsOptions::default().job_id("fixed"));
        assert_eq!(job.id, JobId::from("fixed"));
    }

    #[test]
    fn test_job_id_uniqueness() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn test_options_camel_case() {
        let opts = JobsOptions::retention_default();
        let value = serde_json::to_value(&opts).unwrap();
        assert_eq!(value, json!({"removeOnComplete": true, "removeOnFail": false}));
    }

    #[test]
    fn test_options_keep_unknown_keys() {
        let value = json!({"repeat": {"cron": "0 * * * *"}, "priority": 3});
        let opts: JobsOptions = serde_json::from_value(value).unwrap();
        assert_eq!(opts.repeat, Some(RepeatOptions::cron("0 * * * *")));
        assert_eq!(opts.extra.get("priority"), Some(&json!(3)));

        let back = serde_json::to_value(&opts).unwrap();
        assert_eq!(back, json!({"repeat": {"cron": "0 * * * *"}, "priority": 3}));
    }

    #[test]
    fn test_merged_with_prefers_overlay() {
        let base = JobsOptions::retention_default().extra("priority", json!(1));
        let overlay = JobsOptions {
            remove_on_complete: Some(false),
            ..Default::default()
        }
        .delay(500)
        .extra("priority", json!(5));

        let merged = base.merged_with(&overlay);
        assert_eq!(merged.remove_on_complete, Some(false));
        assert_eq!(merged.remove_on_fail, Some(false));
        assert_eq!(merged.delay, Some(500));
        assert_eq!(merged.extra.get("priority"), Some(&json!(5)));
    }

    #[test]
    fn test_job_error_from_std_error() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: JobError = io.into();
        assert_eq!(err.message, "disk full");
        assert_eq!(err.to_string(), "disk full");
    }

    #[tokio::test]
    async fn test_handler_wraps_async_fn() {
        let handle = handler(|job: Job| async move {
            if job.name == "bad" {
                Err(JobError::new("boom"))
            } else {
                Ok(())
            }
        });

        let ok = Job::new("q", "good", json!({}), JobsOptions::default());
        let bad = Job::new("q", "bad", json!({}), JobsOptions::default());
        assert!(handle(ok).await.is_ok());
        assert_eq!(handle(bad).await.unwrap_err().message, "boom");
    }
}
