//! Backend abstraction for queue, worker and scheduler handles.
//!
//! The queue manager never talks to storage directly. A [`Backend`]
//! constructs the three resource kinds, and the handles it returns carry
//! all delivery semantics.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Connection;
use crate::error::{QmError, Result};
use crate::job::{Job, JobError, JobHandler, JobsOptions};

pub mod redis;

/// Default key prefix for queue data.
pub const DEFAULT_PREFIX: &str = "qm";

/// Options for constructing a queue.
///
/// Unset fields are filled by the queue manager before the backend sees
/// them; backends fall back to defaults for anything still unset.
#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    /// Connection to use instead of the manager's.
    pub connection: Option<Connection>,
    /// Options applied to every job added through this queue.
    pub default_job_options: Option<JobsOptions>,
    /// Key prefix.
    pub prefix: Option<String>,
}

impl QueueOptions {
    /// Set the default job options.
    pub fn default_job_options(mut self, options: JobsOptions) -> Self {
        self.default_job_options = Some(options);
        self
    }

    /// Set the connection.
    pub fn connection(mut self, connection: Connection) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Set the key prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

/// Options for constructing a worker.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Connection to use instead of the manager's.
    pub connection: Option<Connection>,
    /// Key prefix.
    pub prefix: Option<String>,
    /// Number of jobs processed in parallel.
    pub concurrency: usize,
    /// Timeout for blocking fetches.
    pub fetch_timeout: Duration,
    /// How long `close` waits for in-flight jobs.
    pub shutdown_timeout: Duration,
    /// Start processing as soon as the worker is constructed.
    pub autorun: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            connection: None,
            prefix: None,
            concurrency: 1,
            fetch_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(30),
            autorun: true,
        }
    }
}

impl WorkerOptions {
    /// Set the connection.
    pub fn connection(mut self, connection: Connection) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Set the key prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the number of parallel fetch loops.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the fetch timeout.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set how long `close` waits for in-flight jobs.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Enable or disable autorun.
    pub fn autorun(mut self, autorun: bool) -> Self {
        self.autorun = autorun;
        self
    }
}

/// Options for constructing a queue scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Connection to use instead of the manager's.
    pub connection: Option<Connection>,
    /// Key prefix.
    pub prefix: Option<String>,
    /// Interval between ticks.
    pub interval: Duration,
    /// Maximum jobs promoted per tick.
    pub batch_size: usize,
    /// Start ticking as soon as the scheduler is constructed.
    pub autorun: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            connection: None,
            prefix: None,
            interval: Duration::from_secs(1),
            batch_size: 100,
            autorun: true,
        }
    }
}

impl SchedulerOptions {
    /// Set the connection.
    pub fn connection(mut self, connection: Connection) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Set the key prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the tick interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the batch size.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Enable or disable autorun.
    pub fn autorun(mut self, autorun: bool) -> Self {
        self.autorun = autorun;
        self
    }
}

/// Lifecycle event kinds emitted by workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Completed,
    Failed,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Completed => f.write_str("completed"),
            EventKind::Failed => f.write_str("failed"),
        }
    }
}

/// A lifecycle event for one processed job.
#[derive(Debug)]
pub enum WorkerEvent<'a> {
    Completed { job: &'a Job },
    Failed { job: &'a Job, error: &'a JobError },
}

impl WorkerEvent<'_> {
    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            WorkerEvent::Completed { .. } => EventKind::Completed,
            WorkerEvent::Failed { .. } => EventKind::Failed,
        }
    }

    /// The job the event is about.
    pub fn job(&self) -> &Job {
        match self {
            WorkerEvent::Completed { job } | WorkerEvent::Failed { job, .. } => job,
        }
    }
}

/// Observer attached to a worker event.
pub type Listener = Arc<dyn Fn(&WorkerEvent<'_>) + Send + Sync>;

/// Listener list shared by worker implementations.
#[derive(Default)]
pub struct Listeners {
    inner: RwLock<Vec<(EventKind, Listener)>>,
}

impl Listeners {
    /// Create an empty listener list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener for `kind`.
    pub fn add(&self, kind: EventKind, listener: Listener) {
        self.inner.write().push((kind, listener));
    }

    /// Call every listener registered for the event's kind, in attach order.
    pub fn emit(&self, event: &WorkerEvent<'_>) {
        let kind = event.kind();
        let matching: Vec<Listener> = self
            .inner
            .read()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, l)| l.clone())
            .collect();
        for listener in matching {
            listener(event);
        }
    }

    /// Number of listeners attached for `kind`.
    pub fn count(&self, kind: EventKind) -> usize {
        self.inner.read().iter().filter(|(k, _)| *k == kind).count()
    }
}

/// Producer handle: enqueues jobs into a named queue.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Name of the queue.
    fn name(&self) -> &str;

    /// Add a job to the queue.
    async fn add(&self, name: &str, data: Value, opts: JobsOptions) -> Result<Job>;

    /// Resolve once the handle can reach its store.
    async fn wait_until_ready(&self) -> Result<()>;

    /// Release the handle's resources.
    async fn close(&self) -> Result<()>;
}

/// Consumer handle: executes jobs of a named queue and emits lifecycle events.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Name of the queue this worker consumes.
    fn name(&self) -> &str;

    /// Attach a lifecycle observer.
    fn on(&self, kind: EventKind, listener: Listener);

    /// Process jobs until closed.
    ///
    /// Returns immediately if the worker is already running or was closed.
    /// Needed only for workers built with `autorun` off or outside a runtime.
    async fn run(&self) -> Result<()>;

    /// Resolve once the handle can reach its store.
    async fn wait_until_ready(&self) -> Result<()>;

    /// Stop fetching, wait for in-flight jobs and release the handle's
    /// resources. A closed worker never runs again.
    async fn close(&self) -> Result<()>;
}

/// Scheduler handle: moves delayed jobs of a named queue into the wait list.
#[async_trait]
pub trait QueueScheduler: Send + Sync {
    /// Name of the queue this scheduler serves.
    fn name(&self) -> &str;

    /// Tick until closed.
    ///
    /// Returns immediately if the scheduler is already running or was
    /// closed.
    async fn run(&self) -> Result<()>;

    /// Resolve once the handle can reach its store.
    async fn wait_until_ready(&self) -> Result<()>;

    /// Stop ticking and release the handle's resources. A closed scheduler
    /// never runs again.
    async fn close(&self) -> Result<()>;
}

/// Constructs queue, worker and scheduler handles.
///
/// Construction is synchronous and must not perform network I/O; failures
/// here are validation failures. Connection problems surface through
/// `wait_until_ready` or the first operation.
pub trait Backend: Send + Sync {
    fn queue(&self, name: &str, options: QueueOptions) -> Result<Arc<dyn Queue>>;

    fn worker(
        &self,
        name: &str,
        handler: JobHandler,
        options: WorkerOptions,
    ) -> Result<Arc<dyn Worker>>;

    fn queue_scheduler(
        &self,
        name: &str,
        options: SchedulerOptions,
    ) -> Result<Arc<dyn QueueScheduler>>;
}

/// A type-erased backend that can be shared across threads.
pub type DynBackend = Arc<dyn Backend>;

/// Names of the backend resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Queue,
    Worker,
    QueueScheduler,
}

impl FromStr for ComponentKind {
    type Err = QmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Queue" => Ok(ComponentKind::Queue),
            "Worker" => Ok(ComponentKind::Worker),
            "QueueScheduler" => Ok(ComponentKind::QueueScheduler),
            other => Err(QmError::UnknownComponent(other.to_string())),
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentKind::Queue => f.write_str("Queue"),
            ComponentKind::Worker => f.write_str("Worker"),
            ComponentKind::QueueScheduler => f.write_str("QueueScheduler"),
        }
    }
}

/// Uncached constructor for one backend resource kind.
#[derive(Clone)]
pub enum Component {
    Queue(QueueConstructor),
    Worker(WorkerConstructor),
    QueueScheduler(SchedulerConstructor),
}

impl Component {
    pub(crate) fn new(kind: ComponentKind, backend: DynBackend) -> Self {
        match kind {
            ComponentKind::Queue => Component::Queue(QueueConstructor(backend)),
            ComponentKind::Worker => Component::Worker(WorkerConstructor(backend)),
            ComponentKind::QueueScheduler => {
                Component::QueueScheduler(SchedulerConstructor(backend))
            }
        }
    }

    /// The kind this constructor builds.
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::Queue(_) => ComponentKind::Queue,
            Component::Worker(_) => ComponentKind::Worker,
            Component::QueueScheduler(_) => ComponentKind::QueueScheduler,
        }
    }
}

/// Builds queue handles directly from the backend.
#[derive(Clone)]
pub struct QueueConstructor(DynBackend);

impl QueueConstructor {
    pub fn create(&self, name: &str, options: QueueOptions) -> Result<Arc<dyn Queue>> {
        self.0.queue(name, options)
    }
}

/// Builds worker handles directly from the backend.
#[derive(Clone)]
pub struct WorkerConstructor(DynBackend);

impl WorkerConstructor {
    pub fn create(
        &self,
        name: &str,
        handler: JobHandler,
        options: WorkerOptions,
    ) -> Result<Arc<dyn Worker>> {
        self.0.worker(name, handler, options)
    }
}

/// Builds scheduler handles directly from the backend.
#[derive(Clone)]
pub struct SchedulerConstructor(DynBackend);

impl SchedulerConstructor {
    pub fn create(&self, name: &str, options: SchedulerOptions) -> Result<Arc<dyn QueueScheduler>> {
        self.0.queue_scheduler(name, options)
    }
}
