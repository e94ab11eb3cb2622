//! Recording backend used by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use crate::backend::{
    Backend, ComponentKind, EventKind, Listener, Listeners, Queue, QueueOptions, QueueScheduler,
    SchedulerOptions, Worker, WorkerEvent, WorkerOptions,
};
use crate::error::{QmError, Result};
use crate::job::{Job, JobHandler, JobsOptions};

/// One observed backend interaction.
#[derive(Clone)]
pub enum Call {
    Queue { name: String, options: QueueOptions },
    Worker { name: String, handler: JobHandler, options: WorkerOptions },
    Scheduler { name: String, options: SchedulerOptions },
    Add { queue: String, name: String, data: Value, opts: JobsOptions },
    On { queue: String, kind: EventKind },
    Ready { kind: ComponentKind, name: String },
    Run { kind: ComponentKind, name: String },
    Close { kind: ComponentKind, name: String },
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Call::Queue { name, .. } => write!(f, "Queue({})", name),
            Call::Worker { name, .. } => write!(f, "Worker({})", name),
            Call::Scheduler { name, .. } => write!(f, "Scheduler({})", name),
            Call::Add { queue, name, .. } => write!(f, "Add({}, {})", queue, name),
            Call::On { queue, kind } => write!(f, "On({}, {})", queue, kind),
            Call::Ready { kind, name } => write!(f, "Ready({}, {})", kind, name),
            Call::Run { kind, name } => write!(f, "Run({}, {})", kind, name),
            Call::Close { kind, name } => write!(f, "Close({}, {})", kind, name),
        }
    }
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    failing_queues: HashSet<String>,
    failing_adds: HashSet<String>,
    failing_ready: HashSet<String>,
    workers: Vec<Arc<RecordingWorker>>,
}

/// Backend that records every call and hands out in-memory handles.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    state: Arc<Mutex<State>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the calls so far.
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Number of calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Make queue construction for `name` fail.
    pub fn fail_queue(&self, name: &str) {
        self.state.lock().failing_queues.insert(name.to_string());
    }

    /// Make `add` on queue `name` fail.
    pub fn fail_add(&self, name: &str) {
        self.state.lock().failing_adds.insert(name.to_string());
    }

    /// Make readiness of any handle named `name` fail.
    pub fn fail_ready(&self, name: &str) {
        self.state.lock().failing_ready.insert(name.to_string());
    }

    /// Workers created so far, in creation order.
    pub fn workers(&self) -> Vec<Arc<RecordingWorker>> {
        self.state.lock().workers.clone()
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }

    fn ready(&self, kind: ComponentKind, name: &str) -> Result<()> {
        self.record(Call::Ready {
            kind,
            name: name.to_string(),
        });
        if self.state.lock().failing_ready.contains(name) {
            return Err(QmError::Backend(format!("{} {} unreachable", kind, name)));
        }
        Ok(())
    }
}

impl Backend for RecordingBackend {
    fn queue(&self, name: &str, options: QueueOptions) -> Result<Arc<dyn Queue>> {
        self.record(Call::Queue {
            name: name.to_string(),
            options,
        });
        if self.state.lock().failing_queues.contains(name) {
            return Err(QmError::Backend(format!("invalid queue {}", name)));
        }
        Ok(Arc::new(RecordingQueue {
            name: name.to_string(),
            backend: self.clone(),
        }))
    }

    fn worker(
        &self,
        name: &str,
        handler: JobHandler,
        options: WorkerOptions,
    ) -> Result<Arc<dyn Worker>> {
        self.record(Call::Worker {
            name: name.to_string(),
            handler: handler.clone(),
            options,
        });
        let worker = Arc::new(RecordingWorker {
            name: name.to_string(),
            handler,
            listeners: Listeners::new(),
            backend: self.clone(),
        });
        self.state.lock().workers.push(worker.clone());
        Ok(worker)
    }

    fn queue_scheduler(
        &self,
        name: &str,
        options: SchedulerOptions,
    ) -> Result<Arc<dyn QueueScheduler>> {
        self.record(Call::Scheduler {
            name: name.to_string(),
            options,
        });
        Ok(Arc::new(RecordingScheduler {
            name: name.to_string(),
            backend: self.clone(),
        }))
    }
}

pub struct RecordingQueue {
    name: String,
    backend: RecordingBackend,
}

#[async_trait]
impl Queue for RecordingQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(&self, name: &str, data: Value, opts: JobsOptions) -> Result<Job> {
        self.backend.record(Call::Add {
            queue: self.name.clone(),
            name: name.to_string(),
            data: data.clone(),
            opts: opts.clone(),
        });
        if self.backend.state.lock().failing_adds.contains(&self.name) {
            return Err(QmError::Backend(format!("add to {} rejected", self.name)));
        }
        Ok(Job::new(&self.name, name, data, opts))
    }

    async fn wait_until_ready(&self) -> Result<()> {
        self.backend.ready(ComponentKind::Queue, &self.name)
    }

    async fn close(&self) -> Result<()> {
        self.backend.record(Call::Close {
            kind: ComponentKind::Queue,
            name: self.name.clone(),
        });
        Ok(())
    }
}

pub struct RecordingWorker {
    name: String,
    handler: JobHandler,
    listeners: Listeners,
    backend: RecordingBackend,
}

impl RecordingWorker {
    /// Run the handler on `job` and emit the matching event.
    pub async fn process(&self, job: Job) {
        match (self.handler)(job.clone()).await {
            Ok(()) => self.listeners.emit(&WorkerEvent::Completed { job: &job }),
            Err(error) => self.listeners.emit(&WorkerEvent::Failed {
                job: &job,
                error: &error,
            }),
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.count(kind)
    }
}

#[async_trait]
impl Worker for RecordingWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn on(&self, kind: EventKind, listener: Listener) {
        self.backend.record(Call::On {
            queue: self.name.clone(),
            kind,
        });
        self.listeners.add(kind, listener);
    }

    async fn run(&self) -> Result<()> {
        self.backend.record(Call::Run {
            kind: ComponentKind::Worker,
            name: self.name.clone(),
        });
        Ok(())
    }

    async fn wait_until_ready(&self) -> Result<()> {
        self.backend.ready(ComponentKind::Worker, &self.name)
    }

    async fn close(&self) -> Result<()> {
        self.backend.record(Call::Close {
            kind: ComponentKind::Worker,
            name: self.name.clone(),
        });
        Ok(())
    }
}

pub struct RecordingScheduler {
    name: String,
    backend: RecordingBackend,
}

#[async_trait]
impl QueueScheduler for RecordingScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<()> {
        self.backend.record(Call::Run {
            kind: ComponentKind::QueueScheduler,
            name: self.name.clone(),
        });
        Ok(())
    }

    async fn wait_until_ready(&self) -> Result<()> {
        self.backend.ready(ComponentKind::QueueScheduler, &self.name)
    }

    async fn close(&self) -> Result<()> {
        self.backend.record(Call::Close {
            kind: ComponentKind::QueueScheduler,
            name: self.name.clone(),
        });
        Ok(())
    }
}
