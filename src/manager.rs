//! Registry of cached queue, worker and scheduler handles.

use parking_lot::{Mutex, RwLock};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::redis::RedisBackend;
use crate::backend::{
    Backend, Component, ComponentKind, DynBackend, Queue, QueueOptions, QueueScheduler,
    SchedulerOptions, Worker, WorkerOptions,
};
use crate::config::{Connection, ManagerConfig};
use crate::error::{QmError, Result};
use crate::job::{JobHandler, JobsOptions};

static INSTANCE: RwLock<Option<Arc<QueueManager>>> = parking_lot::const_rwlock(None);

struct WorkerEntry {
    worker: Arc<dyn Worker>,
    handler: JobHandler,
}

/// Lazily creates and caches one queue, worker and scheduler per name.
///
/// Every handle shares the connection resolved at construction. A handle
/// is created on first lookup and the same `Arc` is returned afterwards;
/// nothing is ever evicted. Creation happens under the map's lock, so
/// concurrent lookups of a new name create it once.
pub struct QueueManager {
    connection: Connection,
    backend: DynBackend,
    queues: Mutex<HashMap<String, Arc<dyn Queue>>>,
    workers: Mutex<HashMap<String, WorkerEntry>>,
    schedulers: Mutex<HashMap<String, Arc<dyn QueueScheduler>>>,
}

impl QueueManager {
    /// Create a manager backed by Redis.
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_backend(config, RedisBackend::new())
    }

    /// Create a manager with a specific backend.
    pub fn with_backend(config: ManagerConfig, backend: impl Backend + 'static) -> Self {
        Self {
            connection: config.connection(),
            backend: Arc::new(backend),
            queues: Mutex::new(HashMap::new()),
            workers: Mutex::new(HashMap::new()),
            schedulers: Mutex::new(HashMap::new()),
        }
    }

    /// Get the process-wide manager.
    ///
    /// With `Some(config)` a new Redis-backed manager is always created and
    /// replaces any previous one. With `None` the current manager is
    /// returned, or [`QmError::Uninitialized`] if there is none.
    pub fn get_instance(config: Option<ManagerConfig>) -> Result<Arc<QueueManager>> {
        match config {
            Some(config) => Ok(QueueManager::new(config).install()),
            None => INSTANCE.read().clone().ok_or(QmError::Uninitialized),
        }
    }

    /// Make this manager the process-wide one, replacing any previous one.
    pub fn install(self) -> Arc<QueueManager> {
        let manager = Arc::new(self);
        *INSTANCE.write() = Some(manager.clone());
        tracing::debug!(
            host = %manager.connection.host,
            port = manager.connection.port,
            "Queue manager installed"
        );
        manager
    }

    /// The connection shared by all handles.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Get the queue named `name`, creating it on first access.
    ///
    /// On creation, unset `options` fields get the manager's connection and
    /// default job options that remove completed jobs and keep failed ones.
    /// Options are ignored once the queue exists.
    pub fn get_queue(&self, name: &str, options: Option<QueueOptions>) -> Result<Arc<dyn Queue>> {
        let mut queues = self.queues.lock();
        match queues.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let mut options = options.unwrap_or_default();
                options.connection.get_or_insert_with(|| self.connection.clone());
                options.default_job_options.get_or_insert_with(JobsOptions::retention_default);

                let queue = self.backend.queue(name, options)?;
                tracing::debug!(queue = %name, "Queue created");
                Ok(entry.insert(queue).clone())
            }
        }
    }

    /// Get the worker for queue `name`, creating it bound to `handler` on
    /// first access.
    ///
    /// Once the worker exists, `handler` and `options` are ignored. Passing
    /// a handler other than the one the worker runs logs a warning.
    pub fn get_worker(
        &self,
        name: &str,
        handler: JobHandler,
        options: Option<WorkerOptions>,
    ) -> Result<Arc<dyn Worker>> {
        let mut workers = self.workers.lock();
        match workers.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                let existing = entry.get();
                if !Arc::ptr_eq(&existing.handler, &handler) {
                    tracing::warn!(
                        queue = %name,
                        "Worker already exists, ignoring the new handler"
                    );
                }
                Ok(existing.worker.clone())
            }
            Entry::Vacant(entry) => {
                let mut options = options.unwrap_or_default();
                options.connection.get_or_insert_with(|| self.connection.clone());

                let worker = self.backend.worker(name, handler.clone(), options)?;
                tracing::debug!(queue = %name, "Worker created");
                Ok(entry.insert(WorkerEntry { worker, handler }).worker.clone())
            }
        }
    }

    /// Get the queue scheduler for `name`, creating it on first access.
    pub fn get_scheduler(
        &self,
        name: &str,
        options: Option<SchedulerOptions>,
    ) -> Result<Arc<dyn QueueScheduler>> {
        let mut schedulers = self.schedulers.lock();
        match schedulers.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let mut options = options.unwrap_or_default();
                options.connection.get_or_insert_with(|| self.connection.clone());

                let scheduler = self.backend.queue_scheduler(name, options)?;
                tracing::debug!(queue = %name, "Scheduler created");
                Ok(entry.insert(scheduler).clone())
            }
        }
    }

    /// Uncached constructor for one resource kind of the backend.
    pub fn backend_component(&self, kind: ComponentKind) -> Component {
        Component::new(kind, self.backend.clone())
    }

    /// Names of the cached queues, sorted.
    pub fn queue_names(&self) -> Vec<String> {
        sorted_keys(&self.queues.lock())
    }

    /// Names of the cached workers, sorted.
    pub fn worker_names(&self) -> Vec<String> {
        sorted_keys(&self.workers.lock())
    }

    /// Names of the cached schedulers, sorted.
    pub fn scheduler_names(&self) -> Vec<String> {
        sorted_keys(&self.schedulers.lock())
    }

    /// Close every cached handle: workers, then schedulers, then queues.
    ///
    /// Handles stay cached. Every handle is closed even if one fails; the
    /// first error is returned.
    pub async fn close(&self) -> Result<()> {
        let workers: Vec<_> = self.workers.lock().values().map(|e| e.worker.clone()).collect();
        let schedulers: Vec<_> = self.schedulers.lock().values().cloned().collect();
        let queues: Vec<_> = self.queues.lock().values().cloned().collect();

        let mut first_error = None;
        for worker in workers {
            if let Err(e) = worker.close().await {
                tracing::error!(queue = %worker.name(), error = %e, "Failed to close worker");
                first_error.get_or_insert(e);
            }
        }
        for scheduler in schedulers {
            if let Err(e) = scheduler.close().await {
                tracing::error!(queue = %scheduler.name(), error = %e, "Failed to close scheduler");
                first_error.get_or_insert(e);
            }
        }
        for queue in queues {
            if let Err(e) = queue.close().await {
                tracing::error!(queue = %queue.name(), error = %e, "Failed to close queue");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<String> {
    let mut names: Vec<String> = map.keys().cloned().collect();
    names.sort();
    names
}
