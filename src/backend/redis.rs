//! Redis backend implementation.

use ::redis::aio::{ConnectionManager, ConnectionManagerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::backend::{
    Backend, Queue, QueueOptions, QueueScheduler, SchedulerOptions, Worker, WorkerOptions,
};
use crate::config::Connection;
use crate::error::Result;
use crate::job::JobHandler;
use crate::queue::RedisQueue;
use crate::scheduler::RedisQueueScheduler;
use crate::worker::RedisWorker;

/// Backend that stores queues in Redis.
///
/// Handles are created without touching the network; each one opens its
/// own connection manager on first use.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisBackend;

impl RedisBackend {
    /// Create a new Redis backend.
    pub fn new() -> Self {
        Self
    }
}

impl Backend for RedisBackend {
    fn queue(&self, name: &str, options: QueueOptions) -> Result<Arc<dyn Queue>> {
        Ok(Arc::new(RedisQueue::new(name, options)?))
    }

    fn worker(
        &self,
        name: &str,
        handler: JobHandler,
        options: WorkerOptions,
    ) -> Result<Arc<dyn Worker>> {
        Ok(RedisWorker::new(name, handler, options)?)
    }

    fn queue_scheduler(
        &self,
        name: &str,
        options: SchedulerOptions,
    ) -> Result<Arc<dyn QueueScheduler>> {
        Ok(RedisQueueScheduler::new(name, options)?)
    }
}

const CONNECT_RETRIES: usize = 2;
const CONNECT_MAX_DELAY_MS: u64 = 1_000;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis client with a connection manager opened on first use.
#[derive(Clone)]
pub(crate) struct LazyConnection {
    client: ::redis::Client,
    conn: Arc<OnceCell<ConnectionManager>>,
}

impl LazyConnection {
    /// Validate the connection settings without connecting.
    pub(crate) fn open(connection: &Connection) -> Result<Self> {
        let client = ::redis::Client::open(connection.connection_info())?;
        Ok(Self {
            client,
            conn: Arc::new(OnceCell::new()),
        })
    }

    /// Shared connection, established on the first call.
    pub(crate) async fn get(&self) -> Result<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| {
                ConnectionManager::new_with_config(self.client.clone(), manager_config())
            })
            .await?;
        Ok(conn.clone())
    }

    /// A fresh connection, for commands that block.
    pub(crate) async fn dedicated(&self) -> Result<ConnectionManager> {
        Ok(ConnectionManager::new_with_config(self.client.clone(), manager_config()).await?)
    }

    /// Connect and round-trip a PING.
    pub(crate) async fn ping(&self) -> Result<()> {
        let mut conn = self.get().await?;
        ::redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

/// Unreachable servers fail within a few seconds instead of retrying for
/// minutes.
fn manager_config() -> ConnectionManagerConfig {
    ConnectionManagerConfig::new()
        .set_number_of_retries(CONNECT_RETRIES)
        .set_max_delay(CONNECT_MAX_DELAY_MS)
        .set_connection_timeout(CONNECT_TIMEOUT)
}


// ========== Integration Tests (require Redis) ==========
