//! Configuration types for the queue manager.

use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use serde::{Deserialize, Serialize};

/// Default Redis host when none is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default Redis port when none is configured.
pub const DEFAULT_PORT: u16 = 6379;

/// Storage section of the manager configuration.
///
/// Every field is optional; unset fields fall back to the loopback host,
/// the standard Redis port and no credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Configuration consumed by [`QueueManager`](crate::QueueManager).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Redis connection settings.
    #[serde(default)]
    pub storage: Option<StorageConfig>,
}

impl ManagerConfig {
    /// Create a configuration with the given storage settings.
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage: Some(storage),
        }
    }

    /// Create a new builder.
    pub fn builder() -> ManagerConfigBuilder {
        ManagerConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// Reads `QM_REDIS_HOST`, `QM_REDIS_PORT`, `QM_REDIS_USERNAME` and
    /// `QM_REDIS_PASSWORD`, each also accepted without the `QM_` prefix.
    /// The storage section stays `None` when none of them is set.
    pub fn from_env() -> Self {
        let mut storage = StorageConfig::default();
        let mut found = false;

        if let Some(host) = get_env_with_prefix("REDIS_HOST") {
            storage.host = Some(host);
            found = true;
        }

        if let Some(port) = get_env_with_prefix("REDIS_PORT") {
            match port.parse() {
                Ok(p) => {
                    storage.port = Some(p);
                    found = true;
                }
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid REDIS_PORT"),
            }
        }

        if let Some(username) = get_env_with_prefix("REDIS_USERNAME") {
            storage.username = Some(username);
            found = true;
        }

        if let Some(password) = get_env_with_prefix("REDIS_PASSWORD") {
            storage.password = Some(password);
            found = true;
        }

        Self {
            storage: found.then_some(storage),
        }
    }

    /// Resolve the connection, applying defaults for unset fields.
    pub fn connection(&self) -> Connection {
        Connection::from_storage(self.storage.as_ref())
    }
}

/// Builder for ManagerConfig.
#[derive(Debug, Default)]
pub struct ManagerConfigBuilder {
    storage: StorageConfig,
}

impl ManagerConfigBuilder {
    /// Create a new builder with no storage fields set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Redis host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.storage.host = Some(host.into());
        self
    }

    /// Set the Redis port.
    pub fn port(mut self, port: u16) -> Self {
        self.storage.port = Some(port);
        self
    }

    /// Set the Redis username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.storage.username = Some(username.into());
        self
    }

    /// Set the Redis password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.storage.password = Some(password.into());
        self
    }

    /// Build the ManagerConfig.
    pub fn build(self) -> ManagerConfig {
        ManagerConfig::new(self.storage)
    }
}

/// Resolved connection settings shared by every handle of a manager.
#[derive(Clone, PartialEq, Eq)]
pub struct Connection {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Connection {
    /// Resolve a connection from an optional storage section.
    pub fn from_storage(storage: Option<&StorageConfig>) -> Self {
        let storage = storage.cloned().unwrap_or_default();
        Self {
            host: storage.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: storage.port.unwrap_or(DEFAULT_PORT),
            username: storage.username,
            password: storage.password,
        }
    }

    /// Redis connection info for this connection.
    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                username: self.username.clone(),
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::from_storage(None)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("QM_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_connection() {
        let conn = ManagerConfig::default().connection();
        assert_eq!(conn.host, "127.0.0.1");
        assert_eq!(conn.port, 6379);
        assert!(conn.username.is_none());
        assert!(conn.password.is_none());
    }

    #[test]
    fn test_partial_storage_uses_defaults() {
        let config = ManagerConfig::new(StorageConfig {
            host: Some("redis.internal".to_string()),
            ..Default::default()
        });
        let conn = config.connection();
        assert_eq!(conn.host, "redis.internal");
        assert_eq!(conn.port, DEFAULT_PORT);
    }

    #[test]
    fn test_builder() {
        let config = ManagerConfig::builder()
            .host("localhost")
            .port(6380)
            .username("user")
            .password("password")
            .build();
        let conn = config.connection();
        assert_eq!(conn.host, "localhost");
        assert_eq!(conn.port, 6380);
        assert_eq!(conn.username.as_deref(), Some("user"));
        assert_eq!(conn.password.as_deref(), Some("password"));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: ManagerConfig =
            serde_json::from_str(r#"{"storage":{"host":"localhost","port":6379}}"#).unwrap();
        let storage = config.storage.unwrap();
        assert_eq!(storage.host.as_deref(), Some("localhost"));
        assert!(storage.password.is_none());

        let empty: ManagerConfig = serde_json::from_str("{}").unwrap();
        assert!(empty.storage.is_none());
    }

    #[test]
    fn test_connection_info() {
        let conn = ManagerConfig::builder()
            .host("localhost")
            .username("user")
            .password("secret")
            .build()
            .connection();
        let info = conn.connection_info();
        assert_eq!(info.addr, ConnectionAddr::Tcp("localhost".to_string(), 6379));
        assert_eq!(info.redis.username.as_deref(), Some("user"));
        assert_eq!(info.redis.password.as_deref(), Some("secret"));
        assert_eq!(info.redis.db, 0);
    }

    #[test]
    fn test_debug_redacts_password() {
        let conn = ManagerConfig::builder().password("secret").build().connection();
        let debug = format!("{:?}", conn);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }
}
