/// Redis client wrapper with connection management and health checks
///
/// Wraps `redis::aio::ConnectionManager`, which reconnects on its own, and
/// adds:
/// - Configuration from environment variables
/// - PING health checks with a timeout
/// - Dedicated pub/sub connections for the update subscriber
///
/// # Example
///
/// ```no_run
/// use taskshare_shared::redis::client::{RedisClient, RedisConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = RedisConfig::from_env()?;
/// let client = RedisClient::new(config).await?;
///
/// let healthy = client.ping().await?;
/// println!("Redis healthy: {}", healthy);
/// # Ok(())
/// # }
/// ```
use redis::aio::{ConnectionManager, PubSub};
use redis::{Client, RedisError};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Redis client errors
#[derive(Error, Debug)]
pub enum RedisClientError {
    #[error("Redis connection error: {0}")]
    ConnectionError(String),

    #[error("Redis command error: {0}")]
    CommandError(String),

    #[error("Redis configuration error: {0}")]
    ConfigError(String),

    #[error("Redis health check failed: {0}")]
    HealthCheckFailed(String),
}

impl From<RedisError> for RedisClientError {
    fn from(err: RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::IoError => {
                RedisClientError::ConnectionError(format!("IO error: {}", err))
            }
            redis::ErrorKind::ResponseError => {
                RedisClientError::CommandError(format!("Response error: {}", err))
            }
            _ => RedisClientError::CommandError(err.to_string()),
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Connection URL
    ///
    /// Format: redis://[username:password@]host:port[/db]
    pub url: String,

    pub connection_timeout_secs: u64,

    pub command_timeout_secs: u64,

    /// Retries for writes that tolerate being repeated (activity log XADD)
    pub max_retries: u32,
}

impl RedisConfig {
    /// Loads the configuration from environment variables
    ///
    /// # Environment Variables
    ///
    /// - `REDIS_URL`: connection URL (required)
    /// - `REDIS_CONNECTION_TIMEOUT_SECS`: connection timeout (default: 5)
    /// - `REDIS_COMMAND_TIMEOUT_SECS`: command timeout (default: 10)
    /// - `REDIS_MAX_RETRIES`: retry budget (default: 3)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `REDIS_URL` is not set.
    pub fn from_env() -> Result<Self, RedisClientError> {
        dotenvy::dotenv().ok();

        let url = env::var("REDIS_URL").map_err(|_| {
            RedisClientError::ConfigError("REDIS_URL environment variable is required".to_string())
        })?;

        Ok(Self::with_url(url).with_env_overrides())
    }

    /// Configuration with default timeouts for the given URL
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection_timeout_secs: 5,
            command_timeout_secs: 10,
            max_retries: 3,
        }
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse("REDIS_CONNECTION_TIMEOUT_SECS") {
            self.connection_timeout_secs = v;
        }
        if let Some(v) = env_parse("REDIS_COMMAND_TIMEOUT_SECS") {
            self.command_timeout_secs = v;
        }
        if let Some(v) = env_parse("REDIS_MAX_RETRIES") {
            self.max_retries = v;
        }
        self
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Shared Redis handle; cloning is cheap
#[derive(Clone)]
pub struct RedisClient {
    client: Client,
    manager: ConnectionManager,
    config: Arc<RedisConfig>,
}

impl RedisClient {
    /// Connects to Redis
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the connection cannot be
    /// established within the connection timeout.
    pub async fn new(config: RedisConfig) -> Result<Self, RedisClientError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| RedisClientError::ConfigError(format!("Invalid Redis URL: {}", e)))?;

        let manager = tokio::time::timeout(
            Duration::from_secs(config.connection_timeout_secs),
            ConnectionManager::new(client.clone()),
        )
        .await
        .map_err(|_| RedisClientError::ConnectionError("Connection timed out".to_string()))?
        .map_err(|e| {
            RedisClientError::ConnectionError(format!("Failed to connect to Redis: {}", e))
        })?;

        tracing::info!(
            "Redis client connected successfully to {}",
            sanitize_url(&config.url)
        );

        Ok(Self {
            client,
            manager,
            config: Arc::new(config),
        })
    }

    /// Sends PING, returning `true` on PONG
    ///
    /// # Errors
    ///
    /// Returns `HealthCheckFailed` if the command fails or times out.
    pub async fn ping(&self) -> Result<bool, RedisClientError> {
        let mut conn = self.manager.clone();

        let result: Result<String, RedisError> = tokio::time::timeout(
            self.config.command_timeout(),
            redis::cmd("PING").query_async(&mut conn),
        )
        .await
        .map_err(|_| RedisClientError::HealthCheckFailed("PING command timed out".to_string()))?;

        match result {
            Ok(pong) if pong == "PONG" => {
                tracing::debug!("Redis health check: PONG received");
                Ok(true)
            }
            Ok(other) => {
                tracing::warn!("Redis health check: unexpected response: {}", other);
                Ok(false)
            }
            Err(e) => {
                tracing::error!("Redis health check failed: {}", e);
                Err(RedisClientError::HealthCheckFailed(e.to_string()))
            }
        }
    }

    /// Multiplexed connection handle for regular commands
    pub fn get_connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Opens a dedicated connection in subscriber mode
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError` if the connection cannot be opened.
    pub async fn pubsub(&self) -> Result<PubSub, RedisClientError> {
        #[allow(deprecated)]
        let conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| RedisClientError::ConnectionError(e.to_string()))?;
        Ok(conn.into_pubsub())
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Connection URL with credentials masked
    pub fn url(&self) -> String {
        sanitize_url(&self.config.url)
    }
}

/// Masks `user:password` in a Redis URL for logging
pub fn sanitize_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(scheme_end) = url.find("://") {
            let scheme = &url[..scheme_end + 3];
            let host = &url[at_pos + 1..];
            return format!("{}***:***@{}", scheme, host);
        }
    }
    url.to_string()
}
