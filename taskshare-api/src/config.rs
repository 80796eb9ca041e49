/// Configuration management for the API server
///
/// This module loads configuration from environment variables (and an
/// optional `.env` file) into typed structs.
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 4000)
/// - `CORS_ORIGINS`: Comma-separated allowed origins (default: *)
/// - `STORE_BACKEND`: `memory` or `redis` (default: `redis` when `REDIS_URL`
///   is set, else `memory`)
/// - `REDIS_URL`: Redis Stack connection string (required for `redis`)
/// - `TASK_TTL_DAYS`: Task retention window (default: 30)
/// - `COMPLETION_XP_REWARD`: XP per completed task (default: 10)
/// - `VISIBLE_TASK_LIMIT`: Cap on listed tasks (default: 100)
/// - `SESSION_TTL_DAYS`: Sliding session lifetime (default: 30)
/// - `SESSION_BUFFER`: Undelivered events held per live connection (default: 64)
/// - `RUST_LOG`: Log filter
///
/// # Example
///
/// ```no_run
/// use taskshare_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use taskshare_shared::services::TaskServiceConfig;

const DAY_SECS: u64 = 24 * 60 * 60;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Storage backend selection
    pub store: StoreConfig,

    /// Task lifecycle tunables
    pub tasks: TaskConfig,

    /// Sessions and real-time delivery
    pub sessions: SessionConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `*` enables permissive CORS
    pub cors_origins: Vec<String>,
}

/// Which document store backs the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Single-process, in-memory store and bus
    Memory,

    /// RedisJSON + RediSearch store, Pub/Sub bus, stream activity log
    Redis,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "redis" => Ok(StoreBackend::Redis),
            other => anyhow::bail!("unknown STORE_BACKEND: {}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Seconds between sweeps of expired in-memory documents
    pub purge_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub ttl_days: u64,
    pub completion_xp_reward: i64,
    pub visible_task_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub ttl_days: u64,

    /// Per-connection event buffer; a full buffer drops events
    pub buffer: usize,
}

fn env_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {}: {}", name, e)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a variable has an invalid value.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let default_backend = if env::var("REDIS_URL").is_ok() {
            StoreBackend::Redis
        } else {
            StoreBackend::Memory
        };

        Ok(Self {
            api: ApiConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("API_PORT", 4000)?,
                cors_origins,
            },
            store: StoreConfig {
                backend: env_or("STORE_BACKEND", default_backend)?,
                purge_interval_secs: env_or("STORE_PURGE_INTERVAL_SECS", 60)?,
            },
            tasks: TaskConfig {
                ttl_days: env_or("TASK_TTL_DAYS", 30)?,
                completion_xp_reward: env_or("COMPLETION_XP_REWARD", 10)?,
                visible_task_limit: env_or("VISIBLE_TASK_LIMIT", 100)?,
            },
            sessions: SessionConfig {
                ttl_days: env_or("SESSION_TTL_DAYS", 30)?,
                buffer: env_or("SESSION_BUFFER", 64)?,
            },
        })
    }

    /// Configuration for tests and local runs: in-memory backend, defaults
    pub fn in_memory() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 4000,
                cors_origins: vec!["*".to_string()],
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
                purge_interval_secs: 60,
            },
            tasks: TaskConfig {
                ttl_days: 30,
                completion_xp_reward: 10,
                visible_task_limit: 100,
            },
            sessions: SessionConfig {
                ttl_days: 30,
                buffer: 64,
            },
        }
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.sessions.ttl_days * DAY_SECS)
    }

    pub fn task_service_config(&self) -> TaskServiceConfig {
        TaskServiceConfig {
            task_ttl: Duration::from_secs(self.tasks.ttl_days * DAY_SECS),
            completion_xp_reward: self.tasks.completion_xp_reward,
            visible_task_limit: self.tasks.visible_task_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        let config = Config::in_memory();
        assert_eq!(config.bind_address(), "127.0.0.1:4000");
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!("Redis".parse::<StoreBackend>().unwrap(), StoreBackend::Redis);
        assert!("postgres".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_task_service_config() {
        let service = Config::in_memory().task_service_config();
        assert_eq!(service.task_ttl, Duration::from_secs(30 * DAY_SECS));
        assert_eq!(service.completion_xp_reward, 10);
        assert_eq!(service.visible_task_limit, 100);
    }
}
