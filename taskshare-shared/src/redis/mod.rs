/// Redis connectivity
///
/// One [`RedisClient`] is shared by every Redis-backed component:
///
/// ```text
///                   ┌──> RedisJsonStore     JSON.* / FT.* on task: and user: keys
/// RedisClient ──────┼──> RedisPublisher     PUBLISH channel:updates
///  (manager)        ├──> RedisDistributor   SUBSCRIBE channel:updates (own connection)
///                   └──> StreamActivityLog  XADD stream:task_events
/// ```
///
/// # Example
///
/// ```no_run
/// use taskshare_shared::redis::{RedisClient, RedisConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = RedisClient::new(RedisConfig::from_env()?).await?;
/// assert!(client.ping().await?);
/// # Ok(())
/// # }
/// ```
pub mod client;

pub use client::{sanitize_url, RedisClient, RedisClientError, RedisConfig};
