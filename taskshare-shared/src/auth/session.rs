/// Opaque bearer sessions
///
/// A session token is 32 random bytes, hex encoded. Only the SHA-256 digest
/// of the token is persisted, as the document `session:<digest>`:
///
/// ```json
/// { "userId": "user:…", "createdAt": 1717000000000 }
/// ```
///
/// Sessions expire after a sliding TTL: every successful [`SessionStore::resolve`]
/// pushes the expiry forward again.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use taskshare_shared::auth::session::SessionStore;
/// use taskshare_shared::store::MemoryStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let sessions = SessionStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(3600));
/// let token = sessions.create("user:1").await?;
/// assert_eq!(sessions.resolve(&token).await?.as_deref(), Some("user:1"));
/// # Ok(())
/// # }
/// ```
use crate::store::{DocumentStore, StoreResult};
use chrono::Utc;
use rand::RngCore;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

pub const SESSION_KEY_PREFIX: &str = "session:";

const TOKEN_BYTES: usize = 32;

/// Generates a fresh random session token
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 hex digest of a token, the only form that is stored
pub fn hash_session_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn session_key(token: &str) -> String {
    format!("{}{}", SESSION_KEY_PREFIX, hash_session_token(token))
}

/// Maps bearer tokens to user ids
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn DocumentStore>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(store: Arc<dyn DocumentStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Opens a session for `user_id`, returning the bearer token
    pub async fn create(&self, user_id: &str) -> StoreResult<String> {
        let token = generate_session_token();
        let key = session_key(&token);

        self.store
            .put_expiring(
                &key,
                &json!({ "userId": user_id, "createdAt": Utc::now().timestamp_millis() }),
                self.ttl,
            )
            .await?;

        tracing::debug!(user_id = %user_id, "Session created");
        Ok(token)
    }

    /// Returns the user behind a token and refreshes its TTL
    ///
    /// `None` for unknown or expired tokens.
    pub async fn resolve(&self, token: &str) -> StoreResult<Option<String>> {
        let key = session_key(token);
        let Some(session) = self.store.get(&key).await? else {
            return Ok(None);
        };

        let Some(user_id) = session.get("userId").and_then(|v| v.as_str()) else {
            tracing::warn!("Session document without userId");
            return Ok(None);
        };

        self.store.expire(&key, self.ttl).await?;
        Ok(Some(user_id.to_string()))
    }

    /// Ends a session. Returns whether it existed.
    pub async fn revoke(&self, token: &str) -> StoreResult<bool> {
        self.store.delete(&session_key(token)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn sessions(ttl: Duration) -> SessionStore {
        SessionStore::new(Arc::new(MemoryStore::new()), ttl)
    }

    #[test]
    fn test_token_shape() {
        let token = generate_session_token();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_session_token());
    }

    #[test]
    fn test_hash_is_stable_and_not_the_token() {
        let token = "abc";
        assert_eq!(hash_session_token(token), hash_session_token(token));
        assert_eq!(
            hash_session_token(token),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_create_resolve_revoke() {
        let sessions = sessions(Duration::from_secs(60));
        let token = sessions.create("user:1").await.unwrap();

        assert_eq!(sessions.resolve(&token).await.unwrap().as_deref(), Some("user:1"));
        assert!(sessions.resolve("bogus").await.unwrap().is_none());

        assert!(sessions.revoke(&token).await.unwrap());
        assert!(sessions.resolve(&token).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_slides_on_resolve() {
        let sessions = sessions(Duration::from_secs(60));
        let token = sessions.create("user:1").await.unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(sessions.resolve(&token).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(sessions.resolve(&token).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(sessions.resolve(&token).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_expires_without_resolve() {
        let sessions = sessions(Duration::from_secs(60));
        let token = sessions.create("user:1").await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(sessions.resolve(&token).await.unwrap().is_none());
    }
}
