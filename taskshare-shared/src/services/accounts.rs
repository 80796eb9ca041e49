/// Accounts and sessions
///
/// Signup stores a user document with an Argon2id password hash. Login
/// verifies the hash and issues an opaque session token; every later
/// request resolves that token back to a user id through the
/// [`SessionStore`].
///
/// Unknown email and wrong password are both reported as
/// `InvalidCredentials` so the response does not reveal which accounts
/// exist.
use crate::auth::password::{hash_password, validate_password_strength, verify_password};
use crate::auth::SessionStore;
use crate::error::{CoreError, CoreResult};
use crate::models::{NewUser, User, UserProfile, USER_KEY_PREFIX};
use crate::queries;
use crate::store::{DocPath, DocumentStore, StoreError};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Signup input
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Result of a successful login or signup
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn DocumentStore>,
    sessions: SessionStore,
}

impl AccountService {
    pub fn new(store: Arc<dyn DocumentStore>, sessions: SessionStore) -> Self {
        Self { store, sessions }
    }

    /// Creates an account and opens a session for it
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a malformed email, blank username or weak
    /// password; `Conflict` when the email is taken.
    pub async fn signup(&self, input: NewAccount) -> CoreResult<LoginOutcome> {
        let email = input.email.trim().to_string();
        let username = input.username.trim().to_string();

        if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            return Err(CoreError::InvalidInput("invalid email".to_string()));
        }
        if username.is_empty() {
            return Err(CoreError::InvalidInput("username must not be empty".to_string()));
        }
        validate_password_strength(&input.password).map_err(CoreError::InvalidInput)?;

        // Check-then-put: two racing signups for one email can both pass
        match queries::find_user_by_email(self.store.as_ref(), &email).await {
            Ok(_) => return Err(CoreError::conflict("email already registered")),
            Err(CoreError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let password_hash = hash_password(&input.password)
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;

        let user = User::from_new(
            NewUser {
                email,
                username,
                password_hash,
            },
            Utc::now().timestamp_millis(),
        );
        let document = serde_json::to_value(&user).map_err(StoreError::from)?;
        self.store.put(&user.id, &document).await?;

        tracing::info!(user_id = %user.id, "User signed up");

        let token = self.sessions.create(&user.id).await?;
        Ok(LoginOutcome {
            token,
            user: user.profile(),
        })
    }

    /// Verifies credentials and opens a session
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` for an unknown email or wrong password.
    pub async fn login(&self, email: &str, password: &str) -> CoreResult<LoginOutcome> {
        let user = match queries::find_user_by_email(self.store.as_ref(), email.trim()).await {
            Ok(user) => user,
            Err(CoreError::NotFound(_)) => {
                tracing::debug!("Login for unknown email");
                return Err(CoreError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };

        let valid = verify_password(password, &user.password_hash)
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        if !valid {
            tracing::debug!(user_id = %user.id, "Login with wrong password");
            return Err(CoreError::InvalidCredentials);
        }

        let now = Utc::now().timestamp_millis();
        self.store
            .merge_path(&user.id, &DocPath::root(), &json!({ "lastActive": now }))
            .await?;

        let token = self.sessions.create(&user.id).await?;
        tracing::info!(user_id = %user.id, "User logged in");

        Ok(LoginOutcome {
            token,
            user: user.profile(),
        })
    }

    /// Resolves a session token to a user id, `None` when invalid or expired
    pub async fn resolve(&self, token: &str) -> CoreResult<Option<String>> {
        Ok(self.sessions.resolve(token).await?)
    }

    /// Revokes a session token; unknown tokens are ignored
    pub async fn logout(&self, token: &str) -> CoreResult<()> {
        if self.sessions.revoke(token).await? {
            tracing::debug!("Session revoked");
        }
        Ok(())
    }

    /// Public profile of a user
    pub async fn me(&self, user_id: &str) -> CoreResult<UserProfile> {
        if !user_id.starts_with(USER_KEY_PREFIX) {
            return Err(CoreError::not_found("User"));
        }

        let document = self
            .store
            .get(user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("User"))?;
        let user: User = serde_json::from_value(document)
            .map_err(|e| CoreError::StoreUnavailable(format!("corrupt user {}: {}", user_id, e)))?;

        Ok(user.profile())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn service() -> AccountService {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let sessions = SessionStore::new(store.clone(), Duration::from_secs(3600));
        AccountService::new(store, sessions)
    }

    fn account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            username: "alice".to_string(),
            password: "correct horse".to_string(),
        }
    }

    #[tokio::test]
    async fn test_signup_then_login() {
        let accounts = service();

        let signed_up = accounts.signup(account("alice@example.com")).await.unwrap();
        assert_eq!(signed_up.user.xp, 0);
        assert_eq!(signed_up.user.level, 1);

        let logged_in = accounts
            .login("alice@example.com", "correct horse")
            .await
            .unwrap();
        assert_eq!(logged_in.user.id, signed_up.user.id);
        assert_ne!(logged_in.token, signed_up.token);

        let resolved = accounts.resolve(&logged_in.token).await.unwrap();
        assert_eq!(resolved.as_deref(), Some(signed_up.user.id.as_str()));

        let me = accounts.me(&signed_up.user.id).await.unwrap();
        assert_eq!(me.username, "alice");
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let accounts = service();
        accounts.signup(account("bob@example.com")).await.unwrap();

        let err = accounts.signup(account("bob@example.com")).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_bad_credentials_are_indistinguishable() {
        let accounts = service();
        accounts.signup(account("carol@example.com")).await.unwrap();

        let wrong_password = accounts
            .login("carol@example.com", "incorrect horse")
            .await
            .unwrap_err();
        let unknown_email = accounts
            .login("nobody@example.com", "correct horse")
            .await
            .unwrap_err();

        assert!(matches!(wrong_password, CoreError::InvalidCredentials));
        assert!(matches!(unknown_email, CoreError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_signup_validation() {
        let accounts = service();

        let mut weak = account("dave@example.com");
        weak.password = "short".to_string();
        assert!(matches!(
            accounts.signup(weak).await,
            Err(CoreError::InvalidInput(_))
        ));

        assert!(matches!(
            accounts.signup(account("not-an-email")).await,
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_logout_invalidates_token() {
        let accounts = service();
        let outcome = accounts.signup(account("erin@example.com")).await.unwrap();

        accounts.logout(&outcome.token).await.unwrap();
        assert_eq!(accounts.resolve(&outcome.token).await.unwrap(), None);

        // Second logout is a no-op
        accounts.logout(&outcome.token).await.unwrap();
    }
}
