/// User document model
///
/// Users are stored as JSON documents keyed by their id (`user:<uuid>`).
/// The `email` field is indexed as a case-sensitive tag and `username` as
/// tokenized text (see [`crate::index::user_index`]).
///
/// `xp` is only ever changed by the completion transition of the task
/// update protocol, which adds a fixed reward atomically.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key prefix shared by every user document
pub const USER_KEY_PREFIX: &str = "user:";

/// User document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user id (`user:<uuid>`)
    pub id: String,

    /// Email address, matched exactly (case-sensitive)
    pub email: String,

    pub username: String,

    /// Argon2id PHC string
    pub password_hash: String,

    /// Experience points, never decreases in normal operation
    #[serde(default)]
    pub xp: i64,

    #[serde(default = "default_level")]
    pub level: i64,

    #[serde(default)]
    pub current_streak: i64,

    /// Last activity in milliseconds since the Unix epoch
    #[serde(default)]
    pub last_active: i64,
}

fn default_level() -> i64 {
    1
}

/// Input for creating a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
}

impl User {
    /// Generates a fresh user id (`user:<uuid>`)
    pub fn generate_id() -> String {
        format!("{}{}", USER_KEY_PREFIX, Uuid::new_v4())
    }

    /// Builds a brand-new user document
    pub fn from_new(data: NewUser, now_ms: i64) -> Self {
        Self {
            id: Self::generate_id(),
            email: data.email,
            username: data.username,
            password_hash: data.password_hash,
            xp: 0,
            level: 1,
            current_streak: 0,
            last_active: now_ms,
        }
    }

    /// Public view of the user, without the password hash
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            email: self.email.clone(),
            username: self.username.clone(),
            xp: self.xp,
            level: self.level,
            current_streak: self.current_streak,
        }
    }
}

/// User fields safe to return to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub username: String,
    pub xp: i64,
    pub level: i64,
    pub current_streak: i64,
}
