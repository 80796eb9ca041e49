//! # TaskShare Shared Library
//!
//! Core of the collaborative task service: document storage, secondary
//! indexes, the sharing state machine and real-time fanout. The API crate
//! is a thin HTTP shell over [`services`].
//!
//! ## Module Organization
//!
//! - `store`: JSON document store with path-scoped atomic mutations
//!   (in-memory and RedisJSON backends)
//! - `index`: secondary index schemas and the tag/text query language
//! - `models`: task and user documents
//! - `sharing`: permission checks and invite transitions
//! - `queries`: visibility and email lookups over the indexes
//! - `services`: task and account operations
//! - `events`: fanout bus, session registry and activity log
//! - `auth`: password hashing and session tokens
//! - `redis`: Redis client and connection configuration
//! - `error`: core error taxonomy

pub mod auth;
pub mod error;
pub mod events;
pub mod index;
pub mod models;
pub mod queries;
pub mod redis;
pub mod services;
pub mod sharing;
pub mod store;

pub use error::{CoreError, CoreResult};

/// Current version of the TaskShare shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
