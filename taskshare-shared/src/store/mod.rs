/// Key-addressed JSON document storage
///
/// The [`DocumentStore`] trait is the only way the rest of the crate touches
/// persisted state. Each call is atomic with respect to a single key: two
/// concurrent writers never observe a torn document, and numeric increments
/// are true atomic adds rather than read-modify-write.
///
/// # Backends
///
/// - [`memory::MemoryStore`]: in-process store with a synchronous secondary
///   index, used for tests and single-node deployments
/// - [`redis_json::RedisJsonStore`]: RedisJSON documents indexed by
///   RediSearch
///
/// # Architecture
///
/// ```text
/// TaskService ──get/merge/append──> DocumentStore ──> documents
///      │                                 │
///      └──────query(schema, q)───────────┴──> secondary index (updated in the
///                                              same call as the write)
/// ```
use crate::index::IndexSchema;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod path;
pub mod redis_json;

pub use memory::MemoryStore;
pub use path::{merge_patch, DocPath, Segment};
pub use redis_json::RedisJsonStore;

/// Document store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// No document under the key (or it has expired)
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// The path selects nothing inside the document
    #[error("Path {path} not found in {key}")]
    PathNotFound { key: String, path: String },

    /// The value at the path has the wrong JSON type for the operation
    #[error("Type mismatch at {path}: expected {expected}")]
    TypeMismatch { path: String, expected: &'static str },

    /// Array index past the end
    #[error("Index {index} out of range at {path}")]
    IndexOutOfRange { path: String, index: usize },

    /// Index query could not be parsed or executed
    #[error("Query error: {0}")]
    Query(String),

    /// Stored data could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend connectivity failure
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// A document returned by an index query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub key: String,
    pub document: Value,
}

/// Key-addressed JSON document storage with path-scoped mutations
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetches a whole document, `None` when absent or expired
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Stores a whole document, replacing any previous one
    async fn put(&self, key: &str, document: &Value) -> StoreResult<()>;

    /// Stores a whole document that expires after `ttl`, in one atomic step
    async fn put_expiring(&self, key: &str, document: &Value, ttl: Duration) -> StoreResult<()>;

    /// Merges `value` into the document at `path` (RFC 7396)
    ///
    /// Scalars and arrays are replaced wholesale; sibling paths are left
    /// untouched.
    async fn merge_path(&self, key: &str, path: &DocPath, value: &Value) -> StoreResult<()>;

    /// Appends one element to the array at `path`, returning the new length
    async fn append_path(&self, key: &str, path: &DocPath, value: &Value) -> StoreResult<usize>;

    /// Appends one element unless an element with the same `unique_field`
    /// value already exists. Returns whether the element was appended.
    async fn append_unique(
        &self,
        key: &str,
        path: &DocPath,
        value: &Value,
        unique_field: &str,
    ) -> StoreResult<bool>;

    /// Removes and returns the element at `index` of the array at `path`
    async fn remove_index(&self, key: &str, path: &DocPath, index: usize) -> StoreResult<Value>;

    /// Deletes whatever `path` selects, returning how many values were removed
    async fn delete_path(&self, key: &str, path: &DocPath) -> StoreResult<usize>;

    /// Sets the value at `path` and returns the previous one
    /// (`Value::Null` when the member did not exist)
    async fn swap_path(&self, key: &str, path: &DocPath, value: &Value) -> StoreResult<Value>;

    /// Like [`DocumentStore::swap_path`], but only while the value at `guard`
    /// equals `expected`; the check and the write are one atomic step.
    ///
    /// Returns `None`, leaving the document untouched, when the guard value
    /// differs. A guard path that selects nothing is `PathNotFound`.
    async fn swap_path_if(
        &self,
        key: &str,
        path: &DocPath,
        value: &Value,
        guard: &DocPath,
        expected: &Value,
    ) -> StoreResult<Option<Value>>;

    /// Atomically adds `delta` to the integer at `path`, returning the new value
    async fn increment_numeric(&self, key: &str, path: &DocPath, delta: i64) -> StoreResult<i64>;

    /// Deletes a document and its index entries. Returns whether it existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Sets a time-to-live on a document. Returns whether it existed.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Runs a query against a secondary index, at most `limit` hits
    async fn query(&self, schema: &IndexSchema, query: &str, limit: usize)
        -> StoreResult<Vec<QueryHit>>;
}
