/// RedisJSON document store with RediSearch indexes
///
/// Documents are stored with `JSON.SET` and mutated with the path-scoped
/// `JSON.*` commands. Every path mutation runs inside a Lua script that
/// first checks the key exists, so a mutation never creates a document
/// implicitly and missing documents surface as `StoreError::KeyNotFound`.
///
/// Multi-step operations (append-if-absent, swap, bounded array removal)
/// are single scripts and therefore atomic on the server.
///
/// # Example
///
/// ```no_run
/// use taskshare_shared::redis::{RedisClient, RedisConfig};
/// use taskshare_shared::store::{DocumentStore, RedisJsonStore};
/// use serde_json::json;
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = RedisClient::new(RedisConfig::from_env()?).await?;
/// let store = RedisJsonStore::new(client);
/// store.ensure_indexes().await?;
/// store.put("user:1", &json!({ "xp": 0 })).await?;
/// # Ok(())
/// # }
/// ```
use super::{DocPath, DocumentStore, QueryHit, StoreError, StoreResult};
use crate::index::{all_indexes, FieldKind, IndexSchema};
use crate::redis::RedisClient;
use async_trait::async_trait;
use redis::{from_redis_value, FromRedisValue, RedisError, Script};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Runs `ARGV[1]` on `KEYS[1]` with the remaining arguments, if the key exists
const GUARDED_CALL: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return redis.error_reply('NOKEY no such document')
end
local args = { ARGV[1], KEYS[1] }
for i = 2, #ARGV do
  args[#args + 1] = ARGV[i]
end
return redis.call(unpack(args))
"#;

/// ARGV: array path, duplicate-match path, element JSON
const APPEND_UNIQUE: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return redis.error_reply('NOKEY no such document')
end
local existing = redis.call('JSON.GET', KEYS[1], ARGV[2])
if existing and existing ~= '[]' then
  return 0
end
local lens = redis.call('JSON.ARRAPPEND', KEYS[1], ARGV[1], ARGV[3])
if #lens == 0 then
  return redis.error_reply('NOPATH path not found')
end
if not lens[1] then
  return redis.error_reply('NOTARRAY value is not an array')
end
return 1
"#;

/// ARGV: path, new value JSON. Returns the previous matches as a JSON array.
const SWAP: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return redis.error_reply('NOKEY no such document')
end
local previous = redis.call('JSON.GET', KEYS[1], ARGV[1])
local ok = redis.call('JSON.SET', KEYS[1], ARGV[1], ARGV[2])
if not ok then
  return redis.error_reply('NOPATH path not found')
end
return previous
"#;

/// ARGV: path, new value JSON, guard path, expected guard matches as a JSON
/// array. The comparison is on RedisJSON's compact serialization.
const SWAP_IF: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return redis.error_reply('NOKEY no such document')
end
local current = redis.call('JSON.GET', KEYS[1], ARGV[3])
if not current or current == '[]' then
  return redis.error_reply('NOPATH path not found')
end
if current ~= ARGV[4] then
  return redis.error_reply('MISMATCH guard value differs')
end
local previous = redis.call('JSON.GET', KEYS[1], ARGV[1])
local ok = redis.call('JSON.SET', KEYS[1], ARGV[1], ARGV[2])
if not ok then
  return redis.error_reply('NOPATH path not found')
end
return previous
"#;

/// ARGV: document JSON, TTL in milliseconds
const PUT_EXPIRING: &str = r#"
redis.call('JSON.SET', KEYS[1], '$', ARGV[1])
redis.call('PEXPIRE', KEYS[1], ARGV[2])
return 1
"#;

/// ARGV: array path, index. ARRPOP clamps out-of-range indexes, so the
/// bound is checked first.
const REMOVE_INDEX: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return redis.error_reply('NOKEY no such document')
end
local lens = redis.call('JSON.ARRLEN', KEYS[1], ARGV[1])
if #lens == 0 then
  return redis.error_reply('NOPATH path not found')
end
if not lens[1] then
  return redis.error_reply('NOTARRAY value is not an array')
end
if tonumber(ARGV[2]) >= lens[1] then
  return redis.error_reply('OUTOFRANGE index out of range')
end
local popped = redis.call('JSON.ARRPOP', KEYS[1], ARGV[1], ARGV[2])
return popped[1]
"#;

/// [`DocumentStore`] backed by RedisJSON and RediSearch
#[derive(Clone)]
pub struct RedisJsonStore {
    client: RedisClient,
    guarded_call: Script,
    append_unique: Script,
    swap: Script,
    swap_if: Script,
    put_expiring: Script,
    remove_index: Script,
}

impl RedisJsonStore {
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            guarded_call: Script::new(GUARDED_CALL),
            append_unique: Script::new(APPEND_UNIQUE),
            swap: Script::new(SWAP),
            swap_if: Script::new(SWAP_IF),
            put_expiring: Script::new(PUT_EXPIRING),
            remove_index: Script::new(REMOVE_INDEX),
        }
    }

    /// Creates every missing RediSearch index
    ///
    /// Existing indexes are left alone, so this is safe to call on every
    /// startup.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if Redis rejects `FT.CREATE`.
    pub async fn ensure_indexes(&self) -> StoreResult<()> {
        let mut conn = self.client.get_connection();
        let existing: Vec<String> = self
            .timed(redis::cmd("FT._LIST").query_async(&mut conn))
            .await
            .map_err(unavailable)?;

        for schema in all_indexes() {
            if existing.iter().any(|name| name == schema.name) {
                tracing::debug!(index = schema.name, "Search index already exists");
                continue;
            }

            let _: () = self
                .timed(create_index_command(schema).query_async(&mut conn))
                .await
                .map_err(unavailable)?;
            tracing::info!(index = schema.name, prefix = schema.prefix, "Created search index");
        }

        Ok(())
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T, RedisError>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        match tokio::time::timeout(self.client.config().command_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(RedisError::from((
                redis::ErrorKind::IoError,
                "Redis command timed out",
            ))),
        }
    }

    /// Runs a JSON command through the existence guard
    async fn guarded<T: FromRedisValue>(
        &self,
        key: &str,
        path: &DocPath,
        command: &str,
        args: &[String],
    ) -> StoreResult<T> {
        let mut conn = self.client.get_connection();
        let mut invocation = self.guarded_call.key(key);
        invocation.arg(command);
        for arg in args {
            invocation.arg(arg);
        }

        self.timed(invocation.invoke_async(&mut conn))
            .await
            .map_err(|e| store_error(key, path, e))
    }
}

fn create_index_command(schema: &IndexSchema) -> redis::Cmd {
    let mut cmd = redis::cmd("FT.CREATE");
    cmd.arg(schema.name)
        .arg("ON")
        .arg("JSON")
        .arg("PREFIX")
        .arg(1)
        .arg(schema.prefix)
        .arg("SCHEMA");

    for field in schema.fields {
        cmd.arg(field.path).arg("AS").arg(field.alias);
        match field.kind {
            FieldKind::Tag { case_sensitive } => {
                cmd.arg("TAG");
                if case_sensitive {
                    cmd.arg("CASESENSITIVE");
                }
            }
            FieldKind::Text => {
                cmd.arg("TEXT");
            }
        }
    }

    cmd
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}

fn unavailable(err: RedisError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

/// Maps script error codes back to store errors
fn store_error(key: &str, path: &DocPath, err: RedisError) -> StoreError {
    match err.code() {
        Some("NOKEY") => StoreError::KeyNotFound(key.to_string()),
        Some("NOPATH") => StoreError::PathNotFound {
            key: key.to_string(),
            path: path.to_string(),
        },
        Some("NOTARRAY") => StoreError::TypeMismatch {
            path: path.to_string(),
            expected: "array",
        },
        _ => unavailable(err),
    }
}

/// Decodes the JSON array that `$`-path commands reply with
fn parse_matches(raw: Option<String>) -> StoreResult<Vec<Value>> {
    match raw {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(Vec::new()),
    }
}

/// Decodes an `FT.SEARCH` reply on a JSON index
///
/// Layout: `[total, key1, ["$", json1], key2, ["$", json2], ...]`
fn parse_search_reply(reply: &redis::Value) -> StoreResult<Vec<QueryHit>> {
    let redis::Value::Bulk(items) = reply else {
        return Err(StoreError::Query("unexpected FT.SEARCH reply".to_string()));
    };

    let mut hits = Vec::new();
    let mut rest = items.iter().skip(1);
    while let Some(key) = rest.next() {
        let key: String = from_redis_value(key).map_err(|e| StoreError::Query(e.to_string()))?;
        let Some(fields) = rest.next() else {
            break;
        };
        let fields: Vec<String> =
            from_redis_value(fields).map_err(|e| StoreError::Query(e.to_string()))?;

        let document = fields
            .chunks(2)
            .find(|pair| pair.first().map(String::as_str) == Some("$"))
            .and_then(|pair| pair.get(1))
            .ok_or_else(|| StoreError::Query(format!("search hit {} has no document", key)))?;

        hits.push(QueryHit {
            key,
            document: serde_json::from_str(document)?,
        });
    }

    Ok(hits)
}

#[async_trait]
impl DocumentStore for RedisJsonStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut conn = self.client.get_connection();
        let raw: Option<String> = self
            .timed(redis::cmd("JSON.GET").arg(key).arg("$").query_async(&mut conn))
            .await
            .map_err(unavailable)?;

        Ok(parse_matches(raw)?.into_iter().next())
    }

    async fn put(&self, key: &str, document: &Value) -> StoreResult<()> {
        let mut conn = self.client.get_connection();
        let _: () = self
            .timed(
                redis::cmd("JSON.SET")
                    .arg(key)
                    .arg("$")
                    .arg(document.to_string())
                    .query_async(&mut conn),
            )
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn put_expiring(&self, key: &str, document: &Value, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.client.get_connection();
        let _: i64 = self
            .timed(
                self.put_expiring
                    .key(key)
                    .arg(document.to_string())
                    .arg(ttl_millis(ttl))
                    .invoke_async(&mut conn),
            )
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn merge_path(&self, key: &str, path: &DocPath, value: &Value) -> StoreResult<()> {
        let _: redis::Value = self
            .guarded(
                key,
                path,
                "JSON.MERGE",
                &[path.to_json_path(), value.to_string()],
            )
            .await?;
        Ok(())
    }

    async fn append_path(&self, key: &str, path: &DocPath, value: &Value) -> StoreResult<usize> {
        let lengths: Vec<Option<usize>> = self
            .guarded(
                key,
                path,
                "JSON.ARRAPPEND",
                &[path.to_json_path(), value.to_string()],
            )
            .await?;

        match lengths.first() {
            Some(Some(len)) => Ok(*len),
            Some(None) => Err(StoreError::TypeMismatch {
                path: path.to_string(),
                expected: "array",
            }),
            None => Err(StoreError::PathNotFound {
                key: key.to_string(),
                path: path.to_string(),
            }),
        }
    }

    async fn append_unique(
        &self,
        key: &str,
        path: &DocPath,
        value: &Value,
        unique_field: &str,
    ) -> StoreResult<bool> {
        let unique_value = value
            .get(unique_field)
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::TypeMismatch {
                path: format!("{}.{}", path, unique_field),
                expected: "string",
            })?;
        let duplicate_path = path.clone().matching(unique_field, unique_value);

        let mut conn = self.client.get_connection();
        let appended: i64 = self
            .timed(
                self.append_unique
                    .key(key)
                    .arg(path.to_json_path())
                    .arg(duplicate_path.to_json_path())
                    .arg(value.to_string())
                    .invoke_async(&mut conn),
            )
            .await
            .map_err(|e| store_error(key, path, e))?;

        Ok(appended == 1)
    }

    async fn remove_index(&self, key: &str, path: &DocPath, index: usize) -> StoreResult<Value> {
        let mut conn = self.client.get_connection();
        let popped: Option<String> = self
            .timed(
                self.remove_index
                    .key(key)
                    .arg(path.to_json_path())
                    .arg(index)
                    .invoke_async(&mut conn),
            )
            .await
            .map_err(|e| match e.code() {
                Some("OUTOFRANGE") => StoreError::IndexOutOfRange {
                    path: path.to_string(),
                    index,
                },
                _ => store_error(key, path, e),
            })?;

        match popped {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Value::Null),
        }
    }

    async fn delete_path(&self, key: &str, path: &DocPath) -> StoreResult<usize> {
        if path.is_root() {
            return Ok(usize::from(self.delete(key).await?));
        }

        self.guarded(key, path, "JSON.DEL", &[path.to_json_path()])
            .await
    }

    async fn swap_path(&self, key: &str, path: &DocPath, value: &Value) -> StoreResult<Value> {
        let mut conn = self.client.get_connection();
        let previous: Option<String> = self
            .timed(
                self.swap
                    .key(key)
                    .arg(path.to_json_path())
                    .arg(value.to_string())
                    .invoke_async(&mut conn),
            )
            .await
            .map_err(|e| store_error(key, path, e))?;

        Ok(parse_matches(previous)?
            .into_iter()
            .next()
            .unwrap_or(Value::Null))
    }

    async fn swap_path_if(
        &self,
        key: &str,
        path: &DocPath,
        value: &Value,
        guard: &DocPath,
        expected: &Value,
    ) -> StoreResult<Option<Value>> {
        let mut conn = self.client.get_connection();
        let expected_matches = Value::Array(vec![expected.clone()]).to_string();
        let result: Result<Option<String>, RedisError> = self
            .timed(
                self.swap_if
                    .key(key)
                    .arg(path.to_json_path())
                    .arg(value.to_string())
                    .arg(guard.to_json_path())
                    .arg(expected_matches)
                    .invoke_async(&mut conn),
            )
            .await;

        match result {
            Ok(previous) => Ok(Some(
                parse_matches(previous)?
                    .into_iter()
                    .next()
                    .unwrap_or(Value::Null),
            )),
            Err(e) if e.code() == Some("MISMATCH") => Ok(None),
            Err(e) => Err(store_error(key, path, e)),
        }
    }

    async fn increment_numeric(&self, key: &str, path: &DocPath, delta: i64) -> StoreResult<i64> {
        let raw: Option<String> = self
            .guarded(
                key,
                path,
                "JSON.NUMINCRBY",
                &[path.to_json_path(), delta.to_string()],
            )
            .await?;

        let first = parse_matches(raw)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::PathNotFound {
                key: key.to_string(),
                path: path.to_string(),
            })?;

        first.as_i64().ok_or_else(|| StoreError::TypeMismatch {
            path: path.to_string(),
            expected: "integer",
        })
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.client.get_connection();
        let removed: i64 = self
            .timed(redis::cmd("DEL").arg(key).query_async(&mut conn))
            .await
            .map_err(unavailable)?;
        Ok(removed > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.client.get_connection();
        let applied: i64 = self
            .timed(
                redis::cmd("PEXPIRE")
                    .arg(key)
                    .arg(ttl_millis(ttl))
                    .query_async(&mut conn),
            )
            .await
            .map_err(unavailable)?;
        Ok(applied == 1)
    }

    async fn query(
        &self,
        schema: &IndexSchema,
        query: &str,
        limit: usize,
    ) -> StoreResult<Vec<QueryHit>> {
        let mut conn = self.client.get_connection();
        let reply: redis::Value = self
            .timed(
                redis::cmd("FT.SEARCH")
                    .arg(schema.name)
                    .arg(query)
                    .arg("LIMIT")
                    .arg(0)
                    .arg(limit)
                    .query_async(&mut conn),
            )
            .await
            .map_err(|e| {
                if e.kind() == redis::ErrorKind::ResponseError {
                    StoreError::Query(e.to_string())
                } else {
                    unavailable(e)
                }
            })?;

        parse_search_reply(&reply)
    }
}
