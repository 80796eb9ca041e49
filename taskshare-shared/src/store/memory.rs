/// In-process document store
///
/// Documents live in a [`DashMap`]; every mutation runs against a clone of
/// the document while the entry's shard lock is held and is committed only
/// if it succeeds, so a failed operation leaves the document untouched.
/// The secondary indexes are updated inside the same critical section as
/// the write, which makes index queries read-your-writes consistent.
///
/// Expiry is lazy: an expired document is invisible to every operation and
/// is physically removed on the next access or by
/// [`MemoryStore::purge_expired`].
///
/// # Example
///
/// ```
/// use taskshare_shared::store::{DocPath, DocumentStore, MemoryStore};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new();
/// store.put("user:1", &json!({ "xp": 0 })).await?;
/// let xp = store
///     .increment_numeric("user:1", &DocPath::root().field("xp"), 10)
///     .await?;
/// assert_eq!(xp, 10);
/// # Ok(())
/// # }
/// ```
use super::path::{merge_patch, select_mut, DocPath, Segment};
use super::{DocumentStore, QueryHit, StoreError, StoreResult};
use crate::index::{all_indexes, IndexSchema, MemoryIndex};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct StoredDocument {
    document: Value,
    expires_at: Option<Instant>,
}

impl StoredDocument {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// DashMap-backed [`DocumentStore`]
#[derive(Debug)]
pub struct MemoryStore {
    docs: DashMap<String, StoredDocument>,
    indexes: Vec<MemoryIndex>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store indexing every application schema
    pub fn new() -> Self {
        Self::with_indexes(&all_indexes())
    }

    pub fn with_indexes(schemas: &[&'static IndexSchema]) -> Self {
        Self {
            docs: DashMap::new(),
            indexes: schemas.iter().map(|s| MemoryIndex::new(*s)).collect(),
        }
    }

    /// Number of live documents
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.docs.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every expired document, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .docs
            .iter()
            .filter(|e| e.is_expired(now))
            .map(|e| e.key().clone())
            .collect();

        expired
            .into_iter()
            .filter(|key| self.evict_if_expired(key))
            .count()
    }

    /// Sweeps expired documents every `every` until cancelled
    pub async fn run_expiry_sweeper(
        self: Arc<Self>,
        every: Duration,
        shutdown: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let purged = self.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, "Expired documents purged");
                    }
                }
            }
        }
    }

    fn index_for(&self, key: &str) -> Option<&MemoryIndex> {
        self.indexes.iter().find(|i| i.schema().covers(key))
    }

    fn reindex(&self, key: &str, document: &Value) -> StoreResult<()> {
        match self.index_for(key) {
            Some(index) => index.index_document(key, document),
            None => Ok(()),
        }
    }

    fn deindex(&self, key: &str) -> StoreResult<()> {
        match self.index_for(key) {
            Some(index) => index.remove_document(key),
            None => Ok(()),
        }
    }

    /// Drops `key` if it has expired; index entries go first, under the
    /// entry lock
    fn evict_if_expired(&self, key: &str) -> bool {
        let now = Instant::now();
        self.docs
            .remove_if(key, |k, stored| {
                if stored.is_expired(now) {
                    if let Err(e) = self.deindex(k) {
                        tracing::warn!(key = %k, error = %e, "Failed to drop index entries");
                    }
                    true
                } else {
                    false
                }
            })
            .is_some()
    }

    /// Replaces the whole document and its expiry under the entry lock
    fn write(&self, key: &str, document: &Value, expires_at: Option<Instant>) -> StoreResult<()> {
        let mut entry = self
            .docs
            .entry(key.to_string())
            .or_insert_with(|| StoredDocument {
                document: Value::Null,
                expires_at: None,
            });

        self.reindex(key, document)?;
        *entry = StoredDocument {
            document: document.clone(),
            expires_at,
        };

        Ok(())
    }

    /// Applies `f` to a working copy of the document and commits on success
    fn mutate<T, F>(&self, key: &str, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Value) -> StoreResult<T>,
    {
        let now = Instant::now();
        let mut entry = match self.docs.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => entry,
            Some(entry) => {
                drop(entry);
                self.evict_if_expired(key);
                return Err(StoreError::KeyNotFound(key.to_string()));
            }
            None => return Err(StoreError::KeyNotFound(key.to_string())),
        };

        let mut working = entry.document.clone();
        let out = f(&mut working)?;
        self.reindex(key, &working)?;
        entry.document = working;

        Ok(out)
    }
}

fn path_not_found(key: &str, path: &DocPath) -> StoreError {
    StoreError::PathNotFound {
        key: key.to_string(),
        path: path.to_string(),
    }
}

fn type_mismatch(path: &DocPath, expected: &'static str) -> StoreError {
    StoreError::TypeMismatch {
        path: path.to_string(),
        expected,
    }
}

/// Selects the arrays `path` points at, failing if any match is not an array
fn select_arrays<'a>(
    key: &str,
    document: &'a mut Value,
    path: &DocPath,
) -> StoreResult<Vec<&'a mut Vec<Value>>> {
    let selected = select_mut(document, path.segments());
    if selected.is_empty() {
        return Err(path_not_found(key, path));
    }

    selected
        .into_iter()
        .map(|v| v.as_array_mut().ok_or_else(|| type_mismatch(path, "array")))
        .collect()
}

/// Replaces what `path` selects, creating a missing last member; returns the
/// first previous value (`Null` when created)
fn swap_in(key: &str, doc: &mut Value, path: &DocPath, value: &Value) -> StoreResult<Value> {
    let selected = select_mut(doc, path.segments());
    if !selected.is_empty() {
        let mut previous = Vec::with_capacity(selected.len());
        for target in selected {
            previous.push(std::mem::replace(target, value.clone()));
        }
        return Ok(previous.into_iter().next().unwrap_or(Value::Null));
    }

    match path.split_last() {
        Some((Segment::Field(name), parent)) => {
            let parents = select_mut(doc, parent);
            if parents.is_empty() {
                return Err(path_not_found(key, path));
            }
            for parent in parents {
                parent
                    .as_object_mut()
                    .ok_or_else(|| type_mismatch(path, "object"))?
                    .insert(name.clone(), value.clone());
            }
            Ok(Value::Null)
        }
        _ => Err(path_not_found(key, path)),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let now = Instant::now();
        let expired = match self.docs.get(key) {
            Some(stored) if !stored.is_expired(now) => return Ok(Some(stored.document.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.evict_if_expired(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, document: &Value) -> StoreResult<()> {
        self.write(key, document, None)
    }

    async fn put_expiring(&self, key: &str, document: &Value, ttl: Duration) -> StoreResult<()> {
        self.write(key, document, Some(Instant::now() + ttl))
    }

    async fn merge_path(&self, key: &str, path: &DocPath, value: &Value) -> StoreResult<()> {
        self.mutate(key, |doc| {
            let selected = select_mut(doc, path.segments());
            if !selected.is_empty() {
                for target in selected {
                    merge_patch(target, value);
                }
                return Ok(());
            }

            // A missing last member is created when its parent exists
            match path.split_last() {
                Some((Segment::Field(name), parent)) => {
                    let parents = select_mut(doc, parent);
                    if parents.is_empty() {
                        return Err(path_not_found(key, path));
                    }
                    for parent in parents {
                        let object = parent
                            .as_object_mut()
                            .ok_or_else(|| type_mismatch(path, "object"))?;
                        let slot = object.entry(name.clone()).or_insert(Value::Null);
                        merge_patch(slot, value);
                    }
                    Ok(())
                }
                _ => Err(path_not_found(key, path)),
            }
        })
    }

    async fn append_path(&self, key: &str, path: &DocPath, value: &Value) -> StoreResult<usize> {
        self.mutate(key, |doc| {
            let mut arrays = select_arrays(key, doc, path)?;
            for array in arrays.iter_mut() {
                array.push(value.clone());
            }
            Ok(arrays.first().map(|a| a.len()).unwrap_or(0))
        })
    }

    async fn append_unique(
        &self,
        key: &str,
        path: &DocPath,
        value: &Value,
        unique_field: &str,
    ) -> StoreResult<bool> {
        let candidate = value.get(unique_field).cloned().unwrap_or(Value::Null);

        self.mutate(key, |doc| {
            let mut arrays = select_arrays(key, doc, path)?;
            let duplicate = arrays
                .iter()
                .any(|a| a.iter().any(|item| item.get(unique_field) == Some(&candidate)));
            if duplicate {
                return Ok(false);
            }

            for array in arrays.iter_mut() {
                array.push(value.clone());
            }
            Ok(true)
        })
    }

    async fn remove_index(&self, key: &str, path: &DocPath, index: usize) -> StoreResult<Value> {
        self.mutate(key, |doc| {
            let mut arrays = select_arrays(key, doc, path)?;
            let array = arrays
                .first_mut()
                .ok_or_else(|| path_not_found(key, path))?;
            if index >= array.len() {
                return Err(StoreError::IndexOutOfRange {
                    path: path.to_string(),
                    index,
                });
            }
            Ok(array.remove(index))
        })
    }

    async fn delete_path(&self, key: &str, path: &DocPath) -> StoreResult<usize> {
        let Some((last, parent)) = path.split_last() else {
            return Ok(usize::from(self.delete(key).await?));
        };

        self.mutate(key, |doc| {
            let mut removed = 0;
            for target in select_mut(doc, parent) {
                match last {
                    Segment::Field(name) => {
                        if let Some(object) = target.as_object_mut() {
                            removed += usize::from(object.remove(name).is_some());
                        }
                    }
                    Segment::Index(index) => {
                        if let Some(array) = target.as_array_mut() {
                            if *index < array.len() {
                                array.remove(*index);
                                removed += 1;
                            }
                        }
                    }
                    Segment::Match { field, value } => {
                        if let Some(array) = target.as_array_mut() {
                            let before = array.len();
                            array.retain(|item| {
                                item.get(field.as_str()).and_then(Value::as_str)
                                    != Some(value.as_str())
                            });
                            removed += before - array.len();
                        }
                    }
                }
            }
            Ok(removed)
        })
    }

    async fn swap_path(&self, key: &str, path: &DocPath, value: &Value) -> StoreResult<Value> {
        self.mutate(key, |doc| swap_in(key, doc, path, value))
    }

    async fn swap_path_if(
        &self,
        key: &str,
        path: &DocPath,
        value: &Value,
        guard: &DocPath,
        expected: &Value,
    ) -> StoreResult<Option<Value>> {
        self.mutate(key, |doc| {
            let current = select_mut(doc, guard.segments())
                .into_iter()
                .next()
                .cloned()
                .ok_or_else(|| path_not_found(key, guard))?;
            if &current != expected {
                return Ok(None);
            }
            swap_in(key, doc, path, value).map(Some)
        })
    }

    async fn increment_numeric(&self, key: &str, path: &DocPath, delta: i64) -> StoreResult<i64> {
        self.mutate(key, |doc| {
            let selected = select_mut(doc, path.segments());
            if selected.is_empty() {
                return Err(path_not_found(key, path));
            }

            let mut first = None;
            for target in selected {
                let current = target.as_i64().ok_or_else(|| type_mismatch(path, "integer"))?;
                let next = current.saturating_add(delta);
                *target = Value::from(next);
                first.get_or_insert(next);
            }
            first.ok_or_else(|| path_not_found(key, path))
        })
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = Instant::now();
        let mut index_result = Ok(());
        let removed = self.docs.remove_if(key, |k, _| {
            index_result = self.deindex(k);
            true
        });
        index_result?;

        Ok(removed.is_some_and(|(_, stored)| !stored.is_expired(now)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        match self.docs.get_mut(key) {
            Some(mut stored) if !stored.is_expired(now) => {
                stored.expires_at = Some(now + ttl);
                Ok(true)
            }
            Some(stored) => {
                drop(stored);
                self.evict_if_expired(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn query(
        &self,
        schema: &IndexSchema,
        query: &str,
        limit: usize,
    ) -> StoreResult<Vec<QueryHit>> {
        let index = self
            .indexes
            .iter()
            .find(|i| i.schema().name == schema.name)
            .ok_or_else(|| StoreError::Query(format!("no such index: {}", schema.name)))?;

        // The index lock is released before documents are read
        let keys = index.search(query)?;

        let now = Instant::now();
        let mut hits = Vec::new();
        for key in keys {
            if hits.len() >= limit {
                break;
            }
            if let Some(stored) = self.docs.get(&key) {
                if !stored.is_expired(now) {
                    hits.push(QueryHit {
                        key,
                        document: stored.document.clone(),
                    });
                }
            }
        }

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{escape_query_value, task_index};
    use serde_json::json;

    fn task(owner: &str) -> Value {
        json!({
            "id": "t1",
            "ownerId": owner,
            "title": "Write report",
            "priority": "medium",
            "isCompleted": false,
            "sharedWith": [],
            "subtasks": [
                { "id": "s1", "title": "Outline", "isComplete": false },
                { "id": "s2", "title": "Draft", "isComplete": false }
            ]
        })
    }

    fn owner_query(user_id: &str) -> String {
        let id = escape_query_value(user_id);
        format!("@ownerId:{{{0}}} | @sharedUserId:{{{0}}}", id)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStore::new();
        store.put("task:1", &task("user:a")).await.unwrap();

        let doc = store.get("task:1").await.unwrap().unwrap();
        assert_eq!(doc["title"], "Write report");

        assert!(store.delete("task:1").await.unwrap());
        assert!(!store.delete("task:1").await.unwrap());
        assert!(store.get("task:1").await.unwrap().is_none());
        assert!(store
            .query(task_index(), &owner_query("user:a"), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_merge_path_keeps_siblings() {
        let store = MemoryStore::new();
        store.put("task:1", &task("user:a")).await.unwrap();

        store
            .merge_path("task:1", &DocPath::root(), &json!({ "title": "Final report" }))
            .await
            .unwrap();

        let doc = store.get("task:1").await.unwrap().unwrap();
        assert_eq!(doc["title"], "Final report");
        assert_eq!(doc["subtasks"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_merge_on_missing_key_fails() {
        let store = MemoryStore::new();
        let err = store
            .merge_path("task:none", &DocPath::root(), &json!({ "title": "x" }))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::KeyNotFound(_)));
    }

    #[tokio::test]
    async fn test_append_unique_rejects_duplicates() {
        let store = MemoryStore::new();
        store.put("task:1", &task("user:a")).await.unwrap();
        let path = DocPath::root().field("sharedWith");
        let entry = json!({ "userId": "user:b", "role": "viewer", "status": "pending" });

        assert!(store.append_unique("task:1", &path, &entry, "userId").await.unwrap());
        assert!(!store.append_unique("task:1", &path, &entry, "userId").await.unwrap());

        let hits = store
            .query(task_index(), &owner_query("user:b"), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_swap_path_reports_previous_value() {
        let store = MemoryStore::new();
        store.put("task:1", &task("user:a")).await.unwrap();
        let path = DocPath::root().field("isCompleted");

        let previous = store.swap_path("task:1", &path, &json!(true)).await.unwrap();
        assert_eq!(previous, json!(false));
        let previous = store.swap_path("task:1", &path, &json!(true)).await.unwrap();
        assert_eq!(previous, json!(true));

        let missing = DocPath::root().field("archived");
        let previous = store.swap_path("task:1", &missing, &json!(true)).await.unwrap();
        assert_eq!(previous, Value::Null);
    }

    #[tokio::test]
    async fn test_swap_path_if_checks_guard_atomically() {
        let store = MemoryStore::new();
        let mut doc = task("user:a");
        doc["sharedWith"] = json!([
            { "userId": "user:b", "role": "editor", "status": "pending" }
        ]);
        store.put("task:1", &doc).await.unwrap();

        let entry = DocPath::root().field("sharedWith").matching("userId", "user:b");
        let role = entry.clone().field("role");
        let status = entry.clone().field("status");

        let swapped = store
            .swap_path_if("task:1", &role, &json!("viewer"), &status, &json!("accepted"))
            .await
            .unwrap();
        assert!(swapped.is_none());
        assert_eq!(store.get("task:1").await.unwrap().unwrap(), doc);

        store.swap_path("task:1", &status, &json!("accepted")).await.unwrap();
        let swapped = store
            .swap_path_if("task:1", &role, &json!("viewer"), &status, &json!("accepted"))
            .await
            .unwrap();
        assert_eq!(swapped, Some(json!("editor")));

        let gone = DocPath::root()
            .field("sharedWith")
            .matching("userId", "user:z")
            .field("status");
        let err = store
            .swap_path_if("task:1", &role, &json!("viewer"), &gone, &json!("accepted"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PathNotFound { .. }));
    }

    #[tokio::test]
    async fn test_match_path_updates_single_subtask() {
        let store = MemoryStore::new();
        store.put("task:1", &task("user:a")).await.unwrap();
        let path = DocPath::root()
            .field("subtasks")
            .matching("id", "s2")
            .field("isComplete");

        store.swap_path("task:1", &path, &json!(true)).await.unwrap();

        let doc = store.get("task:1").await.unwrap().unwrap();
        assert_eq!(doc["subtasks"][0]["isComplete"], false);
        assert_eq!(doc["subtasks"][1]["isComplete"], true);
    }

    #[tokio::test]
    async fn test_delete_path_by_match() {
        let store = MemoryStore::new();
        let mut doc = task("user:a");
        doc["sharedWith"] = json!([{ "userId": "user:b" }, { "userId": "user:c" }]);
        store.put("task:1", &doc).await.unwrap();

        let path = DocPath::root().field("sharedWith").matching("userId", "user:b");
        assert_eq!(store.delete_path("task:1", &path).await.unwrap(), 1);
        assert_eq!(store.delete_path("task:1", &path).await.unwrap(), 0);

        assert!(store
            .query(task_index(), &owner_query("user:b"), 10)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .query(task_index(), &owner_query("user:c"), 10)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_remove_index_out_of_range() {
        let store = MemoryStore::new();
        store.put("task:1", &task("user:a")).await.unwrap();
        let path = DocPath::root().field("subtasks");

        let removed = store.remove_index("task:1", &path, 0).await.unwrap();
        assert_eq!(removed["id"], "s1");

        let err = store.remove_index("task:1", &path, 5).await.unwrap_err();
        assert!(matches!(err, StoreError::IndexOutOfRange { index: 5, .. }));
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_document_untouched() {
        let store = MemoryStore::new();
        store.put("task:1", &task("user:a")).await.unwrap();

        let err = store
            .increment_numeric("task:1", &DocPath::root().field("title"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));

        let doc = store.get("task:1").await.unwrap().unwrap();
        assert_eq!(doc, task("user:a"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_atomic() {
        let store = Arc::new(MemoryStore::new());
        store.put("user:1", &json!({ "xp": 0 })).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .increment_numeric("user:1", &DocPath::root().field("xp"), 10)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let doc = store.get("user:1").await.unwrap().unwrap();
        assert_eq!(doc["xp"], 500);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_unique_appends_admit_one() {
        let store = Arc::new(MemoryStore::new());
        store.put("task:1", &task("user:a")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append_unique(
                        "task:1",
                        &DocPath::root().field("sharedWith"),
                        &json!({ "userId": "user:b" }),
                        "userId",
                    )
                    .await
                    .unwrap()
            }));
        }

        let mut appended = 0;
        for handle in handles {
            if handle.await.unwrap() {
                appended += 1;
            }
        }
        assert_eq!(appended, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_documents_disappear() {
        let store = MemoryStore::new();
        store.put("task:1", &task("user:a")).await.unwrap();
        assert!(store.expire("task:1", Duration::from_secs(60)).await.unwrap());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(store.get("task:1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(store.get("task:1").await.unwrap().is_none());
        assert!(store
            .query(task_index(), &owner_query("user:a"), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_expiring_sets_ttl_with_the_write() {
        let store = MemoryStore::new();
        store
            .put_expiring("task:1", &task("user:a"), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.get("task:1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("task:1").await.unwrap().is_none());

        // A plain put clears any earlier expiry
        store
            .put_expiring("task:2", &task("user:a"), Duration::from_secs(1))
            .await
            .unwrap();
        store.put("task:2", &task("user:a")).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(store.get("task:2").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store.put("task:1", &task("user:a")).await.unwrap();
        store.put("task:2", &task("user:a")).await.unwrap();
        store.expire("task:1", Duration::from_secs(1)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_sweeper_purges_until_cancelled() {
        let store = Arc::new(MemoryStore::new());
        store.put("task:1", &task("user:a")).await.unwrap();
        store.expire("task:1", Duration::from_secs(5)).await.unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            store
                .clone()
                .run_expiry_sweeper(Duration::from_secs(10), shutdown.clone()),
        );

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(store.docs.len(), 0);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_query_respects_limit() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.put(&format!("task:{}", i), &task("user:a")).await.unwrap();
        }

        let hits = store
            .query(task_index(), &owner_query("user:a"), 3)
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].key, "task:0");
    }
}
