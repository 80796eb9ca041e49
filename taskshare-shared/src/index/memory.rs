/// In-process secondary index
///
/// Maintains tag and text postings for one [`IndexSchema`]. The owning
/// store calls [`MemoryIndex::index_document`] and
/// [`MemoryIndex::remove_document`] inside the same critical section as the
/// document write, so a query issued after a write always sees it.
///
/// Postings are kept in ordered sets, so query results come back in key
/// order.
use super::query::{parse_query, tokenize, Predicate};
use super::{extract_values, FieldKind, IndexSchema};
use crate::store::StoreError;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

type Postings = HashMap<String, BTreeSet<String>>;

#[derive(Debug, Default)]
struct IndexTables {
    /// field alias -> normalized value -> keys
    fields: HashMap<&'static str, Postings>,

    /// key -> (field alias, normalized value) entries, for removal
    docs: BTreeMap<String, Vec<(&'static str, String)>>,
}

/// Secondary index over documents of one key prefix
#[derive(Debug)]
pub struct MemoryIndex {
    schema: &'static IndexSchema,
    tables: RwLock<IndexTables>,
}

impl MemoryIndex {
    pub fn new(schema: &'static IndexSchema) -> Self {
        Self {
            schema,
            tables: RwLock::new(IndexTables::default()),
        }
    }

    pub fn schema(&self) -> &'static IndexSchema {
        self.schema
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.tables.read().map(|t| t.docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the index entries of `key` with those derived from `document`
    pub fn index_document(&self, key: &str, document: &Value) -> Result<(), StoreError> {
        let entries = self.entries_for(document);
        let mut tables = self.write()?;

        remove_entries(&mut tables, key);

        for (alias, value) in &entries {
            tables
                .fields
                .entry(alias)
                .or_default()
                .entry(value.clone())
                .or_default()
                .insert(key.to_string());
        }
        tables.docs.insert(key.to_string(), entries);

        Ok(())
    }

    /// Drops every index entry of `key`
    pub fn remove_document(&self, key: &str) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        remove_entries(&mut tables, key);
        Ok(())
    }

    /// Parses and evaluates a query string, returning matching keys in order
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Query` for syntax errors or unknown fields.
    pub fn search(&self, query: &str) -> Result<BTreeSet<String>, StoreError> {
        let predicate = parse_query(query).map_err(|e| StoreError::Query(e.to_string()))?;
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::Unavailable("index lock poisoned".to_string()))?;
        self.evaluate(&tables, &predicate)
    }

    fn evaluate(
        &self,
        tables: &IndexTables,
        predicate: &Predicate,
    ) -> Result<BTreeSet<String>, StoreError> {
        match predicate {
            Predicate::All => Ok(tables.docs.keys().cloned().collect()),
            Predicate::Tag { field, values } => {
                let spec = self.field_spec(field)?;
                let postings = tables.fields.get(spec.alias);
                let mut keys = BTreeSet::new();
                for value in values {
                    let normalized = normalize(spec.kind, value);
                    if let Some(found) = postings.and_then(|p| p.get(&normalized)) {
                        keys.extend(found.iter().cloned());
                    }
                }
                Ok(keys)
            }
            Predicate::Text { field, terms } => {
                let spec = self.field_spec(field)?;
                let postings = tables.fields.get(spec.alias);
                let mut result: Option<BTreeSet<String>> = None;
                for term in terms {
                    let found = postings
                        .and_then(|p| p.get(term))
                        .cloned()
                        .unwrap_or_default();
                    result = Some(match result {
                        Some(acc) => acc.intersection(&found).cloned().collect(),
                        None => found,
                    });
                }
                Ok(result.unwrap_or_default())
            }
            Predicate::And(parts) => {
                let mut result: Option<BTreeSet<String>> = None;
                for part in parts {
                    let keys = self.evaluate(tables, part)?;
                    result = Some(match result {
                        Some(acc) => acc.intersection(&keys).cloned().collect(),
                        None => keys,
                    });
                }
                Ok(result.unwrap_or_default())
            }
            Predicate::Or(parts) => {
                let mut keys = BTreeSet::new();
                for part in parts {
                    keys.extend(self.evaluate(tables, part)?);
                }
                Ok(keys)
            }
        }
    }

    fn field_spec(&self, alias: &str) -> Result<&'static super::FieldSpec, StoreError> {
        self.schema.field(alias).ok_or_else(|| {
            StoreError::Query(format!("unknown field @{} in {}", alias, self.schema.name))
        })
    }

    fn entries_for(&self, document: &Value) -> Vec<(&'static str, String)> {
        let mut entries = Vec::new();
        for spec in self.schema.fields {
            for value in extract_values(document, spec.path) {
                match spec.kind {
                    FieldKind::Tag { .. } => {
                        entries.push((spec.alias, normalize(spec.kind, &value)));
                    }
                    FieldKind::Text => {
                        for token in tokenize(&value) {
                            entries.push((spec.alias, token));
                        }
                    }
                }
            }
        }
        entries
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, IndexTables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("index lock poisoned".to_string()))
    }
}

fn normalize(kind: FieldKind, value: &str) -> String {
    match kind {
        FieldKind::Tag {
            case_sensitive: true,
        } => value.to_string(),
        _ => value.to_lowercase(),
    }
}

fn remove_entries(tables: &mut IndexTables, key: &str) {
    let Some(old) = tables.docs.remove(key) else {
        return;
    };
    for (alias, value) in old {
        if let Some(postings) = tables.fields.get_mut(alias) {
            if let Some(keys) = postings.get_mut(&value) {
                keys.remove(key);
                if keys.is_empty() {
                    postings.remove(&value);
                }
            }
        }
    }
}
