/// Secondary index schemas
///
/// Two indexes project the documents into queryable fields:
///
/// | Index       | Key prefix | Field          | Source path              | Kind                 |
/// |-------------|------------|----------------|--------------------------|----------------------|
/// | `idx:tasks` | `task:`    | `ownerId`      | `$.ownerId`              | tag                  |
/// |             |            | `priority`     | `$.priority`             | tag                  |
/// |             |            | `sharedUserId` | `$.sharedWith[*].userId` | tag (one per entry)  |
/// | `idx:users` | `user:`    | `email`        | `$.email`                | tag (case-sensitive) |
/// |             |            | `username`     | `$.username`             | text                 |
///
/// Entries are derived from document contents alone, so an index can always
/// be rebuilt by re-reading the documents. The same schema drives
/// `FT.CREATE` on Redis and the in-process [`memory::MemoryIndex`].
use serde_json::Value;

pub mod memory;
pub mod query;

pub use memory::MemoryIndex;
pub use query::{escape_query_value, parse_query, tokenize, Predicate, QueryParseError};

pub const TASK_INDEX_NAME: &str = "idx:tasks";
pub const USER_INDEX_NAME: &str = "idx:users";

pub const TASK_OWNER_FIELD: &str = "ownerId";
pub const TASK_PRIORITY_FIELD: &str = "priority";
pub const TASK_COLLABORATOR_FIELD: &str = "sharedUserId";
pub const USER_EMAIL_FIELD: &str = "email";
pub const USER_USERNAME_FIELD: &str = "username";

/// How a field is indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Exact match on the whole value
    Tag { case_sensitive: bool },

    /// Tokenized, case-insensitive word match
    Text,
}

/// One indexed field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// JSONPath the values are read from (`$.a`, `$.a[*].b`)
    pub path: &'static str,

    /// Name used in queries (`@alias:...`)
    pub alias: &'static str,

    pub kind: FieldKind,
}

/// Index definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSchema {
    pub name: &'static str,

    /// Only keys starting with this prefix are indexed
    pub prefix: &'static str,

    pub fields: &'static [FieldSpec],
}

static TASK_INDEX: IndexSchema = IndexSchema {
    name: TASK_INDEX_NAME,
    prefix: crate::models::TASK_KEY_PREFIX,
    fields: &[
        FieldSpec {
            path: "$.ownerId",
            alias: TASK_OWNER_FIELD,
            kind: FieldKind::Tag {
                case_sensitive: true,
            },
        },
        FieldSpec {
            path: "$.priority",
            alias: TASK_PRIORITY_FIELD,
            kind: FieldKind::Tag {
                case_sensitive: false,
            },
        },
        FieldSpec {
            path: "$.sharedWith[*].userId",
            alias: TASK_COLLABORATOR_FIELD,
            kind: FieldKind::Tag {
                case_sensitive: true,
            },
        },
    ],
};

static USER_INDEX: IndexSchema = IndexSchema {
    name: USER_INDEX_NAME,
    prefix: crate::models::USER_KEY_PREFIX,
    fields: &[
        FieldSpec {
            path: "$.email",
            alias: USER_EMAIL_FIELD,
            kind: FieldKind::Tag {
                case_sensitive: true,
            },
        },
        FieldSpec {
            path: "$.username",
            alias: USER_USERNAME_FIELD,
            kind: FieldKind::Text,
        },
    ],
};

/// Task index: owner, priority and collaborator ids
pub fn task_index() -> &'static IndexSchema {
    &TASK_INDEX
}

/// User index: exact email and username text
pub fn user_index() -> &'static IndexSchema {
    &USER_INDEX
}

/// Every index the application needs
pub fn all_indexes() -> [&'static IndexSchema; 2] {
    [task_index(), user_index()]
}

impl IndexSchema {
    /// Returns true if documents stored under `key` belong to this index
    pub fn covers(&self, key: &str) -> bool {
        key.starts_with(self.prefix)
    }

    pub fn field(&self, alias: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.alias == alias)
    }
}

/// Reads the scalar values a schema path points at
///
/// Supports `$`, `.member` and `[*]` steps, which is all the schemas use.
/// Strings are returned as-is; numbers and booleans in their JSON form.
pub fn extract_values(document: &Value, path: &str) -> Vec<String> {
    let mut current: Vec<&Value> = vec![document];
    let body = path.strip_prefix('$').unwrap_or(path);

    for step in body.split('.').filter(|s| !s.is_empty()) {
        let (name, wildcard) = match step.strip_suffix("[*]") {
            Some(name) => (name, true),
            None => (step, false),
        };

        current = current
            .into_iter()
            .filter_map(|v| v.get(name))
            .flat_map(|v| -> Vec<&Value> {
                if wildcard {
                    v.as_array().map(|a| a.iter().collect()).unwrap_or_default()
                } else {
                    vec![v]
                }
            })
            .collect();
    }

    current
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
        .collect()
}
