/// Document paths
///
/// A [`DocPath`] addresses a location inside a JSON document. It renders to
/// the JSONPath dialect understood by RedisJSON and is resolved natively by
/// the in-memory backend, so both backends agree on what a path selects.
///
/// ```text
/// DocPath::root()                                   => $
/// DocPath::root().field("xp")                       => $.xp
/// DocPath::root().field("subtasks").index(2)        => $.subtasks[2]
/// DocPath::root().field("sharedWith")
///     .matching("userId", "user:1").field("status") => $.sharedWith[?(@.userId=="user:1")].status
/// ```
///
/// Element-match segments select every array element whose `field` equals
/// the given string. Ids are unique within their arrays, so in practice
/// they select zero or one element.
use serde_json::{Map, Value};
use std::fmt;

/// One step of a document path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object member
    Field(String),

    /// Array position
    Index(usize),

    /// Array elements whose `field` equals `value`
    Match { field: String, value: String },
}

/// Location inside a JSON document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocPath {
    segments: Vec<Segment>,
}

impl DocPath {
    /// The document root (`$`)
    pub fn root() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.segments.push(Segment::Field(name.into()));
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.segments.push(Segment::Index(index));
        self
    }

    pub fn matching(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.segments.push(Segment::Match {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Splits off the last segment
    pub fn split_last(&self) -> Option<(&Segment, &[Segment])> {
        self.segments.split_last()
    }

    /// Renders the path as RedisJSON JSONPath
    pub fn to_json_path(&self) -> String {
        let mut out = String::from("$");
        for segment in &self.segments {
            match segment {
                Segment::Field(name) if is_identifier(name) => {
                    out.push('.');
                    out.push_str(name);
                }
                Segment::Field(name) => {
                    out.push('[');
                    out.push_str(&quote(name));
                    out.push(']');
                }
                Segment::Index(index) => {
                    out.push_str(&format!("[{}]", index));
                }
                Segment::Match { field, value } => {
                    out.push_str("[?(@.");
                    out.push_str(field);
                    out.push_str("==");
                    out.push_str(&quote(value));
                    out.push_str(")]");
                }
            }
        }
        out
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json_path())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// JSON string literal, escapes included
fn quote(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// Selects every value a segment list points at
pub(crate) fn select_mut<'a>(value: &'a mut Value, segments: &[Segment]) -> Vec<&'a mut Value> {
    let Some((first, rest)) = segments.split_first() else {
        return vec![value];
    };

    match first {
        Segment::Field(name) => match value.get_mut(name.as_str()) {
            Some(child) => select_mut(child, rest),
            None => Vec::new(),
        },
        Segment::Index(index) => match value.get_mut(*index) {
            Some(child) => select_mut(child, rest),
            None => Vec::new(),
        },
        Segment::Match { field, value: expected } => match value.as_array_mut() {
            Some(items) => items
                .iter_mut()
                .filter(|item| item.get(field.as_str()).and_then(Value::as_str) == Some(expected.as_str()))
                .flat_map(|item| select_mut(item, rest))
                .collect(),
            None => Vec::new(),
        },
    }
}

/// Applies an RFC 7396 merge patch
///
/// Objects merge member by member, `null` removes a member, and every other
/// value (scalars and arrays alike) replaces the target wholesale.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }

    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_json_path() {
        assert_eq!(DocPath::root().to_json_path(), "$");
        assert_eq!(DocPath::root().field("xp").to_json_path(), "$.xp");
        assert_eq!(
            DocPath::root().field("subtasks").index(2).to_json_path(),
            "$.subtasks[2]"
        );
        assert_eq!(
            DocPath::root()
                .field("sharedWith")
                .matching("userId", "user:1")
                .field("status")
                .to_json_path(),
            r#"$.sharedWith[?(@.userId=="user:1")].status"#
        );
        assert_eq!(DocPath::root().field("odd key").to_json_path(), r#"$["odd key"]"#);
    }

    #[test]
    fn test_match_value_is_quoted() {
        let path = DocPath::root().field("subtasks").matching("id", r#"a"b"#);
        assert_eq!(path.to_json_path(), r#"$.subtasks[?(@.id=="a\"b")]"#);
    }

    #[test]
    fn test_select_match() {
        let mut doc = json!({
            "subtasks": [
                { "id": "a", "isComplete": false },
                { "id": "b", "isComplete": false }
            ]
        });
        let path = DocPath::root()
            .field("subtasks")
            .matching("id", "b")
            .field("isComplete");

        let selected = select_mut(&mut doc, path.segments());
        assert_eq!(selected.len(), 1);
        *selected.into_iter().next().unwrap() = json!(true);

        assert_eq!(doc["subtasks"][0]["isComplete"], false);
        assert_eq!(doc["subtasks"][1]["isComplete"], true);
    }

    #[test]
    fn test_merge_patch_replaces_arrays_and_keeps_siblings() {
        let mut doc = json!({
            "title": "old",
            "description": "keep",
            "subtasks": [{ "id": "a" }, { "id": "b" }]
        });
        merge_patch(
            &mut doc,
            &json!({ "title": "new", "subtasks": [{ "id": "c" }] }),
        );

        assert_eq!(doc["title"], "new");
        assert_eq!(doc["description"], "keep");
        assert_eq!(doc["subtasks"], json!([{ "id": "c" }]));
    }

    #[test]
    fn test_merge_patch_null_removes_member() {
        let mut doc = json!({ "a": 1, "b": 2 });
        merge_patch(&mut doc, &json!({ "a": null }));
        assert_eq!(doc, json!({ "b": 2 }));
    }
}
