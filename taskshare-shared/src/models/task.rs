/// Task document model
///
/// A task is a single JSON document stored under its own id (`task:<uuid>`).
/// Collaborators and subtasks are embedded arrays inside the document.
///
/// # Document Layout
///
/// ```json
/// {
///   "id": "task:550e8400-e29b-41d4-a716-446655440000",
///   "ownerId": "user:6ba7b810-9dad-11d1-80b4-00c04fd430c8",
///   "title": "Groceries",
///   "description": "",
///   "category": "general",
///   "priority": "medium",
///   "isCompleted": false,
///   "createdAt": 1735992000000,
///   "sharedWith": [
///     { "userId": "user:...", "email": "v@example.com", "username": "v",
///       "role": "viewer", "status": "pending" }
///   ],
///   "subtasks": [
///     { "id": "7c9e6679-7425-40de-944b-e07fc1f90ae7", "title": "Milk", "isComplete": false }
///   ]
/// }
/// ```
///
/// # Invariants
///
/// - The owner never appears in `sharedWith`
/// - At most one `sharedWith` entry per `userId`
/// - Subtask ids are unique within the task
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Key prefix shared by every task document
pub const TASK_KEY_PREFIX: &str = "task:";

/// Category assigned when the creator does not pick one
pub const DEFAULT_CATEGORY: &str = "general";

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Converts priority to its stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// Role granted to a collaborator
///
/// The owner is not a role here: ownership is carried by `Task::owner_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May update content fields and add subtasks once accepted
    Editor,

    /// Read-only access
    Viewer,
}

impl Role {
    /// Converts role to its stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Editor => "editor",
            Role::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "editor" => Ok(Role::Editor),
            "viewer" => Ok(Role::Viewer),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Invite status of a collaborator entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareStatus {
    Pending,
    Accepted,
}

impl ShareStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareStatus::Pending => "pending",
            ShareStatus::Accepted => "accepted",
        }
    }
}

/// Collaborator entry embedded in a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedUser {
    pub user_id: String,

    /// Invitee email at invite time (display only)
    #[serde(default)]
    pub email: String,

    /// Invitee username at invite time (display only)
    #[serde(default)]
    pub username: String,

    pub role: Role,
    pub status: ShareStatus,
}

/// Checklist item embedded in a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub is_complete: bool,
}

impl Subtask {
    /// Creates an incomplete subtask with a fresh id
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            is_complete: false,
        }
    }
}

/// Task document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    /// Owning user id, immutable after creation
    pub owner_id: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_category")]
    pub category: String,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub is_completed: bool,

    /// Creation time in milliseconds since the Unix epoch
    pub created_at: i64,

    #[serde(default)]
    pub shared_with: Vec<SharedUser>,

    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl Task {
    /// Generates a fresh task id (`task:<uuid>`)
    pub fn generate_id() -> String {
        format!("{}{}", TASK_KEY_PREFIX, Uuid::new_v4())
    }

    /// Looks up the collaborator entry for a user
    pub fn collaborator(&self, user_id: &str) -> Option<&SharedUser> {
        self.shared_with.iter().find(|s| s.user_id == user_id)
    }

    /// Returns true if the user owns the task or appears in `sharedWith`
    /// (pending invitees included)
    pub fn is_visible_to(&self, user_id: &str) -> bool {
        self.owner_id == user_id || self.collaborator(user_id).is_some()
    }

    /// Every user entitled to hear about changes: the owner plus all collaborators
    pub fn recipients(&self) -> Vec<String> {
        let mut recipients = Vec::with_capacity(self.shared_with.len() + 1);
        recipients.push(self.owner_id.clone());
        for shared in &self.shared_with {
            if !recipients.contains(&shared.user_id) {
                recipients.push(shared.user_id.clone());
            }
        }
        recipients
    }
}

/// Input for creating a task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Option<Priority>,
    #[serde(default)]
    pub subtask_titles: Vec<String>,
}

/// Partial update applied to a task
///
/// Only content fields are patchable. Membership (`sharedWith`), ownership
/// and identity fields are changed through the sharing operations only, so
/// unknown fields are rejected at deserialization time.
///
/// `subtasks` replaces the whole array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtasks: Option<Vec<Subtask>>,
}

impl TaskPatch {
    /// Returns true if the patch names no field
    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    /// Checks patch-level invariants
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation: empty title or
    /// duplicate subtask ids.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err("title must not be empty".to_string());
            }
        }

        if let Some(subtasks) = &self.subtasks {
            let mut seen = HashSet::new();
            for subtask in subtasks {
                if !seen.insert(subtask.id.as_str()) {
                    return Err(format!("duplicate subtask id: {}", subtask.id));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_task() -> Task {
        Task {
            id: "task:1".to_string(),
            owner_id: "user:owner".to_string(),
            title: "Groceries".to_string(),
            description: String::new(),
            category: DEFAULT_CATEGORY.to_string(),
            priority: Priority::Medium,
            is_completed: false,
            created_at: 0,
            shared_with: vec![SharedUser {
                user_id: "user:viewer".to_string(),
                email: "v@example.com".to_string(),
                username: "v".to_string(),
                role: Role::Viewer,
                status: ShareStatus::Pending,
            }],
            subtasks: vec![],
        }
    }

    #[test]
    fn test_task_serializes_camel_case() {
        let value = serde_json::to_value(sample_task()).unwrap();
        assert_eq!(value["ownerId"], "user:owner");
        assert_eq!(value["isCompleted"], false);
        assert_eq!(value["sharedWith"][0]["userId"], "user:viewer");
        assert_eq!(value["sharedWith"][0]["status"], "pending");
        assert_eq!(value["priority"], "medium");
    }

    #[test]
    fn test_recipients_include_owner_and_collaborators() {
        let task = sample_task();
        assert_eq!(task.recipients(), vec!["user:owner", "user:viewer"]);
    }

    #[test]
    fn test_visibility_includes_pending_invitees() {
        let task = sample_task();
        assert!(task.is_visible_to("user:owner"));
        assert!(task.is_visible_to("user:viewer"));
        assert!(!task.is_visible_to("user:stranger"));
    }

    #[test]
    fn test_patch_rejects_membership_fields() {
        let result: Result<TaskPatch, _> =
            serde_json::from_value(json!({ "sharedWith": [], "title": "x" }));
        assert!(result.is_err());

        let result: Result<TaskPatch, _> = serde_json::from_value(json!({ "ownerId": "user:x" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_patch_serializes_only_named_fields() {
        let patch = TaskPatch {
            is_completed: Some(true),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({ "isCompleted": true }));
    }

    #[test]
    fn test_patch_validation() {
        let patch = TaskPatch {
            title: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(patch.validate().is_err());

        let dup = Subtask {
            id: "s1".to_string(),
            title: "a".to_string(),
            is_complete: false,
        };
        let patch = TaskPatch {
            subtasks: Some(vec![dup.clone(), dup]),
            ..Default::default()
        };
        assert!(patch.validate().unwrap_err().contains("duplicate"));
    }

    #[test]
    fn test_role_and_priority_parsing() {
        assert_eq!("editor".parse::<Role>().unwrap(), Role::Editor);
        assert!("owner".parse::<Role>().is_err());
        assert_eq!("critical".parse::<Priority>().unwrap(), Priority::Critical);
        assert!("urgent".parse::<Priority>().is_err());
    }
}
