/// Task operations
///
/// Each operation follows the same shape:
///
/// 1. Load the task (`NotFound` if absent or expired)
/// 2. Check the actor's permission against the loaded document
/// 3. Apply the change with one atomic store primitive
/// 4. Publish a recipient-scoped event and append an activity entry; neither
///    can fail the operation
///
/// # Completion reward
///
/// Setting `isCompleted` to `true` goes through `swap_path`, which returns
/// the previous value atomically. XP is awarded to the task owner only when
/// that previous value was not `true`, so concurrent completions award
/// exactly once per false→true edge. The flag is then left out of the root
/// merge of the remaining fields.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use taskshare_shared::events::{LocalBus, MemoryActivityLog};
/// use taskshare_shared::models::NewTask;
/// use taskshare_shared::services::{TaskService, TaskServiceConfig};
/// use taskshare_shared::store::MemoryStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let service = TaskService::new(
///     Arc::new(MemoryStore::new()),
///     Arc::new(LocalBus::default()),
///     Arc::new(MemoryActivityLog::default()),
///     TaskServiceConfig::default(),
/// );
///
/// let task = service
///     .create_task("user:1", NewTask { title: "Groceries".into(), ..Default::default() })
///     .await?;
/// assert_eq!(service.list_visible_tasks("user:1").await?.len(), 1);
/// # let _ = task;
/// # Ok(())
/// # }
/// ```
use super::Notifier;
use crate::error::{CoreError, CoreResult};
use crate::events::{record_activity, ActivityEntry, ActivityLog, EventPublisher, EventType};
use crate::models::{
    NewTask, Role, ShareStatus, SharedUser, Subtask, Task, TaskPatch, DEFAULT_CATEGORY,
    TASK_KEY_PREFIX,
};
use crate::queries;
use crate::sharing::{self, collaborator_path};
use crate::store::{DocPath, DocumentStore, StoreError};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Tunables of the task service
#[derive(Debug, Clone)]
pub struct TaskServiceConfig {
    /// Retention window of every task document
    pub task_ttl: Duration,

    /// XP granted to the owner per false→true completion
    pub completion_xp_reward: i64,

    /// Cap on `list_visible_tasks` results
    pub visible_task_limit: usize,
}

impl Default for TaskServiceConfig {
    fn default() -> Self {
        Self {
            task_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            completion_xp_reward: 10,
            visible_task_limit: 100,
        }
    }
}

#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn DocumentStore>,
    notifier: Notifier,
    activity: Arc<dyn ActivityLog>,
    config: TaskServiceConfig,
}

/// Maps a vanished sub-path to `NotFound(what)`
fn missing_as(what: &'static str) -> impl Fn(StoreError) -> CoreError {
    move |err| match err {
        StoreError::PathNotFound { .. } => CoreError::not_found(what),
        other => other.into(),
    }
}

fn encode<T: serde::Serialize>(value: &T) -> CoreResult<Value> {
    serde_json::to_value(value).map_err(|e| StoreError::from(e).into())
}

impl TaskService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        publisher: Arc<dyn EventPublisher>,
        activity: Arc<dyn ActivityLog>,
        config: TaskServiceConfig,
    ) -> Self {
        Self {
            store,
            notifier: Notifier::new(publisher),
            activity,
            config,
        }
    }

    pub fn config(&self) -> &TaskServiceConfig {
        &self.config
    }

    async fn load(&self, task_id: &str) -> CoreResult<Task> {
        if !task_id.starts_with(TASK_KEY_PREFIX) {
            return Err(CoreError::not_found("Task"));
        }

        let document = self
            .store
            .get(task_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Task"))?;

        serde_json::from_value(document)
            .map_err(|e| CoreError::StoreUnavailable(format!("corrupt task {}: {}", task_id, e)))
    }

    async fn log(&self, actor_id: &str, action: &str, metadata: Value) {
        record_activity(
            self.activity.as_ref(),
            ActivityEntry::now(actor_id, action, metadata),
        )
        .await;
    }

    /// Creates a task owned by `owner_id`
    ///
    /// The document expires after the configured retention window whether
    /// or not it is completed.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a blank title or blank subtask title.
    pub async fn create_task(&self, owner_id: &str, input: NewTask) -> CoreResult<Task> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(CoreError::InvalidInput("title must not be empty".to_string()));
        }
        if input.subtask_titles.iter().any(|t| t.trim().is_empty()) {
            return Err(CoreError::InvalidInput(
                "subtask titles must not be empty".to_string(),
            ));
        }

        let task = Task {
            id: Task::generate_id(),
            owner_id: owner_id.to_string(),
            title,
            description: input.description.unwrap_or_default(),
            category: input
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            priority: input.priority.unwrap_or_default(),
            is_completed: false,
            created_at: Utc::now().timestamp_millis(),
            shared_with: Vec::new(),
            subtasks: input
                .subtask_titles
                .iter()
                .map(|t| Subtask::new(t.trim()))
                .collect(),
        };

        let document = encode(&task)?;
        self.store
            .put_expiring(&task.id, &document, self.config.task_ttl)
            .await?;

        tracing::info!(task_id = %task.id, owner_id = %owner_id, "Task created");

        self.notifier
            .notify(vec![owner_id.to_string()], EventType::TaskCreated, document)
            .await;
        self.log(
            owner_id,
            "CREATE_TASK",
            json!({ "taskId": task.id, "title": task.title }),
        )
        .await;

        Ok(task)
    }

    /// Tasks the user owns or appears in `sharedWith` of, capped
    pub async fn list_visible_tasks(&self, user_id: &str) -> CoreResult<Vec<Task>> {
        queries::find_tasks_visible_to(
            self.store.as_ref(),
            user_id,
            self.config.visible_task_limit,
        )
        .await
    }

    /// One task, if the actor may read it
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `Forbidden` if the actor is neither owner nor
    /// listed collaborator.
    pub async fn get_task(&self, task_id: &str, actor_id: &str) -> CoreResult<Task> {
        let task = self.load(task_id).await?;
        sharing::require_reader(&task, actor_id)?;
        Ok(task)
    }

    /// Applies a partial update (owner or accepted editor)
    ///
    /// Top-level fields named in the patch are replaced wholesale;
    /// `subtasks` replaces the whole array. Returns the updated task.
    ///
    /// # Errors
    ///
    /// `InvalidInput`, `NotFound` or `Forbidden`; the document is unchanged
    /// in each case.
    pub async fn update_task(
        &self,
        task_id: &str,
        actor_id: &str,
        patch: TaskPatch,
    ) -> CoreResult<Task> {
        patch.validate().map_err(CoreError::InvalidInput)?;

        let task = self.load(task_id).await?;
        sharing::require_editor(&task, actor_id)?;

        if patch.is_empty() {
            return Ok(task);
        }

        let patch_document = encode(&patch)?;

        // The swap is the only write of the flag, so a concurrent
        // `isCompleted: false` cannot be overwritten by the merge below
        let mut remaining = patch;
        if remaining.is_completed == Some(true) {
            remaining.is_completed = None;
            let previous = self
                .store
                .swap_path(
                    task_id,
                    &DocPath::root().field("isCompleted"),
                    &Value::Bool(true),
                )
                .await?;

            if previous != Value::Bool(true) {
                self.award_completion(&task).await?;
            }
        }

        if !remaining.is_empty() {
            self.store
                .merge_path(task_id, &DocPath::root(), &encode(&remaining)?)
                .await?;
        }

        tracing::info!(task_id = %task_id, actor_id = %actor_id, "Task updated");

        let mut payload = patch_document;
        if let Value::Object(fields) = &mut payload {
            fields.insert("taskId".to_string(), json!(task_id));
        }
        self.notifier
            .notify(task.recipients(), EventType::TaskUpdated, payload)
            .await;
        self.log(actor_id, "UPDATE_TASK", json!({ "taskId": task_id }))
            .await;

        self.load(task_id).await
    }

    async fn award_completion(&self, task: &Task) -> CoreResult<()> {
        let reward = self.config.completion_xp_reward;
        let xp_path = DocPath::root().field("xp");

        match self
            .store
            .increment_numeric(&task.owner_id, &xp_path, reward)
            .await
        {
            Ok(xp) => {
                tracing::info!(
                    task_id = %task.id,
                    owner_id = %task.owner_id,
                    reward,
                    xp,
                    "Completion XP awarded"
                );
                Ok(())
            }
            Err(StoreError::KeyNotFound(_)) => {
                tracing::warn!(
                    task_id = %task.id,
                    owner_id = %task.owner_id,
                    "Task owner has no user document, XP not awarded"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes a task (owner only)
    pub async fn delete_task(&self, task_id: &str, actor_id: &str) -> CoreResult<()> {
        let task = self.load(task_id).await?;
        sharing::require_owner(&task, actor_id)?;

        if !self.store.delete(task_id).await? {
            return Err(CoreError::not_found("Task"));
        }

        tracing::info!(task_id = %task_id, "Task deleted");

        self.notifier
            .notify(
                task.recipients(),
                EventType::TaskDeleted,
                json!({ "taskId": task_id }),
            )
            .await;
        self.log(actor_id, "DELETE_TASK", json!({ "taskId": task_id }))
            .await;

        Ok(())
    }

    /// Appends a new subtask with a fresh id (owner or accepted editor)
    pub async fn add_subtask(
        &self,
        task_id: &str,
        actor_id: &str,
        title: &str,
    ) -> CoreResult<Subtask> {
        let title = title.trim();
        if title.is_empty() {
            return Err(CoreError::InvalidInput(
                "subtask title must not be empty".to_string(),
            ));
        }

        let task = self.load(task_id).await?;
        sharing::require_editor(&task, actor_id)?;

        let subtask = Subtask::new(title);
        self.store
            .append_path(
                task_id,
                &DocPath::root().field("subtasks"),
                &encode(&subtask)?,
            )
            .await?;

        tracing::debug!(task_id = %task_id, subtask_id = %subtask.id, "Subtask added");

        self.notifier
            .notify(
                task.recipients(),
                EventType::SubtaskAdded,
                json!({ "taskId": task_id, "subtask": subtask }),
            )
            .await;
        self.log(
            actor_id,
            "ADD_SUBTASK",
            json!({ "taskId": task_id, "subtaskId": subtask.id }),
        )
        .await;

        Ok(subtask)
    }

    /// Sets one subtask's completion flag in place
    ///
    /// Other subtasks are untouched, so concurrent toggles of different
    /// subtasks never overwrite each other.
    pub async fn set_subtask_complete(
        &self,
        task_id: &str,
        actor_id: &str,
        subtask_id: &str,
        is_complete: bool,
    ) -> CoreResult<Subtask> {
        let task = self.load(task_id).await?;
        sharing::require_editor(&task, actor_id)?;

        let mut subtask = task
            .subtasks
            .iter()
            .find(|s| s.id == subtask_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Subtask"))?;

        let path = DocPath::root()
            .field("subtasks")
            .matching("id", subtask_id)
            .field("isComplete");
        self.store
            .swap_path(task_id, &path, &Value::Bool(is_complete))
            .await
            .map_err(missing_as("Subtask"))?;
        subtask.is_complete = is_complete;

        self.notifier
            .notify(
                task.recipients(),
                EventType::SubtaskUpdated,
                json!({ "taskId": task_id, "subtaskId": subtask_id, "isComplete": is_complete }),
            )
            .await;
        self.log(
            actor_id,
            "UPDATE_SUBTASK",
            json!({ "taskId": task_id, "subtaskId": subtask_id, "isComplete": is_complete }),
        )
        .await;

        Ok(subtask)
    }

    /// Invites a user by email (owner only): absent → pending
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-owners, `NotFound` for an unknown email,
    /// `Conflict` when the invitee is the owner or already listed.
    pub async fn share_task(
        &self,
        task_id: &str,
        actor_id: &str,
        invitee_email: &str,
        role: Role,
    ) -> CoreResult<SharedUser> {
        let task = self.load(task_id).await?;
        sharing::require_owner(&task, actor_id)?;

        let invitee = queries::find_user_by_email(self.store.as_ref(), invitee_email).await?;
        sharing::check_invite(&task, actor_id, &invitee.id)?;

        let entry = SharedUser {
            user_id: invitee.id.clone(),
            email: invitee.email.clone(),
            username: invitee.username.clone(),
            role,
            status: ShareStatus::Pending,
        };

        // The loaded snapshot may be stale; uniqueness is enforced atomically
        let appended = self
            .store
            .append_unique(
                task_id,
                &DocPath::root().field("sharedWith"),
                &encode(&entry)?,
                "userId",
            )
            .await?;
        if !appended {
            return Err(CoreError::conflict("user is already a collaborator"));
        }

        tracing::info!(
            task_id = %task_id,
            invitee_id = %invitee.id,
            role = %role,
            "Task shared"
        );

        let mut recipients = task.recipients();
        recipients.push(invitee.id.clone());
        self.notifier
            .notify(
                recipients,
                EventType::TaskShared,
                json!({ "taskId": task_id, "title": task.title, "sharedUser": entry }),
            )
            .await;
        self.log(
            actor_id,
            "SHARE_TASK",
            json!({ "taskId": task_id, "userId": invitee.id, "role": role }),
        )
        .await;

        Ok(entry)
    }

    /// Invitee accepts (pending → accepted) or declines (pending → absent)
    pub async fn respond_to_invite(
        &self,
        task_id: &str,
        actor_id: &str,
        accept: bool,
    ) -> CoreResult<()> {
        let task = self.load(task_id).await?;
        sharing::check_respond(&task, actor_id)?;

        let entry_path = collaborator_path(actor_id);
        let event_type = if accept {
            let previous = self
                .store
                .swap_path(
                    task_id,
                    &entry_path.field("status"),
                    &json!(ShareStatus::Accepted.as_str()),
                )
                .await
                .map_err(missing_as("Invite"))?;
            if previous == json!(ShareStatus::Accepted.as_str()) {
                return Err(CoreError::conflict("invite already accepted"));
            }
            EventType::InviteAccepted
        } else {
            if self.store.delete_path(task_id, &entry_path).await? == 0 {
                return Err(CoreError::not_found("Invite"));
            }
            EventType::InviteDeclined
        };

        tracing::info!(task_id = %task_id, user_id = %actor_id, accept, "Invite answered");

        self.notifier
            .notify(
                task.recipients(),
                event_type,
                json!({ "taskId": task_id, "userId": actor_id }),
            )
            .await;
        self.log(
            actor_id,
            "RESPOND_INVITE",
            json!({ "taskId": task_id, "accepted": accept }),
        )
        .await;

        Ok(())
    }

    /// Changes an accepted collaborator's role (owner only)
    ///
    /// The accepted status is re-checked in the same atomic step as the
    /// write, so an entry that went back to pending is never touched.
    pub async fn update_share_role(
        &self,
        task_id: &str,
        actor_id: &str,
        target_id: &str,
        role: Role,
    ) -> CoreResult<SharedUser> {
        let task = self.load(task_id).await?;
        let mut entry = sharing::check_change_role(&task, actor_id, target_id)?.clone();

        let entry_path = collaborator_path(target_id);
        let swapped = self
            .store
            .swap_path_if(
                task_id,
                &entry_path.clone().field("role"),
                &json!(role.as_str()),
                &entry_path.field("status"),
                &json!(ShareStatus::Accepted.as_str()),
            )
            .await
            .map_err(missing_as("Collaborator"))?;
        if swapped.is_none() {
            return Err(CoreError::conflict("invite has not been accepted yet"));
        }
        entry.role = role;

        tracing::info!(task_id = %task_id, user_id = %target_id, role = %role, "Role changed");

        self.notifier
            .notify(
                task.recipients(),
                EventType::ShareRoleUpdated,
                json!({ "taskId": task_id, "userId": target_id, "role": role }),
            )
            .await;
        self.log(
            actor_id,
            "UPDATE_SHARE_ROLE",
            json!({ "taskId": task_id, "userId": target_id, "role": role }),
        )
        .await;

        Ok(entry)
    }

    /// Removes a collaborator in either state (owner only)
    ///
    /// The revoked user is among the event recipients.
    pub async fn revoke_access(
        &self,
        task_id: &str,
        actor_id: &str,
        target_id: &str,
    ) -> CoreResult<()> {
        let task = self.load(task_id).await?;
        sharing::check_revoke(&task, actor_id, target_id)?;

        if self
            .store
            .delete_path(task_id, &collaborator_path(target_id))
            .await?
            == 0
        {
            return Err(CoreError::not_found("Collaborator"));
        }

        tracing::info!(task_id = %task_id, user_id = %target_id, "Access revoked");

        self.notifier
            .notify(
                task.recipients(),
                EventType::AccessRevoked,
                json!({ "taskId": task_id, "userId": target_id }),
            )
            .await;
        self.log(
            actor_id,
            "REVOKE_ACCESS",
            json!({ "taskId": task_id, "userId": target_id }),
        )
        .await;

        Ok(())
    }
}
