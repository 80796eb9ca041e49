/// Task endpoints
///
/// - `GET    /v1/tasks` - Tasks the caller owns or collaborates on
/// - `POST   /v1/tasks` - Create a task
/// - `GET    /v1/tasks/:id` - One task (owner or listed collaborator)
/// - `PUT    /v1/tasks/:id` - Partial update (owner or accepted editor)
/// - `DELETE /v1/tasks/:id` - Delete (owner only)
/// - `POST   /v1/tasks/:id/subtasks` - Append a subtask
/// - `PUT    /v1/tasks/:id/subtasks/:subtask_id` - Toggle one subtask
use crate::{
    app::AppState,
    error::{ApiError, ApiResult, ValidationErrorDetail},
    middleware::auth::AuthContext,
    routes::SuccessResponse,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use taskshare_shared::models::{NewTask, Priority, Subtask, Task, TaskPatch};
use validator::Validate;

/// Create task request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,

    #[validate(length(max = 50, message = "Category must be at most 50 characters"))]
    pub category: Option<String>,

    /// `low`, `medium`, `high` or `critical`
    pub priority: Option<String>,

    /// Titles of the initial subtasks
    #[serde(default)]
    pub subtasks: Vec<String>,
}

/// Partial update request; absent fields are left untouched
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,

    #[validate(length(min = 1, max = 50, message = "Category must be 1-50 characters"))]
    pub category: Option<String>,

    pub priority: Option<String>,

    pub is_completed: Option<bool>,

    /// Replaces the whole subtask list
    pub subtasks: Option<Vec<Subtask>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddSubtaskRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskStatusRequest {
    pub is_complete: bool,
}

fn parse_priority(raw: Option<String>) -> ApiResult<Option<Priority>> {
    raw.map(|p| p.parse::<Priority>())
        .transpose()
        .map_err(|e| ApiError::ValidationError(vec![ValidationErrorDetail::new("priority", e)]))
}

impl UpdateTaskRequest {
    fn into_patch(self) -> ApiResult<TaskPatch> {
        Ok(TaskPatch {
            title: self.title,
            description: self.description,
            category: self.category,
            priority: parse_priority(self.priority)?,
            is_completed: self.is_completed,
            subtasks: self.subtasks,
        })
    }
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<Task>>> {
    Ok(Json(state.tasks.list_visible_tasks(&auth.user_id).await?))
}

/// Create a task owned by the caller
///
/// # Endpoint
///
/// ```text
/// POST /v1/tasks
/// Content-Type: application/json
///
/// {
///   "title": "Groceries",
///   "priority": "medium",
///   "subtasks": ["Milk", "Eggs"]
/// }
/// ```
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Validation failed or unknown priority
pub async fn create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    req.validate()?;

    if req.subtasks.iter().any(|t| t.trim().is_empty()) {
        return Err(ApiError::ValidationError(vec![ValidationErrorDetail::new(
            "subtasks",
            "Subtask titles must not be empty",
        )]));
    }

    let task = state
        .tasks
        .create_task(
            &auth.user_id,
            NewTask {
                title: req.title,
                description: req.description,
                category: req.category,
                priority: parse_priority(req.priority)?,
                subtask_titles: req.subtasks,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Task>> {
    Ok(Json(state.tasks.get_task(&task_id, &auth.user_id).await?))
}

/// Apply a partial update
///
/// Setting `isCompleted` to `true` on an incomplete task awards XP to the
/// task owner. Returns the updated task.
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not the owner or an accepted editor
/// - `404 Not Found`: Task absent
pub async fn update_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    req.validate()?;
    let patch = req.into_patch()?;

    let task = state
        .tasks
        .update_task(&task_id, &auth.user_id, patch)
        .await?;
    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<SuccessResponse>> {
    state.tasks.delete_task(&task_id, &auth.user_id).await?;
    Ok(Json(SuccessResponse::ok()))
}

pub async fn add_subtask(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<String>,
    Json(req): Json<AddSubtaskRequest>,
) -> ApiResult<(StatusCode, Json<Subtask>)> {
    req.validate()?;

    let subtask = state
        .tasks
        .add_subtask(&task_id, &auth.user_id, &req.title)
        .await?;
    Ok((StatusCode::CREATED, Json(subtask)))
}

pub async fn set_subtask_complete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((task_id, subtask_id)): Path<(String, String)>,
    Json(req): Json<SubtaskStatusRequest>,
) -> ApiResult<Json<Subtask>> {
    let subtask = state
        .tasks
        .set_subtask_complete(&task_id, &auth.user_id, &subtask_id, req.is_complete)
        .await?;
    Ok(Json(subtask))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_request_rejects_membership_fields() {
        let result = serde_json::from_value::<UpdateTaskRequest>(json!({
            "title": "x",
            "sharedWith": []
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_priority_parsed_once_at_boundary() {
        let req: UpdateTaskRequest =
            serde_json::from_value(json!({ "priority": "high", "isCompleted": true })).unwrap();
        let patch = req.into_patch().unwrap();
        assert_eq!(patch.priority, Some(Priority::High));
        assert_eq!(patch.is_completed, Some(true));

        assert!(matches!(
            parse_priority(Some("urgent".to_string())),
            Err(ApiError::ValidationError(_))
        ));
    }
}
