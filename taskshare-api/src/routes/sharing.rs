/// Sharing endpoints
///
/// - `POST   /v1/tasks/:id/share` - Invite a user by email (owner only)
/// - `POST   /v1/tasks/:id/invite` - Accept or decline a pending invite
/// - `PUT    /v1/tasks/:id/share/:user_id` - Change a collaborator's role
/// - `DELETE /v1/tasks/:id/share/:user_id` - Revoke access
///
/// Roles are `editor` or `viewer`, parsed here into the closed enum.
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
use taskshare_shared::models::{Role, SharedUser};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ShareRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct InviteResponseRequest {
    pub accept: bool,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

fn parse_role(raw: &str) -> ApiResult<Role> {
    raw.parse::<Role>()
        .map_err(|e| ApiError::ValidationError(vec![ValidationErrorDetail::new("role", e)]))
}

/// Invite a user to a task
///
/// # Endpoint
///
/// ```text
/// POST /v1/tasks/:id/share
/// Content-Type: application/json
///
/// { "email": "friend@example.com", "role": "editor" }
/// ```
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not the owner
/// - `404 Not Found`: Task or user absent
/// - `409 Conflict`: User is the owner or already listed
pub async fn share_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<String>,
    Json(req): Json<ShareRequest>,
) -> ApiResult<(StatusCode, Json<SharedUser>)> {
    req.validate()?;
    let role = parse_role(&req.role)?;

    let entry = state
        .tasks
        .share_task(&task_id, &auth.user_id, &req.email, role)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn respond_to_invite(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<String>,
    Json(req): Json<InviteResponseRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    state
        .tasks
        .respond_to_invite(&task_id, &auth.user_id, req.accept)
        .await?;
    Ok(Json(SuccessResponse::ok()))
}

pub async fn update_share_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((task_id, user_id)): Path<(String, String)>,
    Json(req): Json<RoleRequest>,
) -> ApiResult<Json<SharedUser>> {
    let role = parse_role(&req.role)?;

    let entry = state
        .tasks
        .update_share_role(&task_id, &auth.user_id, &user_id, role)
        .await?;
    Ok(Json(entry))
}

pub async fn revoke_access(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((task_id, user_id)): Path<(String, String)>,
) -> ApiResult<Json<SuccessResponse>> {
    state
        .tasks
        .revoke_access(&task_id, &auth.user_id, &user_id)
        .await?;
    Ok(Json(SuccessResponse::ok()))
}
