/// Integration tests for the TaskShare API
///
/// These tests drive the full router over the in-memory backend:
/// - Accounts and session authentication
/// - Task lifecycle and the update protocol
/// - Sharing transitions and permission errors
/// - Real-time delivery over SSE
mod common;

use axum::http::StatusCode;
use common::TestContext;
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_health_check() {
    let ctx = TestContext::new();

    let (status, body) = ctx.request("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "connected");
}

#[tokio::test]
async fn test_signup_login_and_me() {
    let ctx = TestContext::new();
    let alice = ctx.signup("alice").await;

    let (status, body) = ctx
        .request(
            "POST",
            "/v1/auth/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, me) = ctx.request("GET", "/v1/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], json!(alice.id));
    assert_eq!(me["xp"], 0);
    assert!(me.get("passwordHash").is_none());
}

#[tokio::test]
async fn test_auth_errors() {
    let ctx = TestContext::new();
    ctx.signup("bob").await;

    let (status, body) = ctx
        .request(
            "POST",
            "/v1/auth/signup",
            None,
            Some(json!({ "email": "bob@example.com", "username": "bob2", "password": "long enough" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, _) = ctx
        .request(
            "POST",
            "/v1/auth/login",
            None,
            Some(json!({ "email": "bob@example.com", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = ctx
        .request(
            "POST",
            "/v1/auth/signup",
            None,
            Some(json!({ "email": "not-an-email", "username": "x", "password": "long enough" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"][0]["field"], "email");

    let (status, _) = ctx.request("GET", "/v1/tasks", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = ctx
        .request("GET", "/v1/tasks", Some("not-a-session"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let ctx = TestContext::new();
    let carol = ctx.signup("carol").await;

    let (status, _) = ctx
        .request("POST", "/v1/auth/logout", Some(&carol.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = ctx.request("GET", "/v1/auth/me", Some(&carol.token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_task_lifecycle() {
    let ctx = TestContext::new();
    let owner = ctx.signup("owner").await;
    let stranger = ctx.signup("stranger").await;

    let (status, task) = ctx
        .request(
            "POST",
            "/v1/tasks",
            Some(&owner.token),
            Some(json!({ "title": "Trip", "subtasks": ["Passport", "Tickets"] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["category"], "general");
    assert_eq!(task["priority"], "medium");
    let task_id = task["id"].as_str().unwrap().to_string();
    let subtask_id = task["subtasks"][1]["id"].as_str().unwrap().to_string();

    let (status, list) = ctx.request("GET", "/v1/tasks", Some(&owner.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, updated) = ctx
        .request(
            "PUT",
            &format!("/v1/tasks/{}", task_id),
            Some(&owner.token),
            Some(json!({ "priority": "high", "description": "Summer" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["priority"], "high");
    assert_eq!(updated["title"], "Trip");

    let (status, subtask) = ctx
        .request(
            "PUT",
            &format!("/v1/tasks/{}/subtasks/{}", task_id, subtask_id),
            Some(&owner.token),
            Some(json!({ "isComplete": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(subtask["isComplete"], true);

    let (status, added) = ctx
        .request(
            "POST",
            &format!("/v1/tasks/{}/subtasks", task_id),
            Some(&owner.token),
            Some(json!({ "title": "Hotel" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(added["title"], "Hotel");

    let (status, _) = ctx
        .request("GET", &format!("/v1/tasks/{}", task_id), Some(&stranger.token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx
        .request("DELETE", &format!("/v1/tasks/{}", task_id), Some(&stranger.token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx
        .request("DELETE", &format!("/v1/tasks/{}", task_id), Some(&owner.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = ctx
        .request("GET", &format!("/v1/tasks/{}", task_id), Some(&owner.token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_update_validation() {
    let ctx = TestContext::new();
    let owner = ctx.signup("owner").await;
    let task_id = ctx.create_task(&owner, "Validate").await;
    let uri = format!("/v1/tasks/{}", task_id);

    let (status, body) = ctx
        .request("PUT", &uri, Some(&owner.token), Some(json!({ "priority": "urgent" })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"][0]["field"], "priority");

    let (status, _) = ctx
        .request("PUT", &uri, Some(&owner.token), Some(json!({ "sharedWith": [] })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = ctx
        .request("PUT", &uri, Some(&owner.token), Some(json!({ "title": "" })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_editor_completion_awards_owner_xp() {
    let ctx = TestContext::new();
    let owner = ctx.signup("owner").await;
    let editor = ctx.signup("editor").await;
    let task_id = ctx.create_task(&owner, "Report").await;
    ctx.share(&task_id, &owner, &editor, "editor", true).await;

    let (status, task) = ctx
        .request(
            "PUT",
            &format!("/v1/tasks/{}", task_id),
            Some(&editor.token),
            Some(json!({ "isCompleted": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["isCompleted"], true);

    let (_, me) = ctx.request("GET", "/v1/auth/me", Some(&owner.token), None).await;
    assert_eq!(me["xp"], 10);

    // Completing again does not award twice
    ctx.request(
        "PUT",
        &format!("/v1/tasks/{}", task_id),
        Some(&editor.token),
        Some(json!({ "isCompleted": true })),
    )
    .await;
    let (_, me) = ctx.request("GET", "/v1/auth/me", Some(&owner.token), None).await;
    assert_eq!(me["xp"], 10);
}

#[tokio::test]
async fn test_viewer_decline_scenario() {
    let ctx = TestContext::new();
    let owner = ctx.signup("owner").await;
    let viewer = ctx.signup("viewer").await;
    let task_id = ctx.create_task(&owner, "Groceries").await;
    ctx.share(&task_id, &owner, &viewer, "viewer", false).await;

    let (_, list) = ctx.request("GET", "/v1/tasks", Some(&viewer.token), None).await;
    assert_eq!(list[0]["id"], json!(task_id));
    assert_eq!(list[0]["sharedWith"][0]["status"], "pending");

    let (status, _) = ctx
        .request(
            "POST",
            &format!("/v1/tasks/{}/share", task_id),
            Some(&owner.token),
            Some(json!({ "email": viewer.email, "role": "editor" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = ctx
        .request(
            "POST",
            &format!("/v1/tasks/{}/invite", task_id),
            Some(&viewer.token),
            Some(json!({ "accept": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = ctx.request("GET", "/v1/tasks", Some(&viewer.token), None).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_role_change_and_revoke() {
    let ctx = TestContext::new();
    let owner = ctx.signup("owner").await;
    let member = ctx.signup("member").await;
    let task_id = ctx.create_task(&owner, "Team").await;
    ctx.share(&task_id, &owner, &member, "viewer", true).await;
    let share_uri = format!("/v1/tasks/{}/share/{}", task_id, member.id);

    let (status, _) = ctx
        .request("PUT", &share_uri, Some(&owner.token), Some(json!({ "role": "admin" })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, entry) = ctx
        .request("PUT", &share_uri, Some(&owner.token), Some(json!({ "role": "editor" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(entry["role"], "editor");

    let (status, _) = ctx
        .request("DELETE", &share_uri, Some(&member.token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx
        .request("DELETE", &share_uri, Some(&owner.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = ctx
        .request("GET", &format!("/v1/tasks/{}", task_id), Some(&member.token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_share_unknown_email_is_not_found() {
    let ctx = TestContext::new();
    let owner = ctx.signup("owner").await;
    let task_id = ctx.create_task(&owner, "Solo").await;

    let (status, _) = ctx
        .request(
            "POST",
            &format!("/v1/tasks/{}/share", task_id),
            Some(&owner.token),
            Some(json!({ "email": "ghost@example.com", "role": "viewer" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_event_stream_requires_session() {
    let ctx = TestContext::new();

    let (status, _) = ctx.request("GET", "/v1/events", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_event_stream_delivers_updates_to_collaborators() {
    let ctx = TestContext::new();
    let owner = ctx.signup("owner").await;
    let editor = ctx.signup("editor").await;
    let task_id = ctx.create_task(&owner, "Live").await;
    ctx.share(&task_id, &owner, &editor, "editor", true).await;

    let response = ctx.send("GET", "/v1/events", Some(&editor.token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(ctx.state.registry.session_count(&editor.id), 1);
    let mut frames = response.into_body().into_data_stream();

    ctx.request(
        "PUT",
        &format!("/v1/tasks/{}", task_id),
        Some(&owner.token),
        Some(json!({ "isCompleted": true })),
    )
    .await;

    // Earlier sharing events may still be in flight; skip to the update
    let update = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(frame) = frames.next().await {
            let text = String::from_utf8(frame.unwrap().to_vec()).unwrap();
            if text.contains("\"type\":\"TASK_UPDATED\"") {
                return Some(text);
            }
        }
        None
    })
    .await
    .expect("no update within timeout")
    .expect("stream ended");

    assert!(update.starts_with("event: update"));
    assert!(update.contains(&task_id));
    assert!(update.contains(&owner.id));

    drop(frames);
    assert_eq!(ctx.state.registry.session_count(&editor.id), 0);
}
