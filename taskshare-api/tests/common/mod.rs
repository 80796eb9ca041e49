/// Common test utilities for integration tests
///
/// Builds the full router over the in-memory backend, with a local
/// distributor feeding the session registry, and offers JSON request
/// helpers on top of `tower::ServiceExt::oneshot`.
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use taskshare_api::app::{build_router, AppState};
use taskshare_api::config::Config;
use taskshare_shared::events::{run_local_distributor, LocalBus, MemoryActivityLog, SessionRegistry};
use taskshare_shared::store::MemoryStore;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Test context containing all necessary resources
pub struct TestContext {
    pub app: Router,
    pub state: AppState,
    shutdown: CancellationToken,
}

/// A signed-up user
pub struct TestUser {
    pub id: String,
    pub email: String,
    pub token: String,
}

impl TestContext {
    /// Fresh in-memory application; must be called inside a Tokio runtime
    pub fn new() -> Self {
        let config = Config::in_memory();
        let registry = Arc::new(SessionRegistry::new(config.sessions.buffer));
        let bus = LocalBus::new(256);
        let shutdown = CancellationToken::new();

        tokio::spawn(run_local_distributor(
            bus.subscribe(),
            registry.clone(),
            shutdown.clone(),
        ));

        let state = AppState::new(
            Arc::new(MemoryStore::new()),
            Arc::new(bus),
            Arc::new(MemoryActivityLog::default()),
            registry,
            config,
        );
        let app = build_router(state.clone());

        Self {
            app,
            state,
            shutdown,
        }
    }

    /// Sends a request and returns the raw response
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Sends a request and decodes the JSON body (`Null` when empty)
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.send(method, uri, token, body).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Signs up `<name>@example.com` with a fixed password
    pub async fn signup(&self, name: &str) -> TestUser {
        let email = format!("{}@example.com", name);
        let (status, body) = self
            .request(
                "POST",
                "/v1/auth/signup",
                None,
                Some(json!({
                    "email": email,
                    "username": name,
                    "password": "correct horse"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "signup failed: {}", body);

        TestUser {
            id: body["user"]["id"].as_str().unwrap().to_string(),
            email,
            token: body["token"].as_str().unwrap().to_string(),
        }
    }

    /// Creates a task and returns its id
    pub async fn create_task(&self, owner: &TestUser, title: &str) -> String {
        let (status, body) = self
            .request(
                "POST",
                "/v1/tasks",
                Some(&owner.token),
                Some(json!({ "title": title, "priority": "medium" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
        body["id"].as_str().unwrap().to_string()
    }

    /// Owner invites `invitee` with `role`; invitee accepts when `accept`
    pub async fn share(&self, task_id: &str, owner: &TestUser, invitee: &TestUser, role: &str, accept: bool) {
        let (status, body) = self
            .request(
                "POST",
                &format!("/v1/tasks/{}/share", task_id),
                Some(&owner.token),
                Some(json!({ "email": invitee.email, "role": role })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "share failed: {}", body);

        if accept {
            let (status, _) = self
                .request(
                    "POST",
                    &format!("/v1/tasks/{}/invite", task_id),
                    Some(&invitee.token),
                    Some(json!({ "accept": true })),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
        }
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
