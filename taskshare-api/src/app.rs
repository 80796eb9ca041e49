/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use taskshare_api::{app::{build_router, AppState}, config::Config};
/// use taskshare_shared::events::{LocalBus, MemoryActivityLog, SessionRegistry};
/// use taskshare_shared::store::MemoryStore;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::new(
///     Arc::new(MemoryStore::new()),
///     Arc::new(LocalBus::default()),
///     Arc::new(MemoryActivityLog::default()),
///     Arc::new(SessionRegistry::new(config.sessions.buffer)),
///     config,
/// );
/// let app = build_router(state);
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:4000").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
use crate::{config::Config, middleware::auth::require_session};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use taskshare_shared::{
    auth::SessionStore,
    events::{ActivityLog, EventPublisher, SessionRegistry},
    services::{AccountService, TaskService},
    store::DocumentStore,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Every field is an `Arc` or wraps `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub tasks: TaskService,
    pub accounts: AccountService,

    /// Live SSE sessions grouped by user id
    pub registry: Arc<SessionRegistry>,

    /// Backing store, for health checks
    pub store: Arc<dyn DocumentStore>,

    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the services over one store, publisher and activity log
    pub fn new(
        store: Arc<dyn DocumentStore>,
        publisher: Arc<dyn EventPublisher>,
        activity: Arc<dyn ActivityLog>,
        registry: Arc<SessionRegistry>,
        config: Config,
    ) -> Self {
        let tasks = TaskService::new(
            store.clone(),
            publisher,
            activity,
            config.task_service_config(),
        );
        let sessions = SessionStore::new(store.clone(), config.session_ttl());
        let accounts = AccountService::new(store.clone(), sessions);

        Self {
            tasks,
            accounts,
            registry,
            store,
            config: Arc::new(config),
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                          # Health check (public)
/// └── /v1/
///     ├── /auth/
///     │   ├── POST /signup             # public
///     │   ├── POST /login              # public
///     │   ├── POST /logout
///     │   └── GET  /me
///     ├── /tasks/
///     │   ├── GET    /                 # Tasks visible to the caller
///     │   ├── POST   /
///     │   ├── GET    /:id
///     │   ├── PUT    /:id              # Partial update
///     │   ├── DELETE /:id              # Owner only
///     │   ├── POST   /:id/subtasks
///     │   ├── PUT    /:id/subtasks/:subtask_id
///     │   ├── POST   /:id/share        # Invite by email (owner only)
///     │   ├── POST   /:id/invite       # Accept or decline
///     │   ├── PUT    /:id/share/:user_id
///     │   └── DELETE /:id/share/:user_id
///     └── GET /events                  # SSE stream of the caller's updates
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Logging (tower-http TraceLayer)
/// 2. CORS (tower-http CorsLayer)
/// 3. Session authentication (everything under `/v1` except signup and login)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let session_layer = axum::middleware::from_fn_with_state(state.clone(), require_session);

    // route_layer only guards the routes added before it
    let auth_routes = Router::new()
        .route("/logout", post(routes::auth::logout))
        .route("/me", get(routes::auth::me))
        .route_layer(session_layer.clone())
        .route("/signup", post(routes::auth::signup))
        .route("/login", post(routes::auth::login));

    let task_routes = Router::new()
        .route(
            "/",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route(
            "/:id",
            get(routes::tasks::get_task)
                .put(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        .route("/:id/subtasks", post(routes::tasks::add_subtask))
        .route(
            "/:id/subtasks/:subtask_id",
            put(routes::tasks::set_subtask_complete),
        )
        .route("/:id/share", post(routes::sharing::share_task))
        .route("/:id/invite", post(routes::sharing::respond_to_invite))
        .route(
            "/:id/share/:user_id",
            put(routes::sharing::update_share_role).delete(routes::sharing::revoke_access),
        )
        .route_layer(session_layer.clone());

    let event_routes = Router::new()
        .route("/events", get(routes::events::stream_updates))
        .route_layer(session_layer);

    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/tasks", task_routes)
        .merge(event_routes);

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}
