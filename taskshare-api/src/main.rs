//! # TaskShare API Server
//!
//! HTTP API for collaborative tasks: accounts, task lifecycle, sharing and
//! a Server-Sent Events stream of real-time updates.
//!
//! ## Architecture
//!
//! - `STORE_BACKEND=memory`: in-process document store, broadcast bus and
//!   activity buffer; a sweeper purges expired documents
//! - `STORE_BACKEND=redis`: RedisJSON documents with RediSearch indexes,
//!   Pub/Sub fanout on `channel:updates`, activity on `stream:task_events`
//!
//! One distributor task per process moves events from the bus to the live
//! sessions of their recipients.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p taskshare-api
//! ```

use std::sync::Arc;
use std::time::Duration;
use taskshare_api::{
    app::{build_router, AppState},
    config::{Config, StoreBackend},
};
use taskshare_shared::{
    events::{
        run_local_distributor, run_redis_distributor, LocalBus, MemoryActivityLog,
        RedisPublisher, SessionRegistry, StreamActivityLog,
    },
    redis::{RedisClient, RedisConfig},
    store::{MemoryStore, RedisJsonStore},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "taskshare_api=debug,taskshare_shared=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "TaskShare API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;
    let registry = Arc::new(SessionRegistry::new(config.sessions.buffer));
    let shutdown = CancellationToken::new();
    let mut background: Vec<JoinHandle<()>> = Vec::new();

    let state = match config.store.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory store");

            let store = Arc::new(MemoryStore::new());
            let bus = LocalBus::default();

            background.push(tokio::spawn(run_local_distributor(
                bus.subscribe(),
                registry.clone(),
                shutdown.clone(),
            )));
            background.push(tokio::spawn(store.clone().run_expiry_sweeper(
                Duration::from_secs(config.store.purge_interval_secs),
                shutdown.clone(),
            )));

            AppState::new(
                store,
                Arc::new(bus),
                Arc::new(MemoryActivityLog::default()),
                registry.clone(),
                config.clone(),
            )
        }
        StoreBackend::Redis => {
            let redis_config = RedisConfig::from_env()?;
            let client = RedisClient::new(redis_config).await?;
            tracing::info!(url = %client.url(), "Connected to Redis");

            let store = RedisJsonStore::new(client.clone());
            store.ensure_indexes().await?;

            background.push(tokio::spawn(run_redis_distributor(
                client.clone(),
                registry.clone(),
                shutdown.clone(),
            )));

            AppState::new(
                Arc::new(store),
                Arc::new(RedisPublisher::new(client.clone())),
                Arc::new(StreamActivityLog::new(client)),
                registry.clone(),
                config.clone(),
            )
        }
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    tracing::info!("Server listening on http://{}", config.bind_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone(), registry))
        .await?;

    shutdown.cancel();
    for handle in background {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM, then stops background loops and closes
/// open event streams so in-flight connections can drain
async fn shutdown_signal(shutdown: CancellationToken, registry: Arc<SessionRegistry>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining...");
    shutdown.cancel();
    registry.close_all();
}
