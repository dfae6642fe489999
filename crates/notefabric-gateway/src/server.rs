//! HTTP server implementation using Axum.

use std::future::Future;
use std::sync::Arc;

use axum::{Router, routing::get};
use notefabric_core::config::GatewayConfig;
use notefabric_scheduler::FabricEngine;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FabricEngine>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(engine: Arc<FabricEngine>) -> Self {
        Self {
            engine,
            start_time: std::time::Instant::now(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/ws", get(super::ws::ws_handler))
        .route("/health", get(super::routes::health_check))
        .route("/api/v1/notes", get(super::routes::list_notes))
        .route("/api/v1/notes/{id}", get(super::routes::get_note))
        .route("/api/v1/tools", get(super::routes::list_tools))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Serve until `shutdown` resolves.
pub async fn start<F>(config: &GatewayConfig, engine: Arc<FabricEngine>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(AppState::new(engine));
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Gateway listening on http://{addr} (ws://{addr}/ws)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
