//! HTTP and WebSocket surface.
//!
//! All container routes require the `x-owner-id` header injected by the
//! upstream authentication proxy.

pub mod error;
pub mod extract;
pub mod routes;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::lifecycle::ContainerService;

pub use error::ApiError;
pub use extract::{OwnerId, OWNER_HEADER};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ContainerService>,
}

impl AppState {
    pub fn new(service: Arc<ContainerService>) -> Self {
        Self { service }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/containers",
            post(routes::create_container).get(routes::list_containers),
        )
        .route("/api/containers/images", get(routes::allowed_images))
        .route("/api/containers/stats", get(routes::container_stats))
        .route(
            "/api/containers/{id}",
            get(routes::get_container).delete(routes::delete_container),
        )
        .route("/api/containers/{id}/start", post(routes::start_container))
        .route("/api/containers/{id}/stop", post(routes::stop_container))
        .route("/api/containers/{id}/logs", get(routes::container_logs))
        .route("/ws/containers/{id}/logs", get(ws::container_logs_ws))
        .route("/health", get(routes::health))
        .route("/metrics", get(routes::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the router until the process receives Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "sshbox listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
}
