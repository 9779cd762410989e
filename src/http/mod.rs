//! HTTP interface
//!
//! | Route              | Purpose                                   |
//! |--------------------|-------------------------------------------|
//! | POST /setup_state  | install provider + credential             |
//! | POST /reset        | discard session, restart environment      |
//! | POST /chat         | append a user turn, schedule the loop     |
//! | GET  /state        | session snapshot                          |
//! | GET  /api_responses| audit ledger                              |
//! | GET  /health       | liveness + busy flag                      |
//! | GET  /metrics      | Prometheus exposition                     |

pub mod api;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::orchestrator::Orchestrator;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/setup_state", post(api::setup_state))
        .route("/reset", post(api::reset))
        .route("/chat", post(api::chat))
        .route("/state", get(api::get_state))
        .route("/api_responses", get(api::api_responses))
        .route("/health", get(api::health))
        .route("/metrics", get(api::metrics))
        .with_state(state)
}

/// Serve until ctrl-c
pub async fn serve(addr: SocketAddr, app: Router) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
}
