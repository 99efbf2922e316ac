//! Control-plane HTTP API: greeting, health and the daemon's group list.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tracing::{error, info};

use crate::daemon::DaemonApi;

/// Handler state.
#[derive(Clone)]
pub struct ApiState {
    pub daemon: Arc<dyn DaemonApi>,
}

/// Public view of one group.
#[derive(Debug, Serialize)]
pub struct GroupSummary {
    pub name: String,
    pub id: String,
    pub internal_id: String,
}

/// Build the control-plane router.
pub fn control_routes(daemon: Arc<dyn DaemonApi>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/groups", get(groups))
        .with_state(ApiState { daemon })
}

/// Bind `address` and serve the control plane until the process exits.
pub async fn serve(address: &str, daemon: Arc<dyn DaemonApi>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!(address = %address, "Control API listening");
    axum::serve(listener, control_routes(daemon)).await
}

async fn home() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], "Signal Bot\n")
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "UP"}))
}

async fn groups(State(state): State<ApiState>) -> Response {
    match state.daemon.list_groups().await {
        Ok(groups) => {
            let summaries: Vec<GroupSummary> = groups
                .into_iter()
                .map(|g| GroupSummary {
                    name: g.name,
                    id: g.id,
                    internal_id: g.internal_id,
                })
                .collect();
            Json(summaries).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to list groups");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                e.to_string(),
            )
                .into_response()
        }
    }
}
