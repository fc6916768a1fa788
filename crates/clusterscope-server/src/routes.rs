use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use std::collections::HashMap;

use clusterscope_types::{NodeSummary, PodSummary};

use crate::error::ApiError;
use crate::live::stream_logs;
use crate::state::AppState;

/// Build the HTTP router
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/nodes", get(list_nodes))
        .route("/pods", get(list_pods))
        .route("/pods/logs", get(pod_logs))
        .route("/pods/logs/stream", get(stream_logs));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest("/api/v1", api)
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz() -> &'static str {
    "ready"
}

/// GET /api/v1/nodes
async fn list_nodes(State(state): State<AppState>) -> Json<Vec<NodeSummary>> {
    Json(state.nodes.list())
}

/// GET /api/v1/pods
async fn list_pods(State(state): State<AppState>) -> Json<Vec<PodSummary>> {
    Json(state.pods.list())
}

/// GET /api/v1/pods/logs?namespace=&name=
async fn pod_logs(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<String, ApiError> {
    let param = |name: &str| params.get(name).map(String::as_str).filter(|v| !v.is_empty());
    let (Some(namespace), Some(name)) = (param("namespace"), param("name")) else {
        return Err(ApiError::bad_request("namespace and name required"));
    };

    let logs = state.log_tail.tail(namespace, name, state.tail_lines).await?;
    Ok(logs)
}
