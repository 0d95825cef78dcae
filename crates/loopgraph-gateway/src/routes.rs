use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use tracing::{debug, error, info};

use loopgraph_core::graph::GraphDefinition;
use loopgraph_core::types::{GraphId, RunId};

use crate::protocol::{ApiError, CreateResponse, RunRequest, RunResponse, RunStateResponse};
use crate::state::AppState;

// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "bind": state.config.bind,
        "graphs": state.engine.graph_ids().len(),
    }))
}

// GET /api/tools
pub async fn list_tools(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "tools": state.engine.registry().definitions() }))
}

// GET /graphs
pub async fn list_graphs(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "graphs": state.engine.graph_ids() }))
}

// POST /graph/create
pub async fn create_graph(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GraphDefinition>, JsonRejection>,
) -> Result<Json<CreateResponse>, ApiError> {
    let Json(definition) = payload?;
    let graph_id = state.engine.create_graph(definition)?;
    Ok(Json(CreateResponse { graph_id }))
}

// GET /graph/{graph_id}
pub async fn get_graph(
    State(state): State<Arc<AppState>>,
    Path(graph_id): Path<String>,
) -> Result<Json<GraphDefinition>, ApiError> {
    let graph = state.engine.graph(&GraphId::from(graph_id))?;
    Ok(Json(graph.definition()))
}

// POST /graph/run
pub async fn run_graph(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<RunResponse>, ApiError> {
    let Json(req) = payload?;
    let graph_id = GraphId::from(req.graph_id);
    debug!(graph_id = %graph_id, "Run requested");

    // Runs are synchronous and may be long; keep them off the async workers.
    let engine = state.engine.clone();
    let record = tokio::task::spawn_blocking(move || {
        engine.run_graph(&graph_id, req.initial_state, req.max_steps)
    })
    .await
    .map_err(|e| {
        error!(error = %e, "Run task failed");
        ApiError::internal(e.to_string())
    })??;

    info!(run_id = %record.run_id, reason = %record.reason(), "Run served");
    Ok(Json(RunResponse::from(record.as_ref())))
}

// GET /graph/state/{run_id}
pub async fn run_state(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Result<Json<RunStateResponse>, ApiError> {
    let record = state.engine.get_run(&RunId::from(run_id))?;
    Ok(Json(RunStateResponse::from(record.as_ref())))
}
