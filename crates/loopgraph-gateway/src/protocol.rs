use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use loopgraph_core::error::{GraphDefect, LoopgraphError};
use loopgraph_core::state::State;
use loopgraph_core::types::{GraphId, RunId};
use loopgraph_engine::{RunRecord, RunStatus, TraceEntry};

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub graph_id: String,
    #[serde(default)]
    pub initial_state: Option<State>,
    #[serde(default)]
    pub max_steps: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub graph_id: GraphId,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run_id: RunId,
    pub status: RunStatus,
    pub reason: String,
    pub final_state: State,
    pub log: Vec<TraceEntry>,
}

impl From<&RunRecord> for RunResponse {
    fn from(record: &RunRecord) -> Self {
        Self {
            run_id: record.run_id.clone(),
            status: record.status(),
            reason: record.reason(),
            final_state: record.final_state.clone(),
            log: record.trace.clone(),
        }
    }
}

/// Snapshot of a stored run.
#[derive(Debug, Serialize)]
pub struct RunStateResponse {
    pub run_id: RunId,
    pub graph_id: GraphId,
    pub status: RunStatus,
    pub reason: String,
    pub state: State,
    pub current_node: Option<String>,
    pub steps: usize,
    pub max_steps: usize,
}

impl From<&RunRecord> for RunStateResponse {
    fn from(record: &RunRecord) -> Self {
        Self {
            run_id: record.run_id.clone(),
            graph_id: record.graph_id.clone(),
            status: record.status(),
            reason: record.reason(),
            state: record.final_state.clone(),
            current_node: record.last_node.clone(),
            steps: record.steps(),
            max_steps: record.max_steps,
        }
    }
}

/// Error body: `{error, kind}` plus the defect list for invalid graphs.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defects: Option<Vec<GraphDefect>>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &str, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.into(),
                kind: kind.to_string(),
                defects: None,
            },
        }
    }

    pub fn internal(error: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", error)
    }
}

impl From<LoopgraphError> for ApiError {
    fn from(err: LoopgraphError) -> Self {
        let status = match &err {
            LoopgraphError::UnknownGraph(_) | LoopgraphError::UnknownRun(_) => StatusCode::NOT_FOUND,
            LoopgraphError::DuplicateGraph(_) => StatusCode::CONFLICT,
            LoopgraphError::InvalidGraph { .. }
            | LoopgraphError::InvalidMaxSteps { .. }
            | LoopgraphError::UnknownNode(_)
            | LoopgraphError::DuplicateNode(_)
            | LoopgraphError::Json(_)
            | LoopgraphError::Config(_) => StatusCode::BAD_REQUEST,
            LoopgraphError::ConfigNotFound(_) | LoopgraphError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let mut api = Self::new(status, err.kind(), err.to_string());
        if let LoopgraphError::InvalidGraph { defects, .. } = err {
            api.body.defects = Some(defects);
        }
        api
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
