use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use loopgraph_core::config::GatewayConfig;
use loopgraph_engine::GraphEngine;

use crate::routes;
use crate::state::AppState;

/// HTTP gateway over a [`GraphEngine`], built on axum.
pub struct GatewayServer {
    config: GatewayConfig,
    engine: Arc<GraphEngine>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, engine: Arc<GraphEngine>) -> Self {
        Self { config, engine }
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let state = Arc::new(AppState {
            config: self.config.clone(),
            engine: self.engine.clone(),
        });
        let app = router(state);

        let listener = TcpListener::bind(&self.config.bind).await?;
        info!(bind = %self.config.bind, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/tools", get(routes::list_tools))
        .route("/graphs", get(routes::list_graphs))
        .route("/graph/create", post(routes::create_graph))
        .route("/graph/run", post(routes::run_graph))
        .route("/graph/state/{run_id}", get(routes::run_state))
        .route("/graph/{graph_id}", get(routes::get_graph))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use loopgraph_core::config::{AppConfig, EngineConfig};
    use loopgraph_tools::NodeRegistry;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let engine =
            GraphEngine::from_config(NodeRegistry::with_builtins(), &AppConfig::default()).unwrap();
        router(Arc::new(AppState {
            config: GatewayConfig::default(),
            engine: Arc::new(engine),
        }))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn loop_graph(id: &str) -> Value {
        json!({
            "id": id,
            "nodes": [
                {"name": "issues", "tool": "detect_issues"},
                {"name": "score", "tool": "evaluate_quality"}
            ],
            "edges": {
                "issues": {"type": "unconditional", "next": "score"},
                "score": {
                    "type": "conditional",
                    "condition_key": "quality_score",
                    "operator": "gte",
                    "threshold": 0.8,
                    "if_true": "end",
                    "if_false": "issues"
                }
            },
            "start": "issues"
        })
    }

    #[tokio::test]
    async fn test_health_and_listings() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["bind"], "127.0.0.1:8000");
        assert_eq!(body["graphs"], 1);

        let (_, body) = send(&app, "GET", "/graphs", None).await;
        assert_eq!(body["graphs"], json!(["code_review"]));

        let (_, body) = send(&app, "GET", "/api/tools", None).await;
        assert_eq!(body["tools"].as_array().map(Vec::len), Some(5));
    }

    #[tokio::test]
    async fn test_create_then_fetch() {
        let app = app();
        let (status, body) = send(&app, "POST", "/graph/create", Some(loop_graph("lint"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["graph_id"], "lint");

        let (status, body) = send(&app, "GET", "/graph/lint", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["start"], "issues");
        assert_eq!(body["edges"]["score"]["if_true"], "end");

        let (status, body) = send(&app, "POST", "/graph/create", Some(loop_graph("lint"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "duplicate_graph");
    }

    #[tokio::test]
    async fn test_invalid_graph_lists_defects() {
        let app = app();
        let mut graph = loop_graph("broken");
        graph["edges"]["issues"]["next"] = json!("ghost");
        let (status, body) = send(&app, "POST", "/graph/create", Some(graph)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_graph");
        assert_eq!(body["defects"][0]["defect"], "dangling_target");
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let app = app();
        let (status, body) =
            send(&app, "POST", "/graph/run", Some(json!({"initial_state": {}}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "bad_request");
    }

    #[tokio::test]
    async fn test_run_and_fetch_state() {
        let app = app();
        let request = json!({
            "graph_id": "code_review",
            "initial_state": {"code": "def add(a, b):\n    return a + b\n"}
        });
        let (status, body) = send(&app, "POST", "/graph/run", Some(request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["reason"], "completed");
        assert_eq!(body["log"].as_array().map(Vec::len), Some(5));
        assert_eq!(body["final_state"]["functions"], json!(["add"]));

        let run_id = body["run_id"].as_str().unwrap().to_string();
        let (status, body) = send(&app, "GET", &format!("/graph/state/{run_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["graph_id"], "code_review");
        assert_eq!(body["current_node"], "score");
        assert_eq!(body["steps"], 5);
    }

    #[tokio::test]
    async fn test_stuck_run_reports_max_steps() {
        let app = app();
        let request = json!({
            "graph_id": "code_review",
            "initial_state": {"code": "def a():\n    # TODO\n    print(1)\n\ndef b():\n    pass\n"},
            "max_steps": 8
        });
        let (status, body) = send(&app, "POST", "/graph/run", Some(request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "aborted");
        assert_eq!(body["reason"], "max_steps_exceeded");
        assert_eq!(body["log"].as_array().map(Vec::len), Some(8));
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/graph/run",
            Some(json!({"graph_id": "missing"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "unknown_graph");

        let (status, body) = send(
            &app,
            "POST",
            "/graph/run",
            Some(json!({"graph_id": "code_review", "max_steps": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_max_steps");

        let (status, body) = send(&app, "GET", "/graph/state/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "unknown_run");

        let (status, _) = send(&app, "GET", "/graph/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_custom_step_limit() {
        let config = EngineConfig {
            max_steps_limit: 5,
            ..EngineConfig::default()
        };
        let engine = GraphEngine::new(NodeRegistry::with_builtins(), config);
        let app = router(Arc::new(AppState {
            config: GatewayConfig::default(),
            engine: Arc::new(engine),
        }));
        let (status, _) = send(&app, "POST", "/graph/create", Some(loop_graph("lint"))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            "POST",
            "/graph/run",
            Some(json!({"graph_id": "lint", "max_steps": 6})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains('5'));
    }
}
