use std::sync::Arc;

use loopgraph_core::config::GatewayConfig;
use loopgraph_engine::GraphEngine;

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: GatewayConfig,
    pub engine: Arc<GraphEngine>,
}
