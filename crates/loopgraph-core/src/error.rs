use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoopgraphError {
    // Registry errors
    #[error("Node already registered: {0}")]
    DuplicateNode(String),

    #[error("Node not registered: {0}")]
    UnknownNode(String),

    // Graph errors
    #[error("Invalid graph {graph_id}: {}", join_defects(.defects))]
    InvalidGraph {
        graph_id: String,
        defects: Vec<GraphDefect>,
    },

    #[error("Graph already exists: {0}")]
    DuplicateGraph(String),

    #[error("Graph not found: {0}")]
    UnknownGraph(String),

    // Run errors
    #[error("Run not found: {0}")]
    UnknownRun(String),

    #[error("max_steps must be between 1 and {limit}, got {requested}")]
    InvalidMaxSteps { requested: usize, limit: usize },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LoopgraphError {
    /// Stable, machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateNode(_) => "duplicate_node",
            Self::UnknownNode(_) => "unknown_node",
            Self::InvalidGraph { .. } => "invalid_graph",
            Self::DuplicateGraph(_) => "duplicate_graph",
            Self::UnknownGraph(_) => "unknown_graph",
            Self::UnknownRun(_) => "unknown_run",
            Self::InvalidMaxSteps { .. } => "invalid_max_steps",
            Self::Config(_) => "config",
            Self::ConfigNotFound(_) => "config_not_found",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, LoopgraphError>;

/// One referential-integrity problem found while validating a graph definition.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "defect", rename_all = "snake_case")]
pub enum GraphDefect {
    #[error("graph has no nodes")]
    NoNodes,

    #[error("node '{0}' is declared more than once")]
    DuplicateNodeName(String),

    #[error("node name '{0}' is reserved for the terminator")]
    ReservedNodeName(String),

    #[error("start node '{0}' is not a node of the graph")]
    UnknownStart(String),

    #[error("node '{node}' uses unregistered tool '{tool}'")]
    UnregisteredTool { node: String, tool: String },

    #[error("edge source '{0}' is not a node of the graph")]
    UnknownEdgeSource(String),

    #[error("edge from '{from}' targets unknown node '{target}'")]
    DanglingTarget { from: String, target: String },

    #[error("edge from '{from}' has a non-numeric threshold")]
    NonNumericThreshold { from: String },
}

fn join_defects(defects: &[GraphDefect]) -> String {
    defects
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure raised inside a node body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct NodeError(pub String);

impl NodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Run-time failure that aborts a single run.
///
/// These never escape `run_graph` as `Err`; they are recorded on the run's
/// termination together with the trace gathered so far.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepError {
    #[error("condition key '{key}' missing from state after node '{node}'")]
    MissingKey { node: String, key: String },

    #[error("condition key '{key}' after node '{node}' must be numeric, found {found}")]
    TypeMismatch {
        node: String,
        key: String,
        found: String,
    },

    #[error("node '{0}' is not part of the graph")]
    UnknownNode(String),

    #[error("node '{node}' failed at step {step}: {message}")]
    NodeFailed {
        node: String,
        step: usize,
        message: String,
    },
}

impl StepError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingKey { .. } => "missing_key",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::UnknownNode(_) => "unknown_node",
            Self::NodeFailed { .. } => "node_failed",
        }
    }
}
