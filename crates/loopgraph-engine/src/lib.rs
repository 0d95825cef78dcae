pub mod edge;
pub mod engine;
pub mod executor;
pub mod graph;
pub mod run_log;
pub mod store;

pub use edge::next_node;
pub use engine::GraphEngine;
pub use executor::{Executor, RunRecord, RunStatus, Termination, TraceEntry};
pub use graph::{defects, validate, Graph};
pub use run_log::RunLogger;
pub use store::{RunStore, RunSummary};
