pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod state;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{GraphDefect, LoopgraphError, NodeError, Result, StepError};
pub use event::EventBus;
pub use graph::{EdgeRule, GraphDefinition, NodeSpec, Operator, Target, END};
pub use state::State;
pub use traits::{FnNode, Node};
pub use types::*;
