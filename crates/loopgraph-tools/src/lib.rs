pub mod builtin;
pub mod graphs;
pub mod registry;

pub use registry::{NodeDefinition, NodeRegistry};
