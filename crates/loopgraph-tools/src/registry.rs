use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use loopgraph_core::error::{LoopgraphError, NodeError, Result};
use loopgraph_core::state::State;
use loopgraph_core::traits::{FnNode, Node};

/// Name and description of a registered node, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct NodeDefinition {
    pub name: String,
    pub description: String,
}

/// Registry of available node transformations.
///
/// Built once at startup and then shared read-only; graphs bind their nodes
/// to entries of this registry when they are created.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: HashMap<String, Arc<dyn Node>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Register a node. Fails if the name is already taken.
    pub fn register(&mut self, node: impl Node) -> Result<()> {
        let name = node.name().to_string();
        if self.nodes.contains_key(&name) {
            return Err(LoopgraphError::DuplicateNode(name));
        }
        debug!(node = %name, "Node registered");
        self.nodes.insert(name, Arc::new(node));
        Ok(())
    }

    /// Register a closure as a node.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> Result<()>
    where
        F: Fn(&State) -> std::result::Result<State, NodeError> + Send + Sync + 'static,
    {
        self.register(FnNode::new(name, f))
    }

    /// Look up a node by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Node>> {
        self.nodes
            .get(name)
            .cloned()
            .ok_or_else(|| LoopgraphError::UnknownNode(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// List all registered node names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Name and description of every registered node, sorted by name.
    pub fn definitions(&self) -> Vec<NodeDefinition> {
        let mut defs: Vec<NodeDefinition> = self
            .nodes
            .values()
            .map(|n| NodeDefinition {
                name: n.name().to_string(),
                description: n.description().to_string(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create a registry with all built-in nodes registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for node in crate::builtin::all() {
            registry.nodes.insert(node.name().to_string(), node);
        }
        registry
    }
}
