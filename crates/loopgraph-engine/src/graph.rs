use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use loopgraph_core::error::{GraphDefect, LoopgraphError, Result};
use loopgraph_core::graph::{EdgeRule, GraphDefinition, END};
use loopgraph_core::traits::Node;
use loopgraph_core::types::GraphId;
use loopgraph_tools::NodeRegistry;

/// A validated graph with every node bound to its registry entry.
///
/// Immutable once built; runs share it read-only.
pub struct Graph {
    id: GraphId,
    definition: GraphDefinition,
    bound: HashMap<String, Arc<dyn Node>>,
}

impl Graph {
    /// Validate `definition` against `registry` and bind its nodes.
    ///
    /// Fails with `InvalidGraph` listing every defect found.
    pub fn build(id: GraphId, definition: GraphDefinition, registry: &NodeRegistry) -> Result<Self> {
        validate(id.as_str(), &definition, registry)?;

        let mut bound = HashMap::with_capacity(definition.nodes.len());
        for spec in &definition.nodes {
            bound.insert(spec.name.clone(), registry.resolve(spec.tool_name())?);
        }

        Ok(Self {
            id,
            definition,
            bound,
        })
    }

    pub fn id(&self) -> &GraphId {
        &self.id
    }

    pub fn start(&self) -> &str {
        &self.definition.start
    }

    /// The node bound under `name`.
    pub fn node(&self, name: &str) -> Option<&Arc<dyn Node>> {
        self.bound.get(name)
    }

    /// Outgoing rule of `name`; `None` marks an implicit terminator.
    pub fn edge(&self, name: &str) -> Option<&EdgeRule> {
        self.definition.edges.get(name)
    }

    /// Node names in declaration order.
    pub fn node_names(&self) -> Vec<&str> {
        self.definition.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    /// The definition this graph was built from, with its id filled in.
    pub fn definition(&self) -> GraphDefinition {
        GraphDefinition {
            id: Some(self.id.to_string()),
            ..self.definition.clone()
        }
    }
}

/// Check a definition for referential integrity.
pub fn validate(graph_id: &str, definition: &GraphDefinition, registry: &NodeRegistry) -> Result<()> {
    let defects = defects(definition, registry);
    if defects.is_empty() {
        Ok(())
    } else {
        Err(LoopgraphError::InvalidGraph {
            graph_id: graph_id.to_string(),
            defects,
        })
    }
}

/// Every defect in `definition`, in a stable order.
pub fn defects(definition: &GraphDefinition, registry: &NodeRegistry) -> Vec<GraphDefect> {
    let mut defects = Vec::new();

    if definition.nodes.is_empty() {
        defects.push(GraphDefect::NoNodes);
    }

    let mut names = HashSet::new();
    for spec in &definition.nodes {
        if spec.name == END {
            defects.push(GraphDefect::ReservedNodeName(spec.name.clone()));
        }
        if !names.insert(spec.name.as_str()) {
            defects.push(GraphDefect::DuplicateNodeName(spec.name.clone()));
        }
        if !registry.contains(spec.tool_name()) {
            defects.push(GraphDefect::UnregisteredTool {
                node: spec.name.clone(),
                tool: spec.tool_name().to_string(),
            });
        }
    }

    if !names.contains(definition.start.as_str()) {
        defects.push(GraphDefect::UnknownStart(definition.start.clone()));
    }

    for (from, rule) in &definition.edges {
        if !names.contains(from.as_str()) {
            defects.push(GraphDefect::UnknownEdgeSource(from.clone()));
        }
        for target in rule.targets() {
            if let Some(name) = target.node_name() {
                if !names.contains(name) {
                    defects.push(GraphDefect::DanglingTarget {
                        from: from.clone(),
                        target: name.to_string(),
                    });
                }
            }
        }
        if let EdgeRule::Conditional { threshold, .. } = rule {
            if !threshold.is_number() {
                defects.push(GraphDefect::NonNumericThreshold { from: from.clone() });
            }
        }
    }

    defects
}
