//! Graph definition types: node bindings, edge rules, and routing targets.
//!
//! These are the serializable shapes a caller hands to the engine. Checking
//! them against a node registry happens in the engine crate.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{LoopgraphError, Result};

/// Reserved target name meaning "stop the run".
pub const END: &str = "end";

/// Where an edge leads: another node or the terminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Target {
    Node(String),
    End,
}

impl Target {
    pub fn node(name: impl Into<String>) -> Self {
        Self::Node(name.into())
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    /// Node name, or `None` for the terminator.
    pub fn node_name(&self) -> Option<&str> {
        match self {
            Self::Node(name) => Some(name),
            Self::End => None,
        }
    }
}

impl From<String> for Target {
    fn from(s: String) -> Self {
        if s == END {
            Self::End
        } else {
            Self::Node(s)
        }
    }
}

impl From<&str> for Target {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<Target> for String {
    fn from(t: Target) -> Self {
        match t {
            Target::Node(name) => name,
            Target::End => END.to_string(),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node(name) => write!(f, "{}", name),
            Self::End => write!(f, "{}", END),
        }
    }
}

fn exact_int(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

/// Numeric comparison applied by a conditional edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Gte,
    Gt,
    Lt,
    Lte,
    Eq,
    Neq,
}

impl Operator {
    /// `observed <op> threshold`.
    pub fn compare(self, observed: f64, threshold: f64) -> bool {
        match self {
            Self::Gte => observed >= threshold,
            Self::Gt => observed > threshold,
            Self::Lt => observed < threshold,
            Self::Lte => observed <= threshold,
            Self::Eq => observed == threshold,
            Self::Neq => observed != threshold,
        }
    }

    /// `observed <op> threshold` over JSON numbers.
    ///
    /// Two integers compare exactly; a float on either side compares as `f64`.
    pub fn compare_numbers(self, observed: &Number, threshold: &Number) -> bool {
        match (exact_int(observed), exact_int(threshold)) {
            (Some(a), Some(b)) => self.holds(a.cmp(&b)),
            _ => match (observed.as_f64(), threshold.as_f64()) {
                (Some(a), Some(b)) => self.compare(a, b),
                _ => false,
            },
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Gte => ordering != Ordering::Less,
            Self::Gt => ordering == Ordering::Greater,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
            Self::Eq => ordering == Ordering::Equal,
            Self::Neq => ordering != Ordering::Equal,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Gte => ">=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Eq => "==",
            Self::Neq => "!=",
        }
    }
}

/// Routing rule attached to one source node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeRule {
    /// Always go to `next`.
    Unconditional { next: Target },
    /// Compare `state[condition_key]` against `threshold` and branch.
    Conditional {
        condition_key: String,
        operator: Operator,
        threshold: Value,
        if_true: Target,
        if_false: Target,
    },
}

impl EdgeRule {
    /// Create an unconditional edge.
    pub fn to(next: impl Into<Target>) -> Self {
        Self::Unconditional { next: next.into() }
    }

    /// Create a conditional edge.
    pub fn when(
        condition_key: impl Into<String>,
        operator: Operator,
        threshold: impl Into<Value>,
        if_true: impl Into<Target>,
        if_false: impl Into<Target>,
    ) -> Self {
        Self::Conditional {
            condition_key: condition_key.into(),
            operator,
            threshold: threshold.into(),
            if_true: if_true.into(),
            if_false: if_false.into(),
        }
    }

    /// Every target this rule can route to.
    pub fn targets(&self) -> Vec<&Target> {
        match self {
            Self::Unconditional { next } => vec![next],
            Self::Conditional {
                if_true, if_false, ..
            } => vec![if_true, if_false],
        }
    }
}

/// Binding of a graph node name to a registered tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    /// Registry entry to run. Defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

impl NodeSpec {
    pub fn tool_name(&self) -> &str {
        self.tool.as_deref().unwrap_or(&self.name)
    }
}

/// Caller-supplied description of a graph, prior to validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    /// Explicit id; a random one is generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub nodes: Vec<NodeSpec>,
    /// One rule per source node. Nodes without a rule terminate the run.
    #[serde(default)]
    pub edges: BTreeMap<String, EdgeRule>,
    #[serde(alias = "entrypoint")]
    pub start: String,
}

impl GraphDefinition {
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            id: None,
            nodes: vec![],
            edges: BTreeMap::new(),
            start: start.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a node backed by the registry entry of the same name.
    pub fn node(mut self, name: impl Into<String>) -> Self {
        self.nodes.push(NodeSpec {
            name: name.into(),
            tool: None,
        });
        self
    }

    /// Add a node backed by a differently-named registry entry.
    pub fn node_with_tool(mut self, name: impl Into<String>, tool: impl Into<String>) -> Self {
        self.nodes.push(NodeSpec {
            name: name.into(),
            tool: Some(tool.into()),
        });
        self
    }

    pub fn edge(mut self, from: impl Into<String>, rule: EdgeRule) -> Self {
        self.edges.insert(from.into(), rule);
        self
    }

    /// Load a definition from a `.json` or `.toml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some("toml") => {
                toml::from_str(&content).map_err(|e| LoopgraphError::Config(e.to_string()))
            }
            _ => Err(LoopgraphError::Config(format!(
                "unsupported graph file extension: {}",
                path.display()
            ))),
        }
    }
}
