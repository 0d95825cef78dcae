use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use loopgraph_core::config::{AppConfig, EngineConfig};
use loopgraph_core::error::{LoopgraphError, Result};
use loopgraph_core::event::EventBus;
use loopgraph_core::graph::GraphDefinition;
use loopgraph_core::state::State;
use loopgraph_core::types::{GraphId, RunId};
use loopgraph_tools::NodeRegistry;

use crate::executor::{Executor, RunRecord};
use crate::graph::Graph;
use crate::store::{RunStore, RunSummary};

/// Entry point for callers: registers graphs, runs them, and keeps results.
///
/// Graphs and the registry are read-only once registered, so any number of
/// runs may execute concurrently on different threads. Each run owns its own
/// state and trace; only the graph table and run store take locks.
pub struct GraphEngine {
    registry: Arc<NodeRegistry>,
    config: EngineConfig,
    graphs: RwLock<HashMap<GraphId, Arc<Graph>>>,
    runs: RunStore,
    events: Option<Arc<EventBus>>,
}

impl GraphEngine {
    pub fn new(registry: NodeRegistry, config: EngineConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config,
            graphs: RwLock::new(HashMap::new()),
            runs: RunStore::new(),
            events: None,
        }
    }

    /// Build an engine from app config: built-in graphs (when enabled) plus
    /// every graph file listed under `graphs`.
    pub fn from_config(registry: NodeRegistry, config: &AppConfig) -> Result<Self> {
        let engine = Self::new(registry, config.engine.clone());
        if config.engine.register_builtin_graphs {
            for definition in loopgraph_tools::graphs::all() {
                engine.create_graph(definition)?;
            }
        }
        for path in &config.graphs {
            engine.create_graph(GraphDefinition::load(Path::new(path))?)?;
        }
        Ok(engine)
    }

    /// Publish run events on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate and register a graph. Nothing is registered on failure.
    pub fn create_graph(&self, definition: GraphDefinition) -> Result<GraphId> {
        let id = definition
            .id
            .clone()
            .map(GraphId::from)
            .unwrap_or_else(GraphId::new);

        let graph = Graph::build(id.clone(), definition, &self.registry)?;

        let mut graphs = self.graphs.write().unwrap_or_else(PoisonError::into_inner);
        if graphs.contains_key(&id) {
            return Err(LoopgraphError::DuplicateGraph(id.to_string()));
        }
        graphs.insert(id.clone(), Arc::new(graph));
        info!(graph_id = %id, "Graph registered");
        Ok(id)
    }

    pub fn graph(&self, graph_id: &GraphId) -> Result<Arc<Graph>> {
        self.graphs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(graph_id)
            .cloned()
            .ok_or_else(|| LoopgraphError::UnknownGraph(graph_id.to_string()))
    }

    /// Ids of every registered graph, sorted.
    pub fn graph_ids(&self) -> Vec<GraphId> {
        let mut ids: Vec<GraphId> = self
            .graphs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Run a graph to termination and store the record.
    ///
    /// Only lookup and argument errors are returned as `Err`; a run that
    /// aborts is still `Ok`, with the reason on its record.
    pub fn run_graph(
        &self,
        graph_id: &GraphId,
        initial_state: Option<State>,
        max_steps: Option<usize>,
    ) -> Result<Arc<RunRecord>> {
        let graph = self.graph(graph_id)?;
        let max_steps = self.check_max_steps(max_steps)?;

        let mut executor = Executor::new(&graph);
        if let Some(bus) = &self.events {
            executor = executor.with_events(bus);
        }
        let record = executor.run(RunId::new(), initial_state.unwrap_or_default(), max_steps);

        Ok(self.runs.put(record))
    }

    pub fn get_run(&self, run_id: &RunId) -> Result<Arc<RunRecord>> {
        self.runs.get(run_id)
    }

    pub fn runs(&self) -> Vec<RunSummary> {
        self.runs.list()
    }

    fn check_max_steps(&self, requested: Option<usize>) -> Result<usize> {
        let limit = self.config.max_steps_limit;
        let max_steps = requested.unwrap_or(self.config.default_max_steps);
        if max_steps == 0 || max_steps > limit {
            return Err(LoopgraphError::InvalidMaxSteps {
                requested: max_steps,
                limit,
            });
        }
        Ok(max_steps)
    }
}
