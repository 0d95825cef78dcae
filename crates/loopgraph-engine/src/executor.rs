use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use loopgraph_core::error::StepError;
use loopgraph_core::event::EventBus;
use loopgraph_core::graph::Target;
use loopgraph_core::state::State;
use loopgraph_core::types::{GraphId, RunEvent, RunId};

use crate::edge::next_node;
use crate::graph::Graph;

/// One executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: usize,
    pub node: String,
    /// Keys the node emitted.
    pub delta: State,
    /// Full state after merging `delta`.
    pub state: State,
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Termination {
    /// Reached the terminator.
    Completed,
    /// Step budget used up before reaching the terminator.
    MaxStepsExceeded,
    /// A node or the edge resolver failed.
    Error { error: StepError },
}

impl Termination {
    /// Machine-readable reason: `completed`, `max_steps_exceeded` or `error:<message>`.
    pub fn reason(&self) -> String {
        match self {
            Self::Completed => "completed".to_string(),
            Self::MaxStepsExceeded => "max_steps_exceeded".to_string(),
            Self::Error { error } => format!("error:{}", error),
        }
    }

    pub fn status(&self) -> RunStatus {
        match self {
            Self::Completed => RunStatus::Completed,
            Self::MaxStepsExceeded | Self::Error { .. } => RunStatus::Aborted,
        }
    }

    pub fn error(&self) -> Option<&StepError> {
        match self {
            Self::Error { error } => Some(error),
            _ => None,
        }
    }
}

/// Terminal status of a stored run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Aborted,
}

/// Everything kept about a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub graph_id: GraphId,
    pub termination: Termination,
    pub final_state: State,
    pub trace: Vec<TraceEntry>,
    pub max_steps: usize,
    /// Last node executed (or attempted, when it failed).
    pub last_node: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn reason(&self) -> String {
        self.termination.reason()
    }

    pub fn status(&self) -> RunStatus {
        self.termination.status()
    }

    pub fn steps(&self) -> usize {
        self.trace.len()
    }
}

/// Outcome of a single transition.
enum Step {
    /// Keep running at the given node.
    Advance(String),
    /// Leave the running state.
    Stop(Termination),
}

/// Drives one run of a graph, step by step, on the calling thread.
///
/// The machine starts `Running` at the graph's start node with step 0 and
/// leaves it for `Completed` (terminator reached) or an aborted termination
/// (step budget, node failure, resolver failure). Partial traces are kept in
/// every case.
pub struct Executor<'a> {
    graph: &'a Graph,
    events: Option<&'a EventBus>,
}

impl<'a> Executor<'a> {
    pub fn new(graph: &'a Graph) -> Self {
        Self {
            graph,
            events: None,
        }
    }

    /// Publish run events on `bus` while executing.
    pub fn with_events(mut self, bus: &'a EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Execute the graph from its start node.
    ///
    /// `max_steps` is the number of node executions allowed. A budget of 0
    /// runs nothing and ends as `MaxStepsExceeded` with an empty trace.
    pub fn run(&self, run_id: RunId, initial: State, max_steps: usize) -> RunRecord {
        let started_at = Utc::now();
        let graph_id = self.graph.id().clone();
        let mut state = initial;
        let mut trace = Vec::new();
        let mut current = self.graph.start().to_string();
        let mut step = 0;

        info!(run_id = %run_id, graph_id = %graph_id, start = %current, max_steps, "Run started");
        self.publish(RunEvent::RunStarted {
            run_id: run_id.clone(),
            graph_id: graph_id.clone(),
            start_node: current.clone(),
            max_steps,
            at: started_at,
        });

        let termination = if max_steps == 0 {
            Termination::MaxStepsExceeded
        } else {
            loop {
                match self.step(&run_id, &current, step, max_steps, &mut state, &mut trace) {
                    Step::Advance(next) => {
                        current = next;
                        step += 1;
                    }
                    Step::Stop(termination) => break termination,
                }
            }
        };

        let finished_at = Utc::now();
        let reason = termination.reason();
        match termination.status() {
            RunStatus::Completed => {
                info!(run_id = %run_id, steps = trace.len(), "Run completed");
            }
            RunStatus::Aborted => {
                warn!(run_id = %run_id, steps = trace.len(), reason = %reason, "Run aborted");
            }
        }
        self.publish(RunEvent::RunFinished {
            run_id: run_id.clone(),
            graph_id: graph_id.clone(),
            reason,
            steps: trace.len(),
            at: finished_at,
        });

        RunRecord {
            run_id,
            graph_id,
            termination,
            final_state: state,
            trace,
            max_steps,
            last_node: (max_steps > 0).then_some(current),
            started_at,
            finished_at,
        }
    }

    /// Run `current`, merge its delta, record the step, and pick what's next.
    fn step(
        &self,
        run_id: &RunId,
        current: &str,
        step: usize,
        max_steps: usize,
        state: &mut State,
        trace: &mut Vec<TraceEntry>,
    ) -> Step {
        let node = match self.graph.node(current) {
            Some(n) => n,
            None => return Step::Stop(fail(StepError::UnknownNode(current.to_string()))),
        };

        let delta = match node.run(state) {
            Ok(delta) => delta,
            Err(e) => {
                return Step::Stop(fail(StepError::NodeFailed {
                    node: current.to_string(),
                    step,
                    message: e.to_string(),
                }));
            }
        };

        state.merge(&delta);
        trace.push(TraceEntry {
            step,
            node: current.to_string(),
            delta,
            state: state.clone(),
        });

        let next = match next_node(current, self.graph.edge(current), state) {
            Ok(next) => next,
            Err(e) => return Step::Stop(fail(e)),
        };

        debug!(run_id = %run_id, step, node = %current, next = %next, "Step complete");
        self.publish(RunEvent::StepCompleted {
            run_id: run_id.clone(),
            step,
            node: current.to_string(),
            next: next.node_name().map(str::to_string),
        });

        match next {
            Target::End => Step::Stop(Termination::Completed),
            Target::Node(_) if step + 1 >= max_steps => Step::Stop(Termination::MaxStepsExceeded),
            Target::Node(name) => Step::Advance(name),
        }
    }

    fn publish(&self, event: RunEvent) {
        if let Some(bus) = self.events {
            bus.publish(event);
        }
    }
}

fn fail(error: StepError) -> Termination {
    Termination::Error { error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopgraph_core::error::NodeError;
    use loopgraph_core::graph::{EdgeRule, GraphDefinition, Operator};
    use loopgraph_tools::NodeRegistry;
    use serde_json::json;

    /// extract -> check, check loops back to itself while score < 80.
    fn scoring_graph(increment: i64) -> Graph {
        let mut registry = NodeRegistry::new();
        registry
            .register_fn("extract", |_: &State| Ok(State::new().with("extracted", true)))
            .unwrap();
        registry
            .register_fn("check", move |s: &State| {
                let score = s.get("score").and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(State::new().with("score", score + increment))
            })
            .unwrap();

        let def = GraphDefinition::new("extract")
            .node("extract")
            .node("check")
            .edge("extract", EdgeRule::to("check"))
            .edge(
                "check",
                EdgeRule::when("score", Operator::Lt, 80, "check", Target::End),
            );
        Graph::build(GraphId::from("scoring"), def, &registry).unwrap()
    }

    #[test]
    fn test_loop_completes_when_condition_flips() {
        let graph = scoring_graph(30);
        let record = Executor::new(&graph).run(RunId::new(), State::new().with("score", 0), 10);

        assert_eq!(record.termination, Termination::Completed);
        assert_eq!(record.reason(), "completed");
        assert_eq!(record.status(), RunStatus::Completed);
        assert_eq!(record.steps(), 4);
        assert_eq!(record.final_state.get("score"), Some(&json!(90)));

        let nodes: Vec<&str> = record.trace.iter().map(|t| t.node.as_str()).collect();
        assert_eq!(nodes, vec!["extract", "check", "check", "check"]);
        let scores: Vec<i64> = record.trace[1..]
            .iter()
            .map(|t| t.state.get("score").and_then(|v| v.as_i64()).unwrap())
            .collect();
        assert_eq!(scores, vec![30, 60, 90]);
        let steps: Vec<usize> = record.trace.iter().map(|t| t.step).collect();
        assert_eq!(steps, vec![0, 1, 2, 3]);
        assert_eq!(record.last_node.as_deref(), Some("check"));
    }

    #[test]
    fn test_stuck_loop_aborts_at_exactly_max_steps() {
        let graph = scoring_graph(0);
        for max_steps in [1, 2, 3, 7] {
            let record =
                Executor::new(&graph).run(RunId::new(), State::new().with("score", 0), max_steps);
            assert_eq!(record.termination, Termination::MaxStepsExceeded);
            assert_eq!(record.reason(), "max_steps_exceeded");
            assert_eq!(record.status(), RunStatus::Aborted);
            assert_eq!(record.steps(), max_steps);
        }
    }

    #[test]
    fn test_zero_budget_runs_nothing() {
        let graph = scoring_graph(30);
        let initial = State::new().with("score", 0);
        let record = Executor::new(&graph).run(RunId::new(), initial.clone(), 0);

        assert_eq!(record.termination, Termination::MaxStepsExceeded);
        assert!(record.trace.is_empty());
        assert_eq!(record.final_state, initial);
        assert_eq!(record.last_node, None);
    }

    #[test]
    fn test_completion_on_last_budgeted_step_wins() {
        // extract, check(30), check(60), check(90) -> end: exactly 4 steps.
        let graph = scoring_graph(30);
        let record = Executor::new(&graph).run(RunId::new(), State::new().with("score", 0), 4);
        assert_eq!(record.termination, Termination::Completed);
        assert_eq!(record.steps(), 4);
    }

    #[test]
    fn test_missing_condition_key_aborts_with_trace() {
        let graph = scoring_graph(30);
        let mut registry = NodeRegistry::new();
        registry
            .register_fn("extract", |_: &State| Ok(State::new()))
            .unwrap();
        registry
            .register_fn("check", |_: &State| Ok(State::new().with("checked", true)))
            .unwrap();
        let def = graph.definition();
        let graph = Graph::build(GraphId::from("silent"), def, &registry).unwrap();

        let record = Executor::new(&graph).run(RunId::new(), State::new(), 10);

        assert_eq!(
            record.termination.error(),
            Some(&StepError::MissingKey {
                node: "check".into(),
                key: "score".into()
            })
        );
        assert!(record.reason().starts_with("error:"));
        assert_eq!(record.steps(), 2);
        assert_eq!(record.final_state.get("checked"), Some(&json!(true)));
    }

    #[test]
    fn test_node_failure_keeps_prior_trace() {
        let mut registry = NodeRegistry::new();
        registry
            .register_fn("ok", |_: &State| Ok(State::new().with("a", 1)))
            .unwrap();
        registry
            .register_fn("boom", |_: &State| Err(NodeError::new("exploded")))
            .unwrap();
        let def = GraphDefinition::new("ok")
            .node("ok")
            .node("boom")
            .edge("ok", EdgeRule::to("boom"));
        let graph = Graph::build(GraphId::new(), def, &registry).unwrap();

        let record = Executor::new(&graph).run(RunId::new(), State::new(), 10);

        assert_eq!(
            record.termination.error(),
            Some(&StepError::NodeFailed {
                node: "boom".into(),
                step: 1,
                message: "exploded".into()
            })
        );
        assert_eq!(record.reason(), "error:node 'boom' failed at step 1: exploded");
        assert_eq!(record.steps(), 1);
        assert_eq!(record.final_state.get("a"), Some(&json!(1)));
        assert_eq!(record.last_node.as_deref(), Some("boom"));
    }

    #[test]
    fn test_node_without_rule_terminates() {
        let mut registry = NodeRegistry::new();
        registry
            .register_fn("only", |_: &State| Ok(State::new().with("done", true)))
            .unwrap();
        let def = GraphDefinition::new("only").node("only");
        let graph = Graph::build(GraphId::new(), def, &registry).unwrap();

        let record = Executor::new(&graph).run(RunId::new(), State::new(), 1);
        assert_eq!(record.termination, Termination::Completed);
        assert_eq!(record.steps(), 1);
    }

    #[test]
    fn test_trace_records_delta_and_snapshot() {
        let graph = scoring_graph(30);
        let record = Executor::new(&graph).run(RunId::new(), State::new().with("score", 0), 10);

        let first = &record.trace[0];
        assert_eq!(first.delta, State::new().with("extracted", true));
        assert_eq!(
            first.state,
            State::new().with("score", 0).with("extracted", true)
        );
    }

    #[test]
    fn test_runs_are_deterministic() {
        let graph = scoring_graph(30);
        let a = Executor::new(&graph).run(RunId::new(), State::new().with("score", 0), 10);
        let b = Executor::new(&graph).run(RunId::new(), State::new().with("score", 0), 10);
        assert_eq!(a.final_state, b.final_state);
        assert_eq!(a.trace, b.trace);
        assert_eq!(a.termination, b.termination);
    }

    #[test]
    fn test_events_published() {
        let graph = scoring_graph(30);
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();

        let record = Executor::new(&graph)
            .with_events(&bus)
            .run(RunId::from("r1"), State::new().with("score", 0), 10);

        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            assert_eq!(ev.run_id(), &record.run_id);
            kinds.push(match ev {
                RunEvent::RunStarted { .. } => "started",
                RunEvent::StepCompleted { .. } => "step",
                RunEvent::RunFinished { .. } => "finished",
            });
        }
        assert_eq!(
            kinds,
            vec!["started", "step", "step", "step", "step", "finished"]
        );
    }
}
