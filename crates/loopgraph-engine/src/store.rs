use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use loopgraph_core::error::{LoopgraphError, Result};
use loopgraph_core::types::{GraphId, RunId};

use crate::executor::{RunRecord, RunStatus};

/// Short listing entry for a stored run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub graph_id: GraphId,
    pub status: RunStatus,
    pub reason: String,
    pub steps: usize,
    pub finished_at: DateTime<Utc>,
}

/// Process-wide map of finished runs. No eviction.
#[derive(Default)]
pub struct RunStore {
    runs: RwLock<HashMap<RunId, Arc<RunRecord>>>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record under its run id. A second put for the same id replaces
    /// the first.
    pub fn put(&self, record: RunRecord) -> Arc<RunRecord> {
        let record = Arc::new(record);
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.run_id.clone(), record.clone());
        record
    }

    pub fn get(&self, run_id: &RunId) -> Result<Arc<RunRecord>> {
        self.runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run_id)
            .cloned()
            .ok_or_else(|| LoopgraphError::UnknownRun(run_id.to_string()))
    }

    /// Summaries of every stored run, oldest first.
    pub fn list(&self) -> Vec<RunSummary> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<RunSummary> = runs
            .values()
            .map(|r| RunSummary {
                run_id: r.run_id.clone(),
                graph_id: r.graph_id.clone(),
                status: r.status(),
                reason: r.reason(),
                steps: r.steps(),
                finished_at: r.finished_at,
            })
            .collect();
        out.sort_by_key(|s| s.finished_at);
        out
    }

    pub fn len(&self) -> usize {
        self.runs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Termination;
    use loopgraph_core::state::State;

    fn record(id: &str) -> RunRecord {
        let now = Utc::now();
        RunRecord {
            run_id: RunId::from(id),
            graph_id: GraphId::from("g"),
            termination: Termination::Completed,
            final_state: State::new().with("k", id),
            trace: vec![],
            max_steps: 10,
            last_node: None,
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn test_put_and_get() {
        let store = RunStore::new();
        store.put(record("r1"));
        let got = store.get(&RunId::from("r1")).unwrap();
        assert_eq!(got.final_state.get_str("k"), Some("r1"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_unknown() {
        let store = RunStore::new();
        assert!(matches!(
            store.get(&RunId::from("nope")),
            Err(LoopgraphError::UnknownRun(ref id)) if id == "nope"
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_last_writer_wins() {
        let store = RunStore::new();
        store.put(record("r1"));
        let mut second = record("r1");
        second.termination = Termination::MaxStepsExceeded;
        store.put(second);
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(&RunId::from("r1")).unwrap().reason(),
            "max_steps_exceeded"
        );
    }

    #[test]
    fn test_concurrent_puts() {
        let store = RunStore::new();
        std::thread::scope(|s| {
            for t in 0..8 {
                let store = &store;
                s.spawn(move || {
                    for i in 0..25 {
                        store.put(record(&format!("t{t}-{i}")));
                    }
                });
            }
        });
        assert_eq!(store.len(), 200);
        assert_eq!(store.list().len(), 200);
    }
}
