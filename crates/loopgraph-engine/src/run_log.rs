use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use loopgraph_core::config::LogConfig;
use loopgraph_core::event::EventBus;
use loopgraph_core::types::RunEvent;

/// JSONL run logger.
///
/// Consumes `RunEvent`s from the event bus and appends one JSON object per
/// line to `{log_dir}/{timestamp}.jsonl`. Every line is flushed as it is
/// written, so a crash loses at most the entry in flight.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

#[derive(Debug, Serialize)]
struct LogEntry {
    timestamp: String,
    run_id: String,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    /// `level` controls verbosity: 1 = run summary, 2 = every step.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    pub fn from_config(config: &LogConfig) -> Self {
        Self::new(config.dir(), config.level)
    }

    /// Subscribe now and write in a background task.
    ///
    /// The subscription is taken before the task is spawned, so events
    /// published right after this returns are not missed.
    pub fn spawn(self, bus: &EventBus, cancel: CancellationToken) -> JoinHandle<()> {
        let rx = bus.subscribe();
        tokio::spawn(self.run(rx, cancel))
    }

    /// Write entries until cancelled or the bus closes.
    ///
    /// Events already queued are drained before cancellation is honoured.
    pub async fn run(self, mut rx: broadcast::Receiver<RunEvent>, cancel: CancellationToken) {
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            error!(error = %e, "Failed to create log directory");
            return;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S%.3f").to_string();
        let log_path = self.log_dir.join(format!("{}.jsonl", timestamp));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");
        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            tokio::select! {
                biased;
                result = rx.recv() => match result {
                    Ok(event) => {
                        let Some(entry) = self.event_to_entry(&event) else {
                            continue;
                        };
                        if let Ok(json) = serde_json::to_string(&entry) {
                            let line = format!("{}\n", json);
                            if let Err(e) = writer.write_all(line.as_bytes()).await {
                                error!(error = %e, "Failed to write log entry");
                                break;
                            }
                            if let Err(e) = writer.flush().await {
                                error!(error = %e, "Failed to flush log");
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "RunLogger lagged, skipped events");
                    }
                    Err(RecvError::Closed) => {
                        debug!("EventBus closed, RunLogger stopping");
                        break;
                    }
                },
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
    }

    /// `None` when the event is below the configured level.
    fn event_to_entry(&self, event: &RunEvent) -> Option<LogEntry> {
        let timestamp = Utc::now().to_rfc3339();
        let run_id = event.run_id().to_string();

        match event {
            RunEvent::RunStarted {
                graph_id,
                start_node,
                max_steps,
                ..
            } => Some(LogEntry {
                timestamp,
                run_id,
                event_type: "run_started",
                step: None,
                detail: Some(serde_json::json!({
                    "graph_id": graph_id,
                    "start_node": start_node,
                    "max_steps": max_steps,
                })),
            }),
            RunEvent::RunFinished {
                graph_id,
                reason,
                steps,
                ..
            } => Some(LogEntry {
                timestamp,
                run_id,
                event_type: "run_finished",
                step: None,
                detail: Some(serde_json::json!({
                    "graph_id": graph_id,
                    "reason": reason,
                    "steps": steps,
                })),
            }),
            RunEvent::StepCompleted { step, node, next, .. } if self.level >= 2 => {
                Some(LogEntry {
                    timestamp,
                    run_id,
                    event_type: "step_completed",
                    step: Some(*step),
                    detail: Some(serde_json::json!({ "node": node, "next": next })),
                })
            }
            _ => None,
        }
    }
}
