use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use stepwise_core::event::EventBus;
use stepwise_core::types::WorkflowEvent;

/// JSONL trace logger.
///
/// Subscribes to the EventBus and writes one JSON object per event to
/// `{log_dir}/{run_id}.jsonl`. Lines are flushed as they are written, so a
/// crash mid-run leaves every earlier line intact.
pub struct TraceLogger {
    log_dir: PathBuf,
    level: u8,
}

/// A single log entry written to the JSONL file.
#[derive(Debug, Serialize)]
struct LogEntry {
    timestamp: String,
    run_id: String,
    event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iteration: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl TraceLogger {
    /// `level` controls verbosity: 1=run summary, 2=per-step, 3=per-step with
    /// state snapshots and custom events.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Subscribe to the bus and write entries on a background task.
    ///
    /// The task ends when `cancel` fires or every bus sender is dropped; in
    /// the latter case all events already published are written first.
    pub fn spawn(self, event_bus: &EventBus, cancel: CancellationToken) -> JoinHandle<()> {
        let rx = event_bus.subscribe();
        tokio::spawn(self.run(rx, cancel))
    }

    async fn run(self, mut rx: broadcast::Receiver<WorkflowEvent>, cancel: CancellationToken) {
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            error!(error = %e, "Failed to create log directory");
            return;
        }
        info!(dir = %self.log_dir.display(), "TraceLogger started");

        let mut writers: HashMap<String, BufWriter<File>> = HashMap::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("TraceLogger cancelled");
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if let Err(e) = self.write_event(&mut writers, &event).await {
                                error!(error = %e, "Failed to write trace entry");
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "TraceLogger lagged, skipped events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("EventBus closed, TraceLogger stopping");
                            break;
                        }
                    }
                }
            }
        }

        for (_, mut writer) in writers.drain() {
            writer.flush().await.ok();
        }
        debug!("TraceLogger finished");
    }

    async fn write_event(
        &self,
        writers: &mut HashMap<String, BufWriter<File>>,
        event: &WorkflowEvent,
    ) -> std::io::Result<()> {
        let Some(entry) = self.event_to_entry(event) else {
            return Ok(());
        };
        let run_id = entry.run_id.clone();

        if !writers.contains_key(&run_id) {
            let path = self.log_dir.join(format!("{}.jsonl", run_id));
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            debug!(path = %path.display(), "Opened trace file");
            writers.insert(run_id.clone(), BufWriter::new(file));
        }

        if let Some(writer) = writers.get_mut(&run_id) {
            let line = format!("{}\n", serde_json::to_string(&entry)?);
            writer.write_all(line.as_bytes()).await?;
            // Flush after each entry for crash resilience
            writer.flush().await?;
        }

        // Close the file once the run is over
        if event.is_run_end() {
            writers.remove(&run_id);
        }
        Ok(())
    }

    /// Convert a WorkflowEvent to a log entry (returns None if filtered by level).
    fn event_to_entry(&self, event: &WorkflowEvent) -> Option<LogEntry> {
        let mut entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id: event.run_id().to_string(),
            event_type: event.event_type().to_string(),
            step: None,
            iteration: None,
            detail: None,
        };

        match event {
            // L1: Always logged (run summary)
            WorkflowEvent::RunStarted {
                workflow,
                start_step,
                ..
            } => {
                entry.step = Some(start_step.clone());
                entry.detail = Some(serde_json::json!({ "workflow": workflow }));
            }
            WorkflowEvent::RunCompleted {
                steps_executed,
                elapsed_ms,
                ..
            } => {
                entry.detail = Some(serde_json::json!({
                    "steps_executed": steps_executed,
                    "elapsed_ms": elapsed_ms,
                }));
            }
            WorkflowEvent::RunFailed { error, .. } => {
                entry.detail = Some(serde_json::json!({ "error": error }));
            }

            // L2: Per-step events (level >= 2)
            WorkflowEvent::StepStarted {
                step,
                iteration,
                state,
                ..
            } if self.level >= 2 => {
                entry.step = Some(step.clone());
                entry.iteration = Some(*iteration);
                if self.level >= 3 {
                    entry.detail = state
                        .as_ref()
                        .map(|s| serde_json::json!({ "state": truncate_json(s, 2000) }));
                }
            }
            WorkflowEvent::StepSucceeded {
                step,
                iteration,
                signal,
                elapsed_ms,
                state,
                ..
            } if self.level >= 2 => {
                entry.step = Some(step.clone());
                entry.iteration = Some(*iteration);
                let mut detail = serde_json::json!({
                    "signal": signal.to_string(),
                    "elapsed_ms": elapsed_ms,
                });
                if let (true, Some(state)) = (self.level >= 3, state) {
                    detail["state"] = serde_json::Value::String(truncate_json(state, 2000));
                }
                entry.detail = Some(detail);
            }
            WorkflowEvent::StepFailed {
                step,
                iteration,
                error,
                ..
            } if self.level >= 2 => {
                entry.step = Some(step.clone());
                entry.iteration = Some(*iteration);
                entry.detail = Some(serde_json::json!({ "error": error }));
            }

            // L3: Handler-published events (level >= 3)
            WorkflowEvent::Custom {
                step,
                name,
                payload,
                ..
            } if self.level >= 3 => {
                entry.step = Some(step.clone());
                entry.detail = Some(serde_json::json!({
                    "name": name,
                    "payload": truncate_json(payload, 500),
                }));
            }

            _ => return None,
        }

        Some(entry)
    }
}

/// Truncate a JSON value for logging.
fn truncate_json(value: &serde_json::Value, max_len: usize) -> String {
    let s = value.to_string();
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
