//! Event Logger - persists events to JSONL files
//!
//! The EventLogger subscribes to the EventBus and writes every event to a
//! per-run JSONL file for history and debugging.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::bus::EventBus;
use super::types::{EventLogEntry, PipelineEvent};

const EVENTS_FILE: &str = "events.jsonl";

/// Writes events to `<runs-dir>/<run-id>/events.jsonl`
pub struct EventLogger {
    runs_dir: PathBuf,
    /// Open writers per run
    writers: HashMap<String, Box<dyn Write + Send>>,
}

impl EventLogger {
    pub fn new(runs_dir: impl AsRef<Path>) -> Self {
        let runs_dir = runs_dir.as_ref().to_path_buf();
        debug!(?runs_dir, "EventLogger::new: creating logger");
        Self {
            runs_dir,
            writers: HashMap::new(),
        }
    }

    /// Write an event to its run's log file
    pub fn write_event(&mut self, event: &PipelineEvent) -> eyre::Result<()> {
        let run_id = event.run_id();
        debug!(%run_id, event_type = event.event_type(), "EventLogger::write_event");

        let writer = match self.writers.entry(run_id.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let run_dir = self.runs_dir.join(run_id);
                fs::create_dir_all(&run_dir)?;
                let log_path = run_dir.join(EVENTS_FILE);
                debug!(?log_path, "EventLogger: creating new log file");
                let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
                entry.insert(Box::new(BufWriter::new(file)))
            }
        };

        let entry = EventLogEntry::new(event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        Ok(())
    }

    /// Close the writer for a finished run
    ///
    /// The writer is dropped even when the final flush fails.
    pub fn close_run(&mut self, run_id: &str) -> std::io::Result<()> {
        debug!(%run_id, "EventLogger::close_run");
        match self.writers.remove(run_id) {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        }
    }

    /// Consume events from the bus until it closes
    pub async fn run(mut self, event_bus: Arc<EventBus>) {
        let rx = event_bus.subscribe();
        drop(event_bus);
        self.run_with(rx).await;
    }

    async fn run_with(&mut self, mut rx: broadcast::Receiver<PipelineEvent>) {
        debug!("EventLogger::run: starting event logger");
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let run_id = event.run_id().to_string();
                    let finished = event.is_terminal_error() || event.progress().is_some_and(|p| p >= 1.0);

                    if let Err(e) = self.write_event(&event) {
                        error!(%run_id, error = %e, "EventLogger: failed to write event");
                    }
                    if finished {
                        if let Err(e) = self.close_run(&run_id) {
                            warn!(%run_id, error = %e, "EventLogger: failed to flush writer");
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "EventLogger: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventLogger: channel closed, shutting down");
                    break;
                }
            }
        }

        for (run_id, mut writer) in self.writers.drain() {
            debug!(%run_id, "EventLogger: flushing writer on shutdown");
            if let Err(e) = writer.flush() {
                warn!(%run_id, error = %e, "EventLogger: failed to flush writer");
            }
        }
    }
}

/// Read a run's events back from disk
pub fn read_run_events(runs_dir: impl AsRef<Path>, run_id: &str) -> eyre::Result<Vec<EventLogEntry>> {
    let log_path = runs_dir.as_ref().join(run_id).join(EVENTS_FILE);
    debug!(?log_path, "read_run_events: reading log file");

    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&log_path)?;
    let mut entries = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(line, error = %e, "read_run_events: failed to parse line"),
        }
    }

    debug!(count = entries.len(), "read_run_events: loaded entries");
    Ok(entries)
}

/// Spawn the event logger as a background task
pub fn spawn_event_logger(event_bus: Arc<EventBus>, runs_dir: impl AsRef<Path>) -> eyre::Result<tokio::task::JoinHandle<()>> {
    fs::create_dir_all(runs_dir.as_ref())?;
    let logger = EventLogger::new(runs_dir);
    // Subscribe before returning so no early event is missed
    let rx = event_bus.subscribe();
    Ok(tokio::spawn(async move {
        let mut logger = logger;
        logger.run_with(rx).await;
    }))
}
