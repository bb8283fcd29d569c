pub mod events;
pub mod metrics;

use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

pub use events::{EventRecord, RunEvent};
pub use metrics::{Metrics, RunSummary};

/// Capacity of the in-memory mirror channel.  Slow subscribers lose old
/// records (broadcast lag), never block the writer.
const MIRROR_CAPACITY: usize = 256;

/// Append-only JSONL record of every observable step of a run.
///
/// Writes are serialized through an internal mutex around the open append
/// handle.  A failed write is retried once against a freshly opened handle;
/// a second failure is surfaced on the in-memory mirror as
/// `event_log_write_failed` and the record is dropped from disk.  Log I/O
/// never aborts the run.
pub struct EventLog {
    path: PathBuf,
    run_id: Uuid,
    file: Mutex<Option<tokio::fs::File>>,
    mirror: broadcast::Sender<EventRecord>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, run_id: Uuid) -> Self {
        let (mirror, _) = broadcast::channel(MIRROR_CAPACITY);
        Self {
            path: path.into(),
            run_id,
            file: Mutex::new(None),
            mirror,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Subscribe to the in-memory mirror of all records written by this log.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.mirror.subscribe()
    }

    /// Append one event.  Infallible from the caller's point of view.
    pub async fn emit(&self, event: RunEvent) {
        let record = EventRecord::new(self.run_id, event);
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(err) => {
                tracing::error!(error = %err, "unserializable event record");
                return;
            }
        };

        let mut guard = self.file.lock().await;
        let mut written = self.write_line(&mut guard, &line).await;
        if let Err(err) = &written {
            tracing::warn!(error = %err, "event log write failed — retrying once");
            *guard = None;
            written = self.write_line(&mut guard, &line).await;
        }

        match written {
            Ok(()) => {
                let _ = self.mirror.send(record);
            }
            Err(err) => {
                let _ = self.mirror.send(EventRecord::new(
                    self.run_id,
                    RunEvent::EventLogWriteFailed {
                        error: err.to_string(),
                    },
                ));
            }
        }
    }

    async fn write_line(
        &self,
        guard: &mut Option<tokio::fs::File>,
        line: &str,
    ) -> Result<()> {
        let file = match guard {
            Some(file) => file,
            None => {
                if let Some(parent) = self.path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .await?;
                guard.insert(file)
            }
        };
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}

/// Read all parseable records from a JSONL event log.
///
/// A torn final line (or any corrupt line) is skipped with a warning, so a
/// reader tailing the file mid-write never fails.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<EventRecord>> {
    use std::io::{BufRead, BufReader};

    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventRecord>(&line) {
            Ok(record) => records.push(record),
            Err(_) => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::warn!(
            skipped,
            path = %path.display(),
            "event log contained unparseable lines"
        );
    }

    Ok(records)
}
