//! Single-writer ledger with snapshot reads.

use crate::errors::LedgerError;
use crate::flow::SessionId;
use crate::ledger::sink::{LedgerSink, read_session_file};
use crate::ledger::{ExecutionRecord, LedgerSummary};
use crate::plan::StepStatus;
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

/// Pending appends the writer task buffers before `append` callers wait.
const WRITE_QUEUE_CAPACITY: usize = 1024;

type Snapshots = DashMap<SessionId, Arc<Vec<ExecutionRecord>>>;

struct AppendRequest {
    record: ExecutionRecord,
    ack: oneshot::Sender<Result<(), LedgerError>>,
}

/// Shared handle to the execution ledger.
///
/// Cloning is cheap; every clone talks to the same writer task.
#[derive(Clone)]
pub struct Ledger {
    tx: mpsc::Sender<AppendRequest>,
    snapshots: Arc<Snapshots>,
}

impl Ledger {
    /// In-memory ledger. Must be called from within a tokio runtime.
    pub fn new() -> Self {
        Self::spawn(None)
    }

    /// Ledger that persists every record to `sink` before acknowledging it.
    pub fn with_sink(sink: Arc<dyn LedgerSink>) -> Self {
        Self::spawn(Some(sink))
    }

    fn spawn(sink: Option<Arc<dyn LedgerSink>>) -> Self {
        let (tx, rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let snapshots = Arc::new(Snapshots::new());
        tokio::spawn(run_writer(rx, Arc::clone(&snapshots), sink));
        Self { tx, snapshots }
    }

    /// Append a record under `session_id` and wait until it is committed.
    pub async fn append(
        &self,
        session_id: SessionId,
        mut record: ExecutionRecord,
    ) -> Result<(), LedgerError> {
        record.session_id = session_id;
        let (ack, done) = oneshot::channel();
        self.tx
            .send(AppendRequest { record, ack })
            .await
            .map_err(|_| LedgerError::Closed)?;
        done.await.map_err(|_| LedgerError::Closed)?
    }

    /// Immutable view of a session's records at this moment.
    pub fn snapshot(&self, session_id: &SessionId) -> Arc<Vec<ExecutionRecord>> {
        self.snapshots
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
            .unwrap_or_default()
    }

    /// A session's records in append order.
    pub fn query(&self, session_id: &SessionId) -> Vec<ExecutionRecord> {
        self.snapshot(session_id).as_ref().clone()
    }

    /// Sessions with at least one record, ordered by their first record's start time.
    pub fn sessions(&self) -> Vec<SessionId> {
        let mut sessions: Vec<(SessionId, Option<chrono::DateTime<chrono::Utc>>)> = self
            .snapshots
            .iter()
            .map(|entry| (*entry.key(), entry.value().first().map(|r| r.started_at)))
            .collect();
        sessions.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        sessions.into_iter().map(|(id, _)| id).collect()
    }

    pub fn summary(&self, session_id: &SessionId) -> LedgerSummary {
        LedgerSummary::from_records(&self.snapshot(session_id))
    }

    pub fn filter_by_status(&self, session_id: &SessionId, status: StepStatus) -> Vec<ExecutionRecord> {
        self.snapshot(session_id)
            .iter()
            .filter(|r| r.status == status)
            .cloned()
            .collect()
    }

    /// Records whose step id contains `pattern`, ignoring case.
    pub fn filter_by_step(&self, session_id: &SessionId, pattern: &str) -> Vec<ExecutionRecord> {
        let pattern = pattern.to_lowercase();
        self.snapshot(session_id)
            .iter()
            .filter(|r| r.step_id.to_lowercase().contains(&pattern))
            .cloned()
            .collect()
    }

    /// The `n` most recent records, oldest first.
    pub fn recent(&self, session_id: &SessionId, n: usize) -> Vec<ExecutionRecord> {
        let records = self.snapshot(session_id);
        let skip = records.len().saturating_sub(n);
        records[skip..].to_vec()
    }

    /// Write a session's records to `path` as a pretty JSON array.
    pub fn export_json(&self, session_id: &SessionId, path: &Path) -> Result<usize, LedgerError> {
        let records = self.snapshot(session_id);
        let json = serde_json::to_string_pretty(records.as_ref())?;
        std::fs::write(path, json).map_err(|source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(records.len())
    }

    /// Append every record of an exported JSON array, each under its own session.
    pub async fn import_json(&self, path: &Path) -> Result<usize, LedgerError> {
        let content = std::fs::read_to_string(path).map_err(|source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let records: Vec<ExecutionRecord> =
            serde_json::from_str(&content).map_err(|source| LedgerError::Decode {
                path: path.to_path_buf(),
                line: source.line(),
                source,
            })?;

        self.append_all(records).await
    }

    /// Append every record of a persisted session ledger (`<id>.jsonl`).
    pub async fn import_jsonl(&self, path: &Path) -> Result<usize, LedgerError> {
        let records = read_session_file(path)?;
        self.append_all(records).await
    }

    async fn append_all(&self, records: Vec<ExecutionRecord>) -> Result<usize, LedgerError> {
        let count = records.len();
        for record in records {
            self.append(record.session_id, record).await?;
        }
        Ok(count)
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("sessions", &self.snapshots.len())
            .finish()
    }
}

/// Owns the write path: persist, publish a new snapshot, then acknowledge.
async fn run_writer(
    mut rx: mpsc::Receiver<AppendRequest>,
    snapshots: Arc<Snapshots>,
    sink: Option<Arc<dyn LedgerSink>>,
) {
    while let Some(AppendRequest { record, ack }) = rx.recv().await {
        let persisted = match &sink {
            Some(sink) => sink.persist(&record).await,
            None => Ok(()),
        };

        if let Err(ref e) = persisted {
            error!(session_id = %record.session_id, step_id = %record.step_id, "Failed to persist ledger record: {}", e);
        } else {
            debug!(
                session_id = %record.session_id,
                step_id = %record.step_id,
                attempt = record.attempt,
                status = %record.status,
                "Ledger append"
            );
            let mut entry = snapshots.entry(record.session_id).or_default();
            Arc::make_mut(entry.value_mut()).push(record);
        }

        // The caller may have given up waiting; the record stands either way.
        let _ = ack.send(persisted);
    }
    debug!("Ledger writer stopped");
}
