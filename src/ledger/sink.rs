//! Durable persistence for ledger records.

use crate::errors::LedgerError;
use crate::flow::SessionId;
use crate::ledger::ExecutionRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Where the ledger writer persists each record before acknowledging it.
#[async_trait]
pub trait LedgerSink: Send + Sync {
    async fn persist(&self, record: &ExecutionRecord) -> Result<(), LedgerError>;
}

/// Appends one JSON line per record to `<dir>/<session-id>.jsonl`.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    dir: PathBuf,
}

impl JsonlSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn session_path(&self, session_id: &SessionId) -> PathBuf {
        session_path(&self.dir, session_id)
    }
}

pub fn session_path(dir: &Path, session_id: &SessionId) -> PathBuf {
    dir.join(format!("{}.jsonl", session_id))
}

#[async_trait]
impl LedgerSink for JsonlSink {
    async fn persist(&self, record: &ExecutionRecord) -> Result<(), LedgerError> {
        let path = self.session_path(&record.session_id);
        let io_err = |source| LedgerError::Io {
            path: path.clone(),
            source,
        };

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| LedgerError::Io {
                path: self.dir.clone(),
                source,
            })?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(io_err)?;
        file.write_all(line.as_bytes()).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        Ok(())
    }
}

/// Read every record of a persisted session, in file order.
pub fn read_session_file(path: &Path) -> Result<Vec<ExecutionRecord>, LedgerError> {
    let content = std::fs::read_to_string(path).map_err(|source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| LedgerError::Decode {
                path: path.to_path_buf(),
                line: i + 1,
                source,
            })
        })
        .collect()
}

/// A persisted session ledger on disk.
#[derive(Debug, Clone)]
pub struct SessionFile {
    pub session_id: SessionId,
    pub path: PathBuf,
    pub modified: Option<DateTime<Utc>>,
}

/// Persisted sessions in `dir`, most recently modified first.
///
/// A missing directory yields an empty list.
pub fn list_sessions(dir: &Path) -> Result<Vec<SessionFile>, LedgerError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir).map_err(|source| LedgerError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut sessions: Vec<SessionFile> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                return None;
            }
            let session_id = path.file_stem()?.to_str()?.parse().ok()?;
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from);
            Some(SessionFile {
                session_id,
                path,
                modified,
            })
        })
        .collect();

    sessions.sort_by(|a, b| b.modified.cmp(&a.modified));
    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::StepInput;
    use crate::plan::{Step, StepKind};
    use serde_json::json;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn record(session: SessionId, step: &str) -> ExecutionRecord {
        let input = StepInput::snapshot(&Step::new(step, StepKind::Llm, "x"), Vec::new());
        ExecutionRecord::succeeded(session, step, 1, input, json!(step), Utc::now())
    }

    #[tokio::test]
    async fn test_jsonl_sink_appends_lines() {
        let dir = tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().join("ledger"));
        let session = Uuid::new_v4();

        sink.persist(&record(session, "step-1")).await.unwrap();
        sink.persist(&record(session, "step-2")).await.unwrap();

        let path = sink.session_path(&session);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);

        let records = read_session_file(&path).unwrap();
        assert_eq!(records[0].step_id, "step-1");
        assert_eq!(records[1].step_id, "step-2");
    }

    #[test]
    fn test_read_session_file_reports_bad_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "\n{not json}\n").unwrap();

        match read_session_file(&path) {
            Err(LedgerError::Decode { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_sessions_ignores_other_files() {
        let dir = tempdir().unwrap();
        let sink = JsonlSink::new(dir.path());
        let session = Uuid::new_v4();
        sink.persist(&record(session, "step-1")).await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::write(dir.path().join("not-a-uuid.jsonl"), "").unwrap();

        let sessions = list_sessions(dir.path()).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, session);
    }

    #[test]
    fn test_list_sessions_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        assert!(list_sessions(&dir.path().join("nope")).unwrap().is_empty());
    }
}
