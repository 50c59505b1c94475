//! Execution ledger: the append-only, session-ordered record of every step attempt.
//!
//! ## Architecture
//!
//! - [`Ledger`] - cloneable handle; appends go through one writer task and are
//!   acknowledged once persisted, queries read immutable snapshots
//! - [`LedgerSink`] - durable persistence behind the writer ([`JsonlSink`] ships)
//!
//! Records for a session come back in exactly the order they were appended,
//! no matter how many other sessions write concurrently.

pub mod sink;
pub mod store;

use crate::errors::{ErrorKind, StepError};
use crate::flow::SessionId;
use crate::plan::{Step, StepId, StepKind, StepStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use sink::{JsonlSink, LedgerSink, SessionFile};
pub use store::Ledger;

/// What a step attempt was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInput {
    pub kind: StepKind,
    pub params: Map<String, Value>,
    /// Context entries visible to the attempt
    #[serde(default)]
    pub context_keys: Vec<StepId>,
}

impl StepInput {
    pub fn snapshot(step: &Step, context_keys: Vec<StepId>) -> Self {
        Self {
            kind: step.kind.clone(),
            params: step.params.clone(),
            context_keys,
        }
    }
}

/// Classified failure of an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&StepError> for StepFailure {
    fn from(err: &StepError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// One step attempt. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub session_id: SessionId,
    pub step_id: StepId,
    /// 1-based attempt number
    pub attempt: u32,
    pub status: StepStatus,
    pub input: StepInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepFailure>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn succeeded(
        session_id: SessionId,
        step_id: &str,
        attempt: u32,
        input: StepInput,
        output: Value,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            step_id: step_id.to_string(),
            attempt,
            status: StepStatus::Succeeded,
            input,
            output: Some(output),
            error: None,
            started_at,
            ended_at: Utc::now(),
        }
    }

    pub fn failed(
        session_id: SessionId,
        step_id: &str,
        attempt: u32,
        input: StepInput,
        error: &StepError,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            step_id: step_id.to_string(),
            attempt,
            status: StepStatus::Failed,
            input,
            output: None,
            error: Some(StepFailure::from(error)),
            started_at,
            ended_at: Utc::now(),
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

/// Counts of a session's records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Distinct step ids with at least one record
    pub steps: usize,
}

impl LedgerSummary {
    pub fn from_records(records: &[ExecutionRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            ..Default::default()
        };
        let mut seen = std::collections::HashSet::new();
        for record in records {
            match record.status {
                StepStatus::Succeeded => summary.succeeded += 1,
                StepStatus::Failed => summary.failed += 1,
                StepStatus::Skipped => summary.skipped += 1,
                StepStatus::Pending | StepStatus::Running => {}
            }
            seen.insert(record.step_id.as_str());
        }
        summary.steps = seen.len();
        summary
    }

    /// Attempts beyond the first, across all steps.
    pub fn retries(&self) -> usize {
        self.total.saturating_sub(self.steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn input() -> StepInput {
        StepInput::snapshot(
            &Step::new("s", StepKind::Tool, "t").with_param("tool", "echo"),
            vec!["step-1".into()],
        )
    }

    #[test]
    fn test_failed_record_classifies_error() {
        let err = StepError::Executor("connection reset".into());
        let record = ExecutionRecord::failed(Uuid::nil(), "step-2", 2, input(), &err, Utc::now());
        assert_eq!(record.status, StepStatus::Failed);
        let failure = record.error.unwrap();
        assert_eq!(failure.kind, ErrorKind::Executor);
        assert_eq!(failure.message, "connection reset");
        assert!(record.output.is_none());
    }

    #[test]
    fn test_record_json_shape() {
        let record =
            ExecutionRecord::succeeded(Uuid::nil(), "step-1", 1, input(), json!("ok"), Utc::now());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "succeeded");
        assert_eq!(value["input"]["kind"], "tool");
        assert_eq!(value["input"]["context_keys"][0], "step-1");
        assert!(value.get("error").is_none());

        let back: ExecutionRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_summary_counts() {
        let err = StepError::Timeout(std::time::Duration::from_millis(10));
        let records = vec![
            ExecutionRecord::succeeded(Uuid::nil(), "step-1", 1, input(), json!(1), Utc::now()),
            ExecutionRecord::failed(Uuid::nil(), "step-2", 1, input(), &err, Utc::now()),
            ExecutionRecord::failed(Uuid::nil(), "step-2", 2, input(), &err, Utc::now()),
        ];
        let summary = LedgerSummary::from_records(&records);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.steps, 2);
        assert_eq!(summary.retries(), 1);
    }
}
