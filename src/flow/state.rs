//! Run outcome types.

use crate::errors::ErrorKind;
use crate::flow::session::{Context, SessionId};
use crate::ledger::ExecutionRecord;
use crate::plan::{StepId, StepStatus};
use crate::util::duration_ms;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

/// Overall status of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Process exit code the CLI reports for this status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Succeeded => 0,
            Self::Failed => 1,
            Self::Cancelled => 130,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The step that ended a run, or a tolerated optional failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatalFailure {
    pub step_id: StepId,
    pub kind: ErrorKind,
    pub message: String,
}

impl std::fmt::Display for FatalFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "step '{}' failed with {}: {}", self.step_id, self.kind, self.message)
    }
}

/// Final status of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: StepId,
    pub status: StepStatus,
    /// Attempts dispatched; zero for steps that never ran
    pub attempts: u32,
}

/// Everything a finished run reports back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub session_id: SessionId,
    pub status: RunStatus,
    /// Output of the last succeeded leaf step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<Value>,
    pub context: Context,
    pub trace: Vec<ExecutionRecord>,
    pub steps: Vec<StepOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FatalFailure>,
    /// Optional steps that failed without ending the run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optional_failures: Vec<FatalFailure>,
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn step_status(&self, step_id: &str) -> Option<StepStatus> {
        self.steps
            .iter()
            .find(|s| s.step_id == step_id)
            .map(|s| s.status)
    }

    /// Trace records for one step, in attempt order.
    pub fn attempts_of(&self, step_id: &str) -> Vec<&ExecutionRecord> {
        self.trace.iter().filter(|r| r.step_id == step_id).collect()
    }
}

/// Tracks execution timing.
pub struct ExecutionTimer {
    start: Instant,
}

impl ExecutionTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunStatus::Succeeded.exit_code(), 0);
        assert_eq!(RunStatus::Failed.exit_code(), 1);
        assert_eq!(RunStatus::Cancelled.exit_code(), 130);
    }

    #[test]
    fn test_failure_display_names_step_and_kind() {
        let failure = FatalFailure {
            step_id: "step-2".into(),
            kind: ErrorKind::Validation,
            message: "bad input".into(),
        };
        assert_eq!(
            failure.to_string(),
            "step 'step-2' failed with ValidationError: bad input"
        );
    }

    #[test]
    fn test_run_result_serializes_duration_in_ms() {
        let result = RunResult {
            session_id: Uuid::nil(),
            status: RunStatus::Succeeded,
            answer: None,
            context: Context::new(),
            trace: Vec::new(),
            steps: vec![StepOutcome {
                step_id: "step-1".into(),
                status: StepStatus::Succeeded,
                attempts: 1,
            }],
            failure: None,
            optional_failures: Vec::new(),
            duration: Duration::from_millis(1500),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["duration_ms"], 1500);
        assert_eq!(value["status"], "succeeded");
        assert!(value.get("failure").is_none());
        assert_eq!(result.step_status("step-1"), Some(StepStatus::Succeeded));
        assert!(result.is_success());
    }

    #[test]
    fn test_execution_timer() {
        let timer = ExecutionTimer::start();
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.elapsed() >= Duration::from_millis(5));
    }
}
