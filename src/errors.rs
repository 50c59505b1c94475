//! Typed error hierarchy for the orchestrator.
//!
//! Four top-level types cover the subsystems:
//! - `PlanningError` - decomposition and plan validation failures, raised before execution
//! - `StepError` - per-attempt failures reported by executor capabilities
//! - `LedgerError` - append and persistence failures in the execution ledger
//! - `OrchestratorError` - everything a submitted session can surface to its caller

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while turning a goal into a validated plan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanningError {
    #[error("No feasible decomposition for goal: {0}")]
    Infeasible(String),

    #[error("Plan has {steps} steps, exceeding max_steps = {max}")]
    StepBudgetExceeded { steps: usize, max: usize },

    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("Unknown dependency '{dependency}' in step '{step}': no step with that id exists")]
    UnknownDependency { step: String, dependency: String },

    #[error("Cycle detected in step dependencies. Involved steps: {0:?}")]
    Cycle(Vec<String>),

    #[error("Step '{step}' has kind '{kind}' but no executor is registered for it")]
    UnregisteredKind { step: String, kind: String },

    #[error("Step '{step}' is invalid: {message}")]
    InvalidStep { step: String, message: String },

    #[error("Failed to load plan file: {0}")]
    PlanFile(String),
}

/// Classification of a failure, as recorded in the trace and reported to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Planning,
    Validation,
    Executor,
    Timeout,
    Cancellation,
}

impl ErrorKind {
    /// Executor and timeout failures are worth another attempt; everything else is fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Executor | Self::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "PlanningError",
            Self::Validation => "ValidationError",
            Self::Executor => "ExecutorError",
            Self::Timeout => "TimeoutError",
            Self::Cancellation => "CancellationError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single step attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Executor(String),

    #[error("step exceeded its timeout of {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("session was cancelled")]
    Cancelled,
}

impl StepError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Executor(_) => ErrorKind::Executor,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancellation,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Errors from the execution ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger writer has shut down")]
    Closed,

    #[error("Failed to persist ledger file at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode ledger record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Malformed ledger entry at {path}:{line}: {source}")]
    Decode {
        path: std::path::PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors a submitted session can surface to its caller.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Planning failed: {0}")]
    Planning(#[from] PlanningError),

    #[error("Ledger failure: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Session task terminated abnormally: {0}")]
    Join(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_error_classification() {
        assert_eq!(StepError::Validation("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(StepError::Executor("x".into()).kind(), ErrorKind::Executor);
        assert_eq!(
            StepError::Timeout(Duration::from_millis(5)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(StepError::Cancelled.kind(), ErrorKind::Cancellation);
    }

    #[test]
    fn only_executor_and_timeout_are_retryable() {
        assert!(StepError::Executor("boom".into()).is_retryable());
        assert!(StepError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!StepError::Validation("bad".into()).is_retryable());
        assert!(!StepError::Cancelled.is_retryable());
        assert!(!ErrorKind::Planning.is_retryable());
    }

    #[test]
    fn timeout_message_carries_duration() {
        let err = StepError::Timeout(Duration::from_millis(1500));
        assert!(err.to_string().contains("1500ms"));
    }

    #[test]
    fn planning_error_converts_into_orchestrator_error() {
        let inner = PlanningError::StepBudgetExceeded { steps: 5, max: 3 };
        let err: OrchestratorError = inner.into();
        match &err {
            OrchestratorError::Planning(PlanningError::StepBudgetExceeded { steps, max }) => {
                assert_eq!((*steps, *max), (5, 3));
            }
            _ => panic!("Expected OrchestratorError::Planning(StepBudgetExceeded)"),
        }
        assert!(err.to_string().contains("max_steps = 3"));
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::Timeout).unwrap();
        assert_eq!(json, "\"timeout\"");
        assert_eq!(ErrorKind::Timeout.to_string(), "TimeoutError");
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&PlanningError::Infeasible("x".into()));
        assert_std_error(&StepError::Cancelled);
        assert_std_error(&LedgerError::Closed);
        assert_std_error(&OrchestratorError::Join("x".into()));
    }
}
