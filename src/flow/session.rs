//! Sessions and their accumulated context.

use crate::config::RunConfig;
use crate::ledger::ExecutionRecord;
use crate::plan::{StepId, StepStatus};
use crate::planner::Goal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identifier of a session.
pub type SessionId = Uuid;

/// Accepted step outputs of one session, keyed by step id.
///
/// Entries are written once, when a step succeeds, and never overwritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    entries: BTreeMap<StepId, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step's output. Returns `false` and leaves the context unchanged
    /// if the step already has an entry.
    pub fn insert(&mut self, step_id: impl Into<StepId>, output: Value) -> bool {
        match self.entries.entry(step_id.into()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(output);
                true
            }
        }
    }

    pub fn get(&self, step_id: &str) -> Option<&Value> {
        self.entries.get(step_id)
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.entries.contains_key(step_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &StepId> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StepId, &Value)> {
        self.entries.iter()
    }

    /// Rebuild a context from a session's trace.
    ///
    /// Only succeeded records contribute; the first success of a step wins,
    /// matching how the executor writes the live context.
    pub fn replay<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a ExecutionRecord>,
    {
        let mut context = Self::new();
        for record in records {
            if record.status == StepStatus::Succeeded
                && let Some(output) = &record.output
            {
                context.insert(record.step_id.clone(), output.clone());
            }
        }
        context
    }
}

/// One run of a plan: the goal, its configuration, the accumulated context
/// and a cancellation token.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub goal: Goal,
    pub config: RunConfig,
    pub context: Context,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(goal: Goal, config: RunConfig) -> Self {
        Self::with_token(goal, config, CancellationToken::new())
    }

    pub fn with_token(goal: Goal, config: RunConfig, cancel: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            goal,
            config,
            context: Context::new(),
            cancel,
        }
    }

    /// A handle that cancels this session when triggered.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{ExecutionRecord, StepInput};
    use crate::plan::StepKind;
    use serde_json::json;

    fn record(step: &str, attempt: u32, status: StepStatus, output: Option<Value>) -> ExecutionRecord {
        let session = Uuid::nil();
        let input = StepInput {
            kind: StepKind::Llm,
            params: Default::default(),
            context_keys: Vec::new(),
        };
        let now = chrono::Utc::now();
        ExecutionRecord {
            session_id: session,
            step_id: step.to_string(),
            attempt,
            status,
            input,
            output,
            error: None,
            started_at: now,
            ended_at: now,
        }
    }

    #[test]
    fn test_context_entries_are_write_once() {
        let mut context = Context::new();
        assert!(context.insert("step-1", json!("first")));
        assert!(!context.insert("step-1", json!("second")));
        assert_eq!(context.get("step-1"), Some(&json!("first")));
        assert_eq!(context.len(), 1);
    }

    #[test]
    fn test_replay_uses_only_successes() {
        let records = vec![
            record("step-1", 1, StepStatus::Succeeded, Some(json!("a"))),
            record("step-2", 1, StepStatus::Failed, None),
            record("step-2", 2, StepStatus::Succeeded, Some(json!("b"))),
            record("step-3", 1, StepStatus::Failed, None),
        ];
        let context = Context::replay(&records);
        assert_eq!(context.len(), 2);
        assert_eq!(context.get("step-2"), Some(&json!("b")));
        assert!(!context.contains("step-3"));
    }

    #[test]
    fn test_context_serializes_as_plain_map() {
        let mut context = Context::new();
        context.insert("b", json!(2));
        context.insert("a", json!(1));
        assert_eq!(serde_json::to_string(&context).unwrap(), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn test_session_cancel_token_is_shared() {
        let session = Session::new(Goal::new("goal"), RunConfig::default());
        let token = session.cancel_token();
        assert!(!session.is_cancelled());
        token.cancel();
        assert!(session.is_cancelled());
    }
}
