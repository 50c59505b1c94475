//! Observability hub: best-effort lifecycle events.
//!
//! Events fan out over a bounded broadcast channel. Emitting never blocks and
//! never fails a run; a subscriber that falls behind loses the oldest events.
//! Every event is mirrored into `tracing` at debug level.

use crate::errors::ErrorKind;
use crate::flow::{RunStatus, SessionId};
use crate::plan::StepId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Lifecycle event of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FlowEvent {
    PlanStarted {
        session_id: SessionId,
        goal: String,
        steps: usize,
        timestamp: DateTime<Utc>,
    },
    StepStarted {
        session_id: SessionId,
        step_id: StepId,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    StepSucceeded {
        session_id: SessionId,
        step_id: StepId,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    StepFailed {
        session_id: SessionId,
        step_id: StepId,
        attempt: u32,
        error_kind: ErrorKind,
        message: String,
        /// Whether another attempt follows
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },
    StepSkipped {
        session_id: SessionId,
        step_id: StepId,
        timestamp: DateTime<Utc>,
    },
    PlanCompleted {
        session_id: SessionId,
        status: RunStatus,
        timestamp: DateTime<Utc>,
    },
}

/// Discriminant of a [`FlowEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PlanStarted,
    StepStarted,
    StepSucceeded,
    StepFailed,
    StepSkipped,
    PlanCompleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlanStarted => "planStarted",
            Self::StepStarted => "stepStarted",
            Self::StepSucceeded => "stepSucceeded",
            Self::StepFailed => "stepFailed",
            Self::StepSkipped => "stepSkipped",
            Self::PlanCompleted => "planCompleted",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FlowEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PlanStarted { .. } => EventKind::PlanStarted,
            Self::StepStarted { .. } => EventKind::StepStarted,
            Self::StepSucceeded { .. } => EventKind::StepSucceeded,
            Self::StepFailed { .. } => EventKind::StepFailed,
            Self::StepSkipped { .. } => EventKind::StepSkipped,
            Self::PlanCompleted { .. } => EventKind::PlanCompleted,
        }
    }

    pub fn session_id(&self) -> SessionId {
        match self {
            Self::PlanStarted { session_id, .. }
            | Self::StepStarted { session_id, .. }
            | Self::StepSucceeded { session_id, .. }
            | Self::StepFailed { session_id, .. }
            | Self::StepSkipped { session_id, .. }
            | Self::PlanCompleted { session_id, .. } => *session_id,
        }
    }

    pub fn step_id(&self) -> Option<&str> {
        match self {
            Self::StepStarted { step_id, .. }
            | Self::StepSucceeded { step_id, .. }
            | Self::StepFailed { step_id, .. }
            | Self::StepSkipped { step_id, .. } => Some(step_id),
            Self::PlanStarted { .. } | Self::PlanCompleted { .. } => None,
        }
    }

    pub fn plan_started(session_id: SessionId, goal: &str, steps: usize) -> Self {
        Self::PlanStarted {
            session_id,
            goal: goal.to_string(),
            steps,
            timestamp: Utc::now(),
        }
    }

    pub fn step_started(session_id: SessionId, step_id: &str, attempt: u32) -> Self {
        Self::StepStarted {
            session_id,
            step_id: step_id.to_string(),
            attempt,
            timestamp: Utc::now(),
        }
    }

    pub fn step_succeeded(session_id: SessionId, step_id: &str, attempt: u32) -> Self {
        Self::StepSucceeded {
            session_id,
            step_id: step_id.to_string(),
            attempt,
            timestamp: Utc::now(),
        }
    }

    pub fn step_failed(
        session_id: SessionId,
        step_id: &str,
        attempt: u32,
        error_kind: ErrorKind,
        message: &str,
        will_retry: bool,
    ) -> Self {
        Self::StepFailed {
            session_id,
            step_id: step_id.to_string(),
            attempt,
            error_kind,
            message: message.to_string(),
            will_retry,
            timestamp: Utc::now(),
        }
    }

    pub fn step_skipped(session_id: SessionId, step_id: &str) -> Self {
        Self::StepSkipped {
            session_id,
            step_id: step_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn plan_completed(session_id: SessionId, status: RunStatus) -> Self {
        Self::PlanCompleted {
            session_id,
            status,
            timestamp: Utc::now(),
        }
    }
}

/// Fan-out point for lifecycle events.
#[derive(Debug, Clone)]
pub struct ObservabilityHub {
    tx: broadcast::Sender<FlowEvent>,
    capacity: usize,
}

impl ObservabilityHub {
    /// Create a hub buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: FlowEvent) {
        debug!(
            event = %event.kind(),
            session_id = %event.session_id(),
            step_id = event.step_id().unwrap_or("-"),
            "Flow event"
        );
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ObservabilityHub {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_emit_delivers_to_subscriber() {
        let hub = ObservabilityHub::new(16);
        let mut rx = hub.subscribe();
        let session = Uuid::new_v4();

        hub.emit(FlowEvent::step_started(session, "step-1", 1));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), EventKind::StepStarted);
        assert_eq!(event.session_id(), session);
        assert_eq!(event.step_id(), Some("step-1"));
    }

    #[test]
    fn test_emit_without_subscribers_is_ok() {
        let hub = ObservabilityHub::new(4);
        hub.emit(FlowEvent::plan_started(Uuid::nil(), "goal", 3));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_loses_oldest() {
        let hub = ObservabilityHub::new(2);
        let mut rx = hub.subscribe();
        for i in 1..=4 {
            hub.emit(FlowEvent::step_started(Uuid::nil(), &format!("step-{}", i), 1));
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(2))));
        let next = rx.recv().await.unwrap();
        assert_eq!(next.step_id(), Some("step-3"));
    }

    #[test]
    fn test_event_json_uses_camel_case_type_tag() {
        let event = FlowEvent::step_failed(
            Uuid::nil(),
            "step-2",
            1,
            ErrorKind::Timeout,
            "too slow",
            true,
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "stepFailed");
        assert_eq!(value["error_kind"], "timeout");
        assert_eq!(value["will_retry"], true);
        assert_eq!(event.kind().to_string(), "stepFailed");
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        assert_eq!(ObservabilityHub::new(0).capacity(), 1);
    }
}
