//! Step scheduler: per-step state machine and ready-set computation.
//!
//! The scheduler owns a validated [`Plan`] and tracks the status of each step.
//! The flow mode decides how the ready set is computed; the executor loop only
//! asks for it and reports outcomes back.

use crate::config::{FailurePolicy, FlowMode};
use crate::plan::graph::{Plan, StepIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Status of a step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step has not started
    #[default]
    Pending,
    /// Step is being dispatched
    Running,
    Succeeded,
    Failed,
    /// Step never ran to completion (abort, cancellation, or a failed dependency)
    Skipped,
}

impl StepStatus {
    /// Check if the step is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks step statuses for one run of a plan.
#[derive(Debug)]
pub struct StepScheduler {
    plan: Plan,
    statuses: Vec<StepStatus>,
    policy: FailurePolicy,
    /// Steps whose dependents may proceed
    succeeded: HashSet<StepIndex>,
}

impl StepScheduler {
    pub fn new(plan: Plan, policy: FailurePolicy) -> Self {
        let statuses = vec![StepStatus::Pending; plan.len()];
        Self {
            plan,
            statuses,
            policy,
            succeeded: HashSet::new(),
        }
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn status(&self, index: StepIndex) -> StepStatus {
        self.statuses
            .get(index)
            .copied()
            .unwrap_or(StepStatus::Skipped)
    }

    pub fn status_of(&self, id: &str) -> Option<StepStatus> {
        self.plan.index_of(id).map(|i| self.status(i))
    }

    /// Final status of every step, in plan order.
    pub fn statuses(&self) -> Vec<(String, StepStatus)> {
        self.plan
            .steps()
            .iter()
            .zip(&self.statuses)
            .map(|(step, status)| (step.id.clone(), *status))
            .collect()
    }

    /// Steps that are pending with every dependency succeeded, in plan order.
    ///
    /// Linear mode yields at most one step; DAG mode yields every ready step.
    pub fn ready_steps(&self) -> Vec<StepIndex> {
        let ready = (0..self.statuses.len()).filter(|&i| {
            self.statuses[i] == StepStatus::Pending
                && self.plan.dependencies_satisfied(i, &self.succeeded)
        });

        match self.plan.mode() {
            FlowMode::Linear => ready.take(1).collect(),
            FlowMode::Dag => ready.collect(),
        }
    }

    pub fn mark_running(&mut self, index: StepIndex) {
        self.set(index, StepStatus::Running);
    }

    pub fn mark_succeeded(&mut self, index: StepIndex) {
        self.set(index, StepStatus::Succeeded);
        self.succeeded.insert(index);
    }

    /// Mark a step as fatally failed.
    ///
    /// Returns `true` when the failure policy requires the run to abort. A
    /// tolerated failure still never satisfies a dependency; call
    /// [`skip_dependents`](Self::skip_dependents) to retire the steps that needed it.
    pub fn mark_failed(&mut self, index: StepIndex) -> bool {
        self.set(index, StepStatus::Failed);
        !self.tolerates_failure(index)
    }

    pub fn mark_skipped(&mut self, index: StepIndex) {
        self.set(index, StepStatus::Skipped);
    }

    /// Skip every pending step that transitively depends on `index`.
    ///
    /// Returns the newly skipped steps in plan order.
    pub fn skip_dependents(&mut self, index: StepIndex) -> Vec<StepIndex> {
        let mut skipped = Vec::new();
        let mut queue: VecDeque<StepIndex> = self.plan.dependents(index).iter().copied().collect();
        while let Some(next) = queue.pop_front() {
            if self.statuses.get(next) != Some(&StepStatus::Pending) {
                continue;
            }
            self.statuses[next] = StepStatus::Skipped;
            skipped.push(next);
            queue.extend(self.plan.dependents(next).iter().copied());
        }
        skipped.sort_unstable();
        skipped
    }

    /// Whether the given step failing can be tolerated by the run.
    pub fn tolerates_failure(&self, index: StepIndex) -> bool {
        self.policy == FailurePolicy::SkipOptional
            && self.plan.step(index).is_some_and(|s| s.optional)
    }

    /// Skip every step that has not started. Returns the newly skipped steps.
    pub fn skip_remaining(&mut self) -> Vec<StepIndex> {
        let pending: Vec<StepIndex> = (0..self.statuses.len())
            .filter(|&i| self.statuses[i] == StepStatus::Pending)
            .collect();
        for &index in &pending {
            self.statuses[index] = StepStatus::Skipped;
        }
        pending
    }

    fn set(&mut self, index: StepIndex, status: StepStatus) {
        if let Some(slot) = self.statuses.get_mut(index) {
            *slot = status;
        }
    }

    /// Check if all steps are terminal.
    pub fn all_complete(&self) -> bool {
        self.statuses.iter().all(StepStatus::is_terminal)
    }

    /// Check if all steps succeeded.
    pub fn all_success(&self) -> bool {
        self.statuses.iter().all(StepStatus::is_success)
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.statuses.iter().filter(|s| **s == status).count()
    }

    /// Get completion percentage.
    pub fn completion_percentage(&self) -> f64 {
        if self.statuses.is_empty() {
            return 100.0;
        }
        let terminal = self.statuses.iter().filter(|s| s.is_terminal()).count();
        (terminal as f64 / self.statuses.len() as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::graph::PlanBuilder;
    use crate::plan::step::{Step, StepKind};

    fn step(id: &str, deps: Vec<&str>) -> Step {
        Step::new(id, StepKind::Llm, format!("Step {}", id)).depends_on(deps)
    }

    fn linear(ids: &[&str]) -> StepScheduler {
        let steps = ids.iter().map(|id| step(id, vec![])).collect();
        let plan = PlanBuilder::linear(steps).build().unwrap();
        StepScheduler::new(plan, FailurePolicy::Abort)
    }

    fn diamond(policy: FailurePolicy, optional_b: bool) -> StepScheduler {
        let plan = PlanBuilder::dag(vec![
            step("a", vec![]),
            step("b", vec!["a"]).optional(optional_b),
            step("c", vec!["a"]),
            step("d", vec!["b", "c"]),
        ])
        .build()
        .unwrap();
        StepScheduler::new(plan, policy)
    }

    #[test]
    fn test_linear_ready_set_is_one_step_in_order() {
        let mut scheduler = linear(&["a", "b", "c"]);

        assert_eq!(scheduler.ready_steps(), vec![0]);
        scheduler.mark_running(0);
        assert!(scheduler.ready_steps().is_empty());
        scheduler.mark_succeeded(0);
        assert_eq!(scheduler.ready_steps(), vec![1]);
    }

    #[test]
    fn test_linear_mode_takes_one_even_with_independent_roots() {
        let plan = PlanBuilder::dag(vec![step("a", vec![]), step("b", vec![])])
            .build()
            .unwrap();
        let dag_scheduler = StepScheduler::new(plan.clone(), FailurePolicy::Abort);
        assert_eq!(dag_scheduler.ready_steps(), vec![0, 1]);

        let linear = PlanBuilder::linear(plan.steps().to_vec()).build().unwrap();
        let scheduler = StepScheduler::new(linear, FailurePolicy::Abort);
        assert_eq!(scheduler.ready_steps(), vec![0]);
    }

    #[test]
    fn test_dag_ready_set_after_root() {
        let mut scheduler = diamond(FailurePolicy::Abort, false);

        assert_eq!(scheduler.ready_steps(), vec![0]);
        scheduler.mark_succeeded(0);
        assert_eq!(scheduler.ready_steps(), vec![1, 2]);
        scheduler.mark_succeeded(1);
        assert_eq!(scheduler.ready_steps(), vec![2]);
        scheduler.mark_succeeded(2);
        assert_eq!(scheduler.ready_steps(), vec![3]);
    }

    #[test]
    fn test_failure_under_abort_requests_abort() {
        let mut scheduler = diamond(FailurePolicy::Abort, true);
        scheduler.mark_succeeded(0);

        assert!(scheduler.mark_failed(1));
        let skipped = scheduler.skip_remaining();
        assert_eq!(skipped, vec![2, 3]);
        assert!(scheduler.all_complete());
        assert!(!scheduler.all_success());
    }

    #[test]
    fn test_optional_failure_is_tolerated_under_skip_optional() {
        let mut scheduler = diamond(FailurePolicy::SkipOptional, true);
        scheduler.mark_succeeded(0);

        assert!(!scheduler.mark_failed(1));
        assert_eq!(scheduler.skip_dependents(1), vec![3]);
        assert_eq!(scheduler.status(3), StepStatus::Skipped);

        // c does not need b and still runs
        assert_eq!(scheduler.ready_steps(), vec![2]);
        scheduler.mark_succeeded(2);
        assert!(scheduler.ready_steps().is_empty());
        assert!(scheduler.all_complete());
    }

    #[test]
    fn test_failed_dependency_never_becomes_ready() {
        let mut scheduler = diamond(FailurePolicy::SkipOptional, true);
        scheduler.mark_succeeded(0);
        scheduler.mark_failed(1);
        scheduler.mark_succeeded(2);

        assert_eq!(scheduler.status(3), StepStatus::Pending);
        assert!(scheduler.ready_steps().is_empty());
    }

    #[test]
    fn test_skip_dependents_is_transitive() {
        let plan = PlanBuilder::dag(vec![
            step("a", vec![]),
            step("b", vec!["a"]).optional(true),
            step("c", vec!["b"]),
            step("d", vec!["c"]),
            step("e", vec!["a"]),
        ])
        .build()
        .unwrap();
        let mut scheduler = StepScheduler::new(plan, FailurePolicy::SkipOptional);
        scheduler.mark_succeeded(0);

        assert!(!scheduler.mark_failed(1));
        assert_eq!(scheduler.skip_dependents(1), vec![2, 3]);
        assert_eq!(scheduler.ready_steps(), vec![4]);
    }

    #[test]
    fn test_required_failure_aborts_under_skip_optional() {
        let mut scheduler = diamond(FailurePolicy::SkipOptional, true);
        scheduler.mark_succeeded(0);
        assert!(scheduler.mark_failed(2));
    }

    #[test]
    fn test_statuses_in_plan_order() {
        let mut scheduler = linear(&["a", "b"]);
        scheduler.mark_succeeded(0);
        scheduler.skip_remaining();

        let statuses = scheduler.statuses();
        assert_eq!(
            statuses,
            vec![
                ("a".to_string(), StepStatus::Succeeded),
                ("b".to_string(), StepStatus::Skipped)
            ]
        );
        assert_eq!(scheduler.status_of("b"), Some(StepStatus::Skipped));
        assert_eq!(scheduler.status_of("zz"), None);
    }

    #[test]
    fn test_completion_percentage() {
        let mut scheduler = linear(&["a", "b", "c", "d"]);
        assert_eq!(scheduler.completion_percentage(), 0.0);
        scheduler.mark_succeeded(0);
        assert_eq!(scheduler.completion_percentage(), 25.0);
        scheduler.mark_running(1);
        assert_eq!(scheduler.completion_percentage(), 25.0);
        scheduler.mark_failed(1);
        assert_eq!(scheduler.completion_percentage(), 50.0);
        assert_eq!(scheduler.count(StepStatus::Failed), 1);
    }

    #[test]
    fn test_empty_plan_is_complete() {
        let scheduler = linear(&[]);
        assert!(scheduler.all_complete());
        assert_eq!(scheduler.completion_percentage(), 100.0);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&StepStatus::Succeeded).unwrap();
        assert_eq!(json, "\"succeeded\"");
    }
}
