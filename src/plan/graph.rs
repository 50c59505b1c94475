//! Plan graph construction and validation.
//!
//! The builder takes steps with their dependencies and constructs a directed
//! acyclic graph. Linear plans are the chain special case of the same structure.

use crate::config::FlowMode;
use crate::errors::PlanningError;
use crate::plan::spec::PlanSpec;
use crate::plan::step::{Step, StepId};
use std::collections::{HashMap, HashSet};

/// Index into the step list.
pub type StepIndex = usize;

/// A validated directed acyclic graph of steps.
#[derive(Debug, Clone)]
pub struct Plan {
    mode: FlowMode,
    /// Steps indexed by their position
    steps: Vec<Step>,
    /// Map from step id to index
    index_map: HashMap<StepId, StepIndex>,
    /// Forward edges: index -> steps that depend on it
    forward_edges: Vec<Vec<StepIndex>>,
    /// Reverse edges: index -> steps it depends on
    reverse_edges: Vec<Vec<StepIndex>>,
}

impl Plan {
    pub fn mode(&self) -> FlowMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, index: StepIndex) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn step_by_id(&self, id: &str) -> Option<&Step> {
        self.index_map.get(id).and_then(|&i| self.steps.get(i))
    }

    pub fn index_of(&self, id: &str) -> Option<StepIndex> {
        self.index_map.get(id).copied()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Steps that depend on the given step (forward edges).
    pub fn dependents(&self, index: StepIndex) -> &[StepIndex] {
        self.forward_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Steps the given step depends on (reverse edges).
    pub fn dependencies(&self, index: StepIndex) -> &[StepIndex] {
        self.reverse_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Steps with no dependencies (entry points).
    pub fn root_steps(&self) -> Vec<StepIndex> {
        self.reverse_edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// Steps no other step depends on (exit points).
    pub fn leaf_steps(&self) -> Vec<StepIndex> {
        self.forward_edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// Check if all dependencies of a step are in `completed`.
    pub fn dependencies_satisfied(&self, index: StepIndex, completed: &HashSet<StepIndex>) -> bool {
        self.dependencies(index)
            .iter()
            .all(|dep| completed.contains(dep))
    }

    /// Groups of steps whose dependencies are met once all earlier groups finish.
    pub fn waves(&self) -> Vec<Vec<StepId>> {
        let mut waves = Vec::new();
        let mut completed: HashSet<StepIndex> = HashSet::new();

        loop {
            let ready: Vec<StepIndex> = (0..self.steps.len())
                .filter(|i| !completed.contains(i) && self.dependencies_satisfied(*i, &completed))
                .collect();

            if ready.is_empty() {
                break;
            }

            completed.extend(ready.iter().copied());
            waves.push(ready.iter().map(|&i| self.steps[i].id.clone()).collect());
        }

        waves
    }

    /// Serializable description of this plan.
    pub fn to_spec(&self) -> PlanSpec {
        PlanSpec {
            mode: Some(self.mode),
            steps: self.steps.clone(),
        }
    }
}

/// Builder for constructing plans.
pub struct PlanBuilder {
    steps: Vec<Step>,
    mode: FlowMode,
}

impl PlanBuilder {
    /// A DAG plan whose edges come from each step's `depends_on`.
    pub fn dag(steps: Vec<Step>) -> Self {
        Self {
            steps,
            mode: FlowMode::Dag,
        }
    }

    /// A chain plan: each step depends on exactly its predecessor.
    pub fn linear(mut steps: Vec<Step>) -> Self {
        let mut previous: Option<StepId> = None;
        for step in &mut steps {
            step.depends_on = previous.iter().cloned().collect();
            previous = Some(step.id.clone());
        }
        Self {
            steps,
            mode: FlowMode::Linear,
        }
    }

    pub fn for_mode(mode: FlowMode, steps: Vec<Step>) -> Self {
        match mode {
            FlowMode::Linear => Self::linear(steps),
            FlowMode::Dag => Self::dag(steps),
        }
    }

    /// Build the plan.
    ///
    /// This validates the graph structure:
    /// - Step ids are unique
    /// - All dependencies reference existing steps
    /// - No cycles are allowed
    pub fn build(self) -> Result<Plan, PlanningError> {
        let mut index_map = HashMap::new();
        for (i, step) in self.steps.iter().enumerate() {
            if index_map.insert(step.id.clone(), i).is_some() {
                return Err(PlanningError::DuplicateStep(step.id.clone()));
            }
        }

        let mut forward_edges: Vec<Vec<StepIndex>> = vec![Vec::new(); self.steps.len()];
        let mut reverse_edges: Vec<Vec<StepIndex>> = vec![Vec::new(); self.steps.len()];

        for (to_idx, step) in self.steps.iter().enumerate() {
            for dep in &step.depends_on {
                let from_idx =
                    *index_map
                        .get(dep)
                        .ok_or_else(|| PlanningError::UnknownDependency {
                            step: step.id.clone(),
                            dependency: dep.clone(),
                        })?;

                // Dependencies are a set; repeated entries add no edge.
                if reverse_edges[to_idx].contains(&from_idx) {
                    continue;
                }
                forward_edges[from_idx].push(to_idx);
                reverse_edges[to_idx].push(from_idx);
            }
        }

        let plan = Plan {
            mode: self.mode,
            steps: self.steps,
            index_map,
            forward_edges,
            reverse_edges,
        };

        Self::validate_no_cycles(&plan)?;

        Ok(plan)
    }

    /// Validate that the graph has no cycles using Kahn's algorithm.
    fn validate_no_cycles(plan: &Plan) -> Result<(), PlanningError> {
        let mut in_degree: Vec<usize> = plan.reverse_edges.iter().map(|deps| deps.len()).collect();

        let mut queue: Vec<StepIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut processed = 0;

        while let Some(node) = queue.pop() {
            processed += 1;

            for &dependent in plan.dependents(node) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push(dependent);
                }
            }
        }

        if processed != plan.len() {
            let cycle_steps: Vec<String> = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, deg)| *deg > 0)
                .filter_map(|(i, _)| plan.step(i).map(|s| s.id.clone()))
                .collect();

            return Err(PlanningError::Cycle(cycle_steps));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::step::StepKind;

    fn step(id: &str, deps: Vec<&str>) -> Step {
        Step::new(id, StepKind::Llm, format!("Step {}", id)).depends_on(deps)
    }

    #[test]
    fn test_build_diamond_graph() {
        let steps = vec![
            step("a", vec![]),
            step("b", vec!["a"]),
            step("c", vec!["a"]),
            step("d", vec!["b", "c"]),
        ];

        let plan = PlanBuilder::dag(steps).build().unwrap();

        assert_eq!(plan.len(), 4);
        assert_eq!(plan.root_steps(), vec![0]);
        assert_eq!(plan.leaf_steps(), vec![3]);
        assert_eq!(plan.mode(), FlowMode::Dag);
    }

    #[test]
    fn test_linear_builder_chains_steps() {
        let steps = vec![step("a", vec![]), step("b", vec![]), step("c", vec!["a"])];

        let plan = PlanBuilder::linear(steps).build().unwrap();

        assert!(plan.dependencies(0).is_empty());
        assert_eq!(plan.dependencies(1), &[0]);
        // Declared dependencies are replaced by the chain
        assert_eq!(plan.dependencies(2), &[1]);
        assert_eq!(plan.step(2).unwrap().depends_on, vec!["b".to_string()]);
        assert_eq!(plan.leaf_steps(), vec![2]);
    }

    #[test]
    fn test_dependencies_and_dependents() {
        let steps = vec![step("a", vec![]), step("b", vec!["a"]), step("c", vec!["a"])];

        let plan = PlanBuilder::dag(steps).build().unwrap();

        assert!(plan.dependencies(0).is_empty());
        assert_eq!(plan.dependencies(1), &[0]);
        assert_eq!(plan.dependencies(2), &[0]);
        let dependents = plan.dependents(0);
        assert!(dependents.contains(&1));
        assert!(dependents.contains(&2));
    }

    #[test]
    fn test_cycle_detection() {
        let steps = vec![step("a", vec!["c"]), step("b", vec!["a"]), step("c", vec!["b"])];

        let result = PlanBuilder::dag(steps).build();
        match result {
            Err(PlanningError::Cycle(involved)) => assert_eq!(involved.len(), 3),
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let result = PlanBuilder::dag(vec![step("a", vec!["a"])]).build();
        assert!(matches!(result, Err(PlanningError::Cycle(_))));
    }

    #[test]
    fn test_missing_dependency() {
        let result = PlanBuilder::dag(vec![step("a", vec!["nonexistent"])]).build();
        let err = result.unwrap_err();
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn test_duplicate_step_id() {
        let result = PlanBuilder::dag(vec![step("a", vec![]), step("a", vec![])]).build();
        assert_eq!(result.unwrap_err(), PlanningError::DuplicateStep("a".into()));
    }

    #[test]
    fn test_repeated_dependency_adds_single_edge() {
        let plan = PlanBuilder::dag(vec![step("a", vec![]), step("b", vec!["a", "a"])])
            .build()
            .unwrap();
        assert_eq!(plan.dependencies(1), &[0]);
        assert_eq!(plan.dependents(0), &[1]);
    }

    #[test]
    fn test_empty_graph() {
        let plan = PlanBuilder::linear(vec![]).build().unwrap();
        assert!(plan.is_empty());
        assert!(plan.waves().is_empty());
    }

    #[test]
    fn test_waves_linear_and_diamond() {
        let linear = PlanBuilder::linear(vec![step("a", vec![]), step("b", vec![]), step("c", vec![])])
            .build()
            .unwrap();
        assert_eq!(linear.waves(), vec![vec!["a"], vec!["b"], vec!["c"]]);

        let diamond = PlanBuilder::dag(vec![
            step("a", vec![]),
            step("b", vec!["a"]),
            step("c", vec!["a"]),
            step("d", vec!["b", "c"]),
        ])
        .build()
        .unwrap();
        let waves = diamond.waves();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[1], vec!["b", "c"]);
    }

    #[test]
    fn test_dependencies_satisfied() {
        let plan = PlanBuilder::dag(vec![
            step("a", vec![]),
            step("b", vec!["a"]),
            step("c", vec!["a", "b"]),
        ])
        .build()
        .unwrap();
        let mut completed = HashSet::new();

        assert!(plan.dependencies_satisfied(0, &completed));
        assert!(!plan.dependencies_satisfied(1, &completed));

        completed.insert(0);
        assert!(plan.dependencies_satisfied(1, &completed));
        assert!(!plan.dependencies_satisfied(2, &completed));

        completed.insert(1);
        assert!(plan.dependencies_satisfied(2, &completed));
    }

    #[test]
    fn test_to_spec_preserves_steps() {
        let plan = PlanBuilder::linear(vec![step("a", vec![]), step("b", vec![])])
            .build()
            .unwrap();
        let spec = plan.to_spec();
        assert_eq!(spec.mode, Some(FlowMode::Linear));
        assert_eq!(spec.steps[1].depends_on, vec!["a".to_string()]);
    }
}
