//! Kind-tag to capability map.

use crate::capability::Capability;
use crate::errors::PlanningError;
use crate::plan::{Plan, StepKind};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Maps step kinds to the capability that executes them.
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    capabilities: HashMap<StepKind, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability under its kind, replacing any previous one.
    pub fn register(&mut self, capability: Arc<dyn Capability>) -> &mut Self {
        let kind = capability.kind();
        debug!(kind = %kind, "Registering capability");
        self.capabilities.insert(kind, capability);
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, capability: Arc<dyn Capability>) -> Self {
        self.register(capability);
        self
    }

    pub fn resolve(&self, kind: &StepKind) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(kind).cloned()
    }

    pub fn contains(&self, kind: &StepKind) -> bool {
        self.capabilities.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<StepKind> {
        let mut kinds: Vec<StepKind> = self.capabilities.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Reject a plan that references an unregistered kind or holds a step its
    /// capability refuses.
    pub fn validate_plan(&self, plan: &Plan) -> Result<(), PlanningError> {
        for step in plan.steps() {
            let capability =
                self.capabilities
                    .get(&step.kind)
                    .ok_or_else(|| PlanningError::UnregisteredKind {
                        step: step.id.clone(),
                        kind: step.kind.to_string(),
                    })?;

            capability
                .validate(step)
                .map_err(|message| PlanningError::InvalidStep {
                    step: step.id.clone(),
                    message,
                })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StepError;
    use crate::flow::Context;
    use crate::plan::{PlanBuilder, Step};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::time::Duration;

    struct Fixed {
        kind: StepKind,
    }

    #[async_trait]
    impl Capability for Fixed {
        fn kind(&self) -> StepKind {
            self.kind.clone()
        }

        fn validate(&self, step: &Step) -> Result<(), String> {
            if step.params.contains_key("reject") {
                return Err("rejected by capability".to_string());
            }
            Ok(())
        }

        async fn execute(
            &self,
            _step: &Step,
            _context: &Context,
            _timeout: Duration,
        ) -> Result<Value, StepError> {
            Ok(json!("done"))
        }
    }

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::new()
            .with(Arc::new(Fixed {
                kind: StepKind::Llm,
            }))
            .with(Arc::new(Fixed {
                kind: StepKind::custom("http"),
            }))
    }

    #[test]
    fn test_resolve_registered_kinds() {
        let registry = registry();
        assert!(registry.resolve(&StepKind::Llm).is_some());
        assert!(registry.resolve(&StepKind::custom("http")).is_some());
        assert!(registry.resolve(&StepKind::Tool).is_none());
        assert_eq!(
            registry.kinds(),
            vec![StepKind::Llm, StepKind::custom("http")]
        );
    }

    #[test]
    fn test_validate_plan_rejects_unregistered_kind() {
        let plan = PlanBuilder::linear(vec![
            Step::new("a", StepKind::Llm, "think"),
            Step::new("b", StepKind::Tool, "use tool"),
        ])
        .build()
        .unwrap();

        let err = registry().validate_plan(&plan).unwrap_err();
        assert_eq!(
            err,
            PlanningError::UnregisteredKind {
                step: "b".into(),
                kind: "tool".into()
            }
        );
    }

    #[test]
    fn test_validate_plan_surfaces_capability_rejection() {
        let plan = PlanBuilder::linear(vec![
            Step::new("a", StepKind::Llm, "think").with_param("reject", true),
        ])
        .build()
        .unwrap();

        match registry().validate_plan(&plan) {
            Err(PlanningError::InvalidStep { step, message }) => {
                assert_eq!(step, "a");
                assert!(message.contains("rejected"));
            }
            other => panic!("expected InvalidStep, got {:?}", other),
        }
    }

    #[test]
    fn test_register_replaces_existing_kind() {
        let mut registry = registry();
        registry.register(Arc::new(Fixed {
            kind: StepKind::Llm,
        }));
        assert_eq!(registry.kinds().len(), 2);
    }
}
