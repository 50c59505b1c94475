//! Orchestrator: the ingress point for goals.
//!
//! Plans a goal, validates the plan against the capability registry, and
//! drives it with the [`FlowExecutor`]. One orchestrator serves many concurrent
//! sessions; the ledger is the only state they share.

use crate::capability::{CapabilityRegistry, LlmExecutor, ToolExecutor};
use crate::config::{Config, RunConfig};
use crate::errors::{OrchestratorError, PlanningError};
use crate::flow::{FlowExecutor, RunResult, Session, SessionId};
use crate::ledger::{JsonlSink, Ledger};
use crate::observability::{FlowEvent, ObservabilityHub};
use crate::plan::Plan;
use crate::planner::{Goal, RuleBasedPlanner, TaskPlanner};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Handle to a session running in the background.
pub struct SessionHandle {
    id: SessionId,
    cancel: CancellationToken,
    join: JoinHandle<Result<RunResult, OrchestratorError>>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Request cancellation. Steps not yet started are skipped; an in-flight
    /// step finishes and its outcome is recorded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the session to finish.
    pub async fn join(self) -> Result<RunResult, OrchestratorError> {
        self.join
            .await
            .map_err(|e| OrchestratorError::Join(e.to_string()))?
    }
}

/// Plans and runs goals.
#[derive(Clone)]
pub struct Orchestrator {
    planner: Arc<dyn TaskPlanner>,
    registry: Arc<CapabilityRegistry>,
    executor: FlowExecutor,
    hub: ObservabilityHub,
    tools: Option<Arc<ToolExecutor>>,
}

impl Orchestrator {
    pub fn new(
        planner: Arc<dyn TaskPlanner>,
        registry: CapabilityRegistry,
        ledger: Ledger,
        hub: ObservabilityHub,
    ) -> Self {
        let registry = Arc::new(registry);
        let executor = FlowExecutor::new(Arc::clone(&registry), ledger, hub.clone());
        Self {
            planner,
            registry,
            executor,
            hub,
            tools: None,
        }
    }

    /// Orchestrator with the built-in tools, the offline language model, the
    /// rule-based planner and the ledger settings from `config`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_config(config: &Config) -> Self {
        let tools = Arc::new(ToolExecutor::with_builtins());
        let planner = RuleBasedPlanner::from_config(&config.toml.planner).with_tools(Arc::clone(&tools));
        Self::from_config_with_planner(config, Arc::new(planner), tools)
    }

    /// Like [`from_config`](Self::from_config) with a caller-supplied planner.
    pub fn from_config_with_planner(
        config: &Config,
        planner: Arc<dyn TaskPlanner>,
        tools: Arc<ToolExecutor>,
    ) -> Self {
        let registry = CapabilityRegistry::new()
            .with(tools.clone())
            .with(Arc::new(LlmExecutor::offline(config.toml.llm.clone())));

        let ledger = if config.toml.ledger.persist {
            debug!(dir = %config.ledger_dir.display(), "Persisting ledger");
            Ledger::with_sink(Arc::new(JsonlSink::new(&config.ledger_dir)))
        } else {
            Ledger::new()
        };
        let hub = ObservabilityHub::new(config.toml.events.capacity);

        let mut orchestrator = Self::new(planner, registry, ledger, hub);
        orchestrator.tools = Some(tools);
        orchestrator
    }

    pub fn ledger(&self) -> &Ledger {
        self.executor.ledger()
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// The tool executor, when the orchestrator was built from configuration.
    pub fn tools(&self) -> Option<&Arc<ToolExecutor>> {
        self.tools.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.hub.subscribe()
    }

    /// Plan a goal and validate the plan, without executing anything.
    pub async fn plan(&self, goal: &Goal, config: &RunConfig) -> Result<Plan, PlanningError> {
        let plan = self.planner.plan(goal, config).await?;
        if plan.len() > config.max_steps {
            return Err(PlanningError::StepBudgetExceeded {
                steps: plan.len(),
                max: config.max_steps,
            });
        }
        self.registry.validate_plan(&plan)?;
        Ok(plan)
    }

    /// Plan and run a goal to completion.
    pub async fn submit(&self, goal: Goal, config: RunConfig) -> Result<RunResult, OrchestratorError> {
        self.run_session(Session::new(goal, config)).await
    }

    /// Plan and run a prepared session.
    pub async fn run_session(&self, session: Session) -> Result<RunResult, OrchestratorError> {
        let plan = self.plan(&session.goal, &session.config).await?;
        info!(session_id = %session.id, steps = plan.len(), "Plan accepted");
        Ok(self.executor.run(plan, session).await?)
    }

    /// Run a goal on a background task.
    pub fn spawn(&self, goal: Goal, config: RunConfig) -> SessionHandle {
        let session = Session::new(goal, config);
        let id = session.id;
        let cancel = session.cancel_token();
        let orchestrator = self.clone();
        let join = tokio::spawn(async move { orchestrator.run_session(session).await });
        SessionHandle { id, cancel, join }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::RunStatus;
    use crate::plan::{PlanSpec, Step, StepKind};
    use crate::planner::StaticPlanner;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> Config {
        Config::load(dir.to_path_buf(), None, false).unwrap()
    }

    #[tokio::test]
    async fn test_submit_research_goal_offline() {
        let dir = tempdir().unwrap();
        let orchestrator = Orchestrator::from_config(&config(dir.path()));

        let result = orchestrator
            .submit(Goal::new("Research Rust async runtimes"), RunConfig::default())
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Succeeded);
        assert_eq!(result.trace.len(), 3);
        assert_eq!(result.context.len(), 3);
        let answer = result.answer.unwrap();
        assert!(
            answer["content"]
                .as_str()
                .unwrap()
                .starts_with("Summarize findings: Research Rust async runtimes")
        );
    }

    #[tokio::test]
    async fn test_submit_persists_ledger_file() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let orchestrator = Orchestrator::from_config(&config);

        let result = orchestrator
            .submit(Goal::new("Learn Rust"), RunConfig::default())
            .await
            .unwrap();

        let path = JsonlSink::new(&config.ledger_dir).session_path(&result.session_id);
        let lines = std::fs::read_to_string(path).unwrap();
        assert_eq!(lines.lines().count(), 4);
    }

    #[tokio::test]
    async fn test_planning_error_surfaces_before_execution() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let spec = PlanSpec {
            mode: None,
            steps: vec![Step::new("a", StepKind::custom("http"), "fetch")],
        };
        let orchestrator = Orchestrator::from_config_with_planner(
            &config,
            Arc::new(StaticPlanner::new(spec)),
            Arc::new(ToolExecutor::with_builtins()),
        );

        let err = orchestrator
            .submit(Goal::new("fetch"), RunConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Planning(PlanningError::UnregisteredKind { .. })
        ));
        assert!(orchestrator.ledger().sessions().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_and_join() {
        let dir = tempdir().unwrap();
        let orchestrator = Orchestrator::from_config(&config(dir.path()));

        let handle = orchestrator.spawn(Goal::new("Build a CLI"), RunConfig::default());
        let id = handle.id();
        let result = handle.join().await.unwrap();
        assert_eq!(result.session_id, id);
        assert!(result.is_success());
        assert_eq!(orchestrator.ledger().query(&id).len(), 4);
    }
}
