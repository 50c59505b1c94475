//! Task planning: turning a goal into a validated plan.
//!
//! The planner contract is [`TaskPlanner::plan`]. Planning has no side
//! effects: it never calls executors and never touches the ledger.
//!
//! Two planners ship:
//! - [`RuleBasedPlanner`] picks a keyword template and routes each task to a
//!   tool or to the language model
//! - [`StaticPlanner`] serves a plan loaded from a plan file

pub mod templates;

use crate::capability::ToolExecutor;
use crate::config::{PlannerSection, RunConfig};
use crate::errors::PlanningError;
use crate::plan::{Plan, PlanBuilder, PlanSpec, Step, StepKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

pub use templates::Template;

/// What the user wants done.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub text: String,
    /// Structured parameters passed to every step
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Goal {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params.extend(params);
        self
    }
}

/// Turns a goal into a plan.
#[async_trait]
pub trait TaskPlanner: Send + Sync {
    async fn plan(&self, goal: &Goal, config: &RunConfig) -> Result<Plan, PlanningError>;
}

/// Add goal parameters a step does not set itself.
fn merge_goal_params(step: &mut Step, goal: &Goal) {
    for (key, value) in &goal.params {
        step.params
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}

fn check_budget(steps: usize, config: &RunConfig) -> Result<(), PlanningError> {
    if steps > config.max_steps {
        return Err(PlanningError::StepBudgetExceeded {
            steps,
            max: config.max_steps,
        });
    }
    Ok(())
}

/// Keyword-template planner.
pub struct RuleBasedPlanner {
    custom: Vec<Template>,
    builtin: Vec<Template>,
    fallback: Template,
    tools: Option<Arc<ToolExecutor>>,
}

impl Default for RuleBasedPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleBasedPlanner {
    pub fn new() -> Self {
        Self {
            custom: Vec::new(),
            builtin: templates::builtin(),
            fallback: templates::fallback(),
            tools: None,
        }
    }

    /// Planner with the custom templates from the configuration file.
    pub fn from_config(section: &PlannerSection) -> Self {
        let mut planner = Self::new();
        planner.custom = section.templates.iter().map(Template::from).collect();
        planner
    }

    /// Route tasks to the tools of `tools` when their descriptions call for one.
    pub fn with_tools(mut self, tools: Arc<ToolExecutor>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Register a custom template. Custom templates are matched before built-ins;
    /// a later template with the same name replaces the earlier one.
    pub fn add_template(&mut self, name: &str, keywords: &[&str], tasks: &[&str]) -> &mut Self {
        self.custom.retain(|t| t.name != name);
        self.custom.push(Template::new(name, keywords, tasks));
        self
    }

    /// The template a goal selects.
    pub fn select_template(&self, goal: &str) -> &Template {
        let goal_lower = goal.to_lowercase();
        self.custom
            .iter()
            .chain(self.builtin.iter())
            .find(|t| t.matches(&goal_lower))
            .unwrap_or(&self.fallback)
    }

    /// Contextualized task descriptions for a goal, without building a plan.
    pub fn decompose(&self, goal: &str) -> Vec<String> {
        self.select_template(goal)
            .tasks
            .iter()
            .map(|task| format!("{}: {}", task, goal))
            .collect()
    }

    fn step_for(&self, index: usize, description: String, goal: &Goal) -> Step {
        let id = format!("step-{}", index + 1);
        let tool = self
            .tools
            .as_ref()
            .and_then(|tools| tools.select_tool(&description))
            .map(|spec| spec.name.clone());

        let mut step = match tool {
            Some(name) => Step::new(id, StepKind::Tool, description)
                .with_param("tool", name)
                .with_param("input", goal.text.clone()),
            None => {
                let prompt = description.clone();
                Step::new(id, StepKind::Llm, description).with_param("prompt", prompt)
            }
        };
        merge_goal_params(&mut step, goal);
        step
    }
}

#[async_trait]
impl TaskPlanner for RuleBasedPlanner {
    async fn plan(&self, goal: &Goal, config: &RunConfig) -> Result<Plan, PlanningError> {
        let text = goal.text.trim();
        if text.is_empty() {
            return Err(PlanningError::Infeasible("goal is empty".to_string()));
        }

        let template = self.select_template(text);
        if template.tasks.is_empty() {
            return Err(PlanningError::Infeasible(format!(
                "template '{}' yields no steps",
                template.name
            )));
        }
        check_budget(template.tasks.len(), config)?;
        debug!(template = %template.name, tasks = template.tasks.len(), "Selected template");

        let steps: Vec<Step> = self
            .decompose(text)
            .into_iter()
            .enumerate()
            .map(|(i, description)| self.step_for(i, description, goal))
            .collect();

        // Template tasks are sequential in either mode.
        let chained = PlanBuilder::linear(steps).build()?.steps().to_vec();
        PlanBuilder::for_mode(config.mode, chained).build()
    }
}

/// Serves a fixed plan, typically loaded from a plan file.
#[derive(Debug, Clone)]
pub struct StaticPlanner {
    spec: PlanSpec,
}

impl StaticPlanner {
    pub fn new(spec: PlanSpec) -> Self {
        Self { spec }
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, PlanningError> {
        Ok(Self::new(PlanSpec::load(path)?))
    }
}

#[async_trait]
impl TaskPlanner for StaticPlanner {
    async fn plan(&self, goal: &Goal, config: &RunConfig) -> Result<Plan, PlanningError> {
        if self.spec.steps.is_empty() {
            return Err(PlanningError::Infeasible("plan file has no steps".to_string()));
        }
        check_budget(self.spec.steps.len(), config)?;

        let mut spec = self.spec.clone();
        for step in &mut spec.steps {
            merge_goal_params(step, goal);
        }
        spec.build(config.mode)
    }
}
