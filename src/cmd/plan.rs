//! Plan preview: `agentflow plan`.

use agentflow::config::{Config, FlowMode};
use agentflow::plan::Plan;
use agentflow::planner::Goal;
use agentflow::util::truncate;
use anyhow::Result;
use std::path::Path;

use super::run::PLANNING_FAILED;
use super::{build_orchestrator, parse_params};

/// Plan a goal and print the result without executing anything.
pub async fn cmd_plan(
    config: &Config,
    goal: &str,
    params: &[String],
    plan_file: Option<&Path>,
    mode: Option<FlowMode>,
    json: bool,
) -> Result<i32> {
    let mut run_config = config.run_config();
    if let Some(mode) = mode {
        run_config.mode = mode;
    }
    let goal = Goal::new(goal).with_params(parse_params(params)?);

    let planned = match build_orchestrator(config, plan_file) {
        Ok(orchestrator) => orchestrator.plan(&goal, &run_config).await,
        Err(e) => Err(e),
    };
    let plan = match planned {
        Ok(plan) => plan,
        Err(e) => {
            println!("Planning failed: {}", e);
            return Ok(PLANNING_FAILED);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&plan.to_spec())?);
    } else {
        print_plan(&plan);
    }
    Ok(0)
}

fn print_plan(plan: &Plan) {
    println!("Plan ({} steps, {} mode)", plan.len(), plan.mode());
    println!();
    for step in plan.steps() {
        let target = step
            .param_str("tool")
            .map(|tool| format!("{}:{}", step.kind, tool))
            .unwrap_or_else(|| step.kind.to_string());
        let optional = if step.optional { " (optional)" } else { "" };
        println!(
            "  {:<10} {:<18} {}{}",
            step.id,
            target,
            truncate(&step.description, 60),
            optional
        );
        if !step.depends_on.is_empty() {
            println!("  {:<10} after: {}", "", step.depends_on.join(", "));
        }
    }

    let waves = plan.waves();
    if plan.mode() == FlowMode::Dag && waves.len() < plan.len() {
        println!();
        println!("Waves:");
        for (i, wave) in waves.iter().enumerate() {
            println!("  {}: {}", i + 1, wave.join(", "));
        }
    }
}
