//! Goal execution: `agentflow run`.

use agentflow::config::{Config, RunConfig};
use agentflow::errors::OrchestratorError;
use agentflow::flow::RunResult;
use agentflow::plan::StepStatus;
use agentflow::planner::Goal;
use agentflow::util::render_output;
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use super::super::RunOverrides;
use super::{build_orchestrator, parse_params};

/// Exit code reported when a goal cannot be planned.
pub const PLANNING_FAILED: i32 = 2;

pub struct RunArgs {
    pub goal: String,
    pub params: Vec<String>,
    pub plan: Option<PathBuf>,
    pub overrides: RunOverrides,
    pub json: bool,
}

/// Layer command-line overrides over the configured run settings.
pub fn apply_overrides(mut run: RunConfig, overrides: &RunOverrides) -> RunConfig {
    if let Some(max_steps) = overrides.max_steps {
        run.max_steps = max_steps;
    }
    if let Some(ms) = overrides.timeout_ms {
        run.per_step_timeout = Duration::from_millis(ms);
    }
    if let Some(attempts) = overrides.max_attempts {
        run.retry.max_attempts = attempts;
    }
    if let Some(ms) = overrides.backoff_ms {
        run.retry.backoff_base_ms = ms;
    }
    if let Some(policy) = overrides.failure_policy {
        run.failure_policy = policy;
    }
    if let Some(mode) = overrides.mode {
        run.mode = mode;
    }
    run
}

/// Plan and execute a goal. Returns the process exit code.
pub async fn cmd_run(config: &Config, args: RunArgs) -> Result<i32> {
    config.ensure_directories()?;

    let run_config = apply_overrides(config.run_config(), &args.overrides);
    let goal = Goal::new(args.goal).with_params(parse_params(&args.params)?);

    let orchestrator = match build_orchestrator(config, args.plan.as_deref()) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            println!("Planning failed: {}", e);
            return Ok(PLANNING_FAILED);
        }
    };

    let handle = orchestrator.spawn(goal, run_config);
    let cancel = handle.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, cancelling remaining steps...");
            cancel.cancel();
        }
    });

    let outcome = handle.join().await;
    interrupt.abort();

    let result = match outcome {
        Ok(result) => result,
        Err(OrchestratorError::Planning(e)) => {
            println!("Planning failed: {}", e);
            return Ok(PLANNING_FAILED);
        }
        Err(e) => return Err(e.into()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if config.verbose
        && let Some(tools) = orchestrator.tools()
    {
        let stats = tools.usage_stats();
        if stats.overall.total > 0 {
            eprintln!(
                "Tool calls: {} total, {} succeeded, {} failed",
                stats.overall.total, stats.overall.success, stats.overall.failure
            );
            for (name, tool) in &stats.by_tool {
                eprintln!("  {}: {}/{} succeeded", name, tool.success, tool.total);
            }
        }
    }

    Ok(result.status.exit_code())
}

fn print_result(result: &RunResult) {
    println!("Session: {}", result.session_id);
    println!();
    for step in &result.steps {
        let marker = match step.status {
            StepStatus::Succeeded => "ok",
            StepStatus::Failed => "FAILED",
            StepStatus::Skipped => "skipped",
            StepStatus::Pending | StepStatus::Running => "-",
        };
        let attempts = match step.attempts {
            0 => String::new(),
            1 => " (1 attempt)".to_string(),
            n => format!(" ({} attempts)", n),
        };
        println!("  [{}] {}{}", marker, step.step_id, attempts);
    }
    println!();

    for failure in &result.optional_failures {
        println!("Optional {}", failure);
    }
    if let Some(failure) = &result.failure {
        println!("Run failed: {}", failure);
    }

    println!("Status: {} ({} ms)", result.status, result.duration.as_millis());
    if let Some(answer) = &result.answer {
        println!();
        println!("{}", render_output(answer));
    }
}
