use agentflow::config::{Config, FailurePolicy, FlowMode, LogFormat};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "agentflow")]
#[command(version, about = "Agentic workflow orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Path to the config file (defaults to .agentflow/agentflow.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output format: pretty, json. Overrides agentflow.toml setting.
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Per-run overrides of the `[run]` configuration.
#[derive(clap::Args, Clone, Debug, Default)]
pub struct RunOverrides {
    /// Maximum number of steps a plan may have
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Per-step timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Attempts per step, including the first
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Base retry backoff in milliseconds
    #[arg(long)]
    pub backoff_ms: Option<u64>,

    /// Failure policy: abort, skip_optional
    #[arg(long)]
    pub failure_policy: Option<FailurePolicy>,

    /// Flow mode: linear, dag
    #[arg(long)]
    pub mode: Option<FlowMode>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plan a goal and execute it
    Run {
        /// What to accomplish
        goal: String,

        /// Goal parameter passed to every step (repeatable, KEY=VALUE)
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Execute a plan file (JSON or TOML) instead of the rule-based planner
        #[arg(long)]
        plan: Option<PathBuf>,

        #[command(flatten)]
        overrides: RunOverrides,

        /// Print the full run result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the plan for a goal without executing it
    Plan {
        goal: String,

        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        #[arg(long)]
        plan: Option<PathBuf>,

        /// Flow mode: linear, dag
        #[arg(long)]
        mode: Option<FlowMode>,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Inspect persisted session ledgers
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default agentflow.toml file
    Init,
}

#[derive(Subcommand, Clone)]
pub enum AuditCommands {
    /// List persisted sessions, newest first
    List,
    /// Show every record of a session
    Show {
        session: String,
        /// Only records whose step id contains this text
        #[arg(long)]
        step: Option<String>,
        /// Only the last N records
        #[arg(long)]
        last: Option<usize>,
    },
    /// Show attempt counts for a session
    Summary { session: String },
    /// Export a session's records to a JSON file
    Export { session: String, output: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = Config::load(project_dir, cli.config.clone(), cli.verbose)?;
    let guard = agentflow::telemetry::init(&config.toml.logging, cli.verbose, cli.log_format);

    let code = match &cli.command {
        Commands::Run {
            goal,
            params,
            plan,
            overrides,
            json,
        } => {
            let args = cmd::RunArgs {
                goal: goal.clone(),
                params: params.clone(),
                plan: plan.clone(),
                overrides: overrides.clone(),
                json: *json,
            };
            cmd::cmd_run(&config, args).await?
        }
        Commands::Plan {
            goal,
            params,
            plan,
            mode,
            json,
        } => {
            cmd::cmd_plan(&config, goal, params, plan.as_deref(), *mode, *json).await?
        }
        Commands::Config { command } => {
            cmd::cmd_config(&config, command.clone())?;
            0
        }
        Commands::Audit { command } => {
            cmd::cmd_audit(&config, command).await?;
            0
        }
    };

    drop(guard);
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
