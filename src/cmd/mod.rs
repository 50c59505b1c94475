//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `run`    | `Run`            |
//! | `plan`   | `Plan`           |
//! | `config` | `Config`         |
//! | `audit`  | `Audit`          |

pub mod audit;
pub mod config;
pub mod plan;
pub mod run;

pub use audit::cmd_audit;
pub use config::cmd_config;
pub use plan::cmd_plan;
pub use run::{RunArgs, cmd_run};

use agentflow::capability::ToolExecutor;
use agentflow::config::Config;
use agentflow::errors::PlanningError;
use agentflow::orchestrator::Orchestrator;
use agentflow::planner::StaticPlanner;
use anyhow::{Result, bail};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

/// Parse repeated `KEY=VALUE` goal parameters.
///
/// Values that parse as JSON keep their type (`n=3` is a number); anything
/// else is taken as a plain string.
pub fn parse_params(raw: &[String]) -> Result<Map<String, Value>> {
    let mut params = Map::new();
    for entry in raw {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("Invalid parameter '{}': expected KEY=VALUE", entry);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid parameter '{}': empty key", entry);
        }
        let value =
            serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        params.insert(key.to_string(), value);
    }
    Ok(params)
}

/// The orchestrator for a command: rule-based planning, or a plan file when given.
pub fn build_orchestrator(
    config: &Config,
    plan_file: Option<&Path>,
) -> Result<Orchestrator, PlanningError> {
    match plan_file {
        Some(path) => {
            let planner = StaticPlanner::from_file(path)?;
            Ok(Orchestrator::from_config_with_planner(
                config,
                Arc::new(planner),
                Arc::new(ToolExecutor::with_builtins()),
            ))
        }
        None => Ok(Orchestrator::from_config(config)),
    }
}
