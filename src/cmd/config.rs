//! Configuration view and validation commands: `agentflow config`.

use agentflow::config::{Config, FlowToml};
use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(config: &Config, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = &config.config_file;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Agentflow Configuration");
            println!("=======================");
            println!();

            if config.has_file() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No agentflow.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();

            // Effective values include AGENTFLOW_* overrides
            let toml = &config.toml;
            println!("[run]");
            println!("  max_steps = {}", toml.run.max_steps);
            println!(
                "  per_step_timeout_ms = {}",
                toml.run.per_step_timeout.as_millis()
            );
            println!("  failure_policy = \"{}\"", toml.run.failure_policy);
            println!("  mode = \"{}\"", toml.run.mode);
            println!("  retry.max_attempts = {}", toml.run.retry.max_attempts);
            println!("  retry.backoff_base_ms = {}", toml.run.retry.backoff_base_ms);
            println!();

            println!("[ledger]");
            println!("  persist = {}", toml.ledger.persist);
            println!("  dir = \"{}\"", config.ledger_dir.display());
            println!();

            println!("[events]");
            println!("  capacity = {}", toml.events.capacity);
            println!();

            println!("[logging]");
            println!("  level = \"{}\"", toml.logging.level);
            println!("  format = \"{}\"", toml.logging.format);
            if let Some(file) = &toml.logging.file {
                println!("  file = \"{}\"", file.display());
            }
            println!();

            println!("[llm]");
            println!("  model = \"{}\"", toml.llm.model);
            println!("  max_tokens = {}", toml.llm.max_tokens);
            println!("  temperature = {}", toml.llm.temperature);
            println!();

            if !toml.planner.templates.is_empty() {
                println!("[planner]");
                for template in &toml.planner.templates {
                    println!(
                        "  {} ({} tasks): {}",
                        template.name,
                        template.tasks.len(),
                        template.keywords.join(", ")
                    );
                }
                println!();
            }

            if !config.has_file() {
                println!("Run 'agentflow config init' to create an agentflow.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config.has_file() {
                println!("No agentflow.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = FlowToml::load(config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config.has_file() {
                println!("agentflow.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if let Some(parent) = config_path.parent()
                && !parent.exists()
            {
                std::fs::create_dir_all(parent)?;
            }

            FlowToml::default().save(config_path)?;

            println!("Created agentflow.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [run] max_steps, per_step_timeout_ms, failure_policy, mode");
            println!("  - [run.retry] max_attempts, backoff_base_ms");
            println!("  - [[planner.templates]] for goal-specific task lists");
            println!();
        }
    }

    Ok(())
}
