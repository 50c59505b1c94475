//! Plan files: hand-written plans loaded from JSON or TOML.
//!
//! ```toml
//! mode = "dag"
//!
//! [[steps]]
//! id = "greet"
//! kind = "tool"
//! params = { tool = "echo", input = "hello" }
//!
//! [[steps]]
//! id = "count"
//! kind = "tool"
//! params = { tool = "word_count", input = "hello plan files" }
//! depends_on = ["greet"]
//! ```

use crate::config::FlowMode;
use crate::errors::PlanningError;
use crate::plan::graph::{Plan, PlanBuilder};
use crate::plan::step::Step;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Serializable plan document: the input format for plan files and the
/// output format for `agentflow plan --json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<FlowMode>,
    pub steps: Vec<Step>,
}

impl PlanSpec {
    /// Load a plan file; `.toml` files are parsed as TOML, anything else as JSON.
    pub fn load(path: &Path) -> Result<Self, PlanningError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PlanningError::PlanFile(format!("{}: {}", path.display(), e)))?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let parsed = if is_toml {
            Self::parse_toml(&content)
        } else {
            Self::parse_json(&content)
        };
        parsed.map_err(|e| match e {
            PlanningError::PlanFile(msg) => {
                PlanningError::PlanFile(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn parse_json(content: &str) -> Result<Self, PlanningError> {
        serde_json::from_str(content).map_err(|e| PlanningError::PlanFile(e.to_string()))
    }

    pub fn parse_toml(content: &str) -> Result<Self, PlanningError> {
        toml::from_str(content).map_err(|e| PlanningError::PlanFile(e.to_string()))
    }

    /// Validate into a plan. The file's own `mode` wins over `fallback`.
    pub fn build(self, fallback: FlowMode) -> Result<Plan, PlanningError> {
        let mode = self.mode.unwrap_or(fallback);
        PlanBuilder::for_mode(mode, self.steps).build()
    }
}
