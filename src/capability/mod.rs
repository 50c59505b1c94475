//! Executor capabilities.
//!
//! A capability executes steps of one kind. The flow executor resolves a
//! step's capability through the [`CapabilityRegistry`] and never looks at
//! the concrete type behind it.
//!
//! - [`ToolExecutor`] runs named tools (`kind = "tool"`)
//! - [`LlmExecutor`] calls a language model (`kind = "llm"`)
//! - anything else is registered by the embedder under a custom kind

pub mod llm;
pub mod registry;
pub mod tool;
pub mod tools;

use crate::errors::StepError;
use crate::flow::Context;
use crate::plan::{Step, StepKind};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub use llm::{LlmClient, LlmExecutor, LlmRequest, LlmResponse, OfflineClient};
pub use registry::CapabilityRegistry;
pub use tool::{Tool, ToolError, ToolExecutor, ToolSpec, ToolType, UsageStats};

/// Uniform interface over tools, language models and custom executors.
#[async_trait]
pub trait Capability: Send + Sync {
    /// The step kind this capability handles.
    fn kind(&self) -> StepKind;

    /// Check a step before any execution starts.
    ///
    /// Errors are reported as planning failures, so nothing in the plan runs.
    fn validate(&self, _step: &Step) -> Result<(), String> {
        Ok(())
    }

    /// Execute one attempt of a step.
    ///
    /// `context` holds the accepted outputs of earlier steps in the same
    /// session. `timeout` is advisory; the flow executor enforces it regardless.
    async fn execute(
        &self,
        step: &Step,
        context: &Context,
        timeout: Duration,
    ) -> Result<Value, StepError>;
}
