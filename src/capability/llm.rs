//! Language-model executor and client contract.
//!
//! [`LlmExecutor`] turns an `llm` step into an [`LlmRequest`]: the outputs of
//! the step's dependencies become context messages, followed by the step's
//! prompt. The request goes to an [`LlmClient`]; [`OfflineClient`] answers
//! locally so flows run without network access.

use crate::capability::Capability;
use crate::config::LlmSection;
use crate::errors::StepError;
use crate::flow::Context;
use crate::plan::{Step, StepKind};
use crate::util::render_output;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub tokens_used: u32,
    pub finish_reason: String,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LlmError {
    /// The request itself is unusable
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("rate limited: {0}")]
    RateLimited(String),
}

impl From<LlmError> for StepError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::InvalidRequest(msg) => StepError::Validation(msg),
            other => StepError::Executor(other.to_string()),
        }
    }
}

/// A language-model backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> &str;

    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}

/// Deterministic local client.
///
/// Answers with the last user message and a note on how many earlier results
/// it was given, so flows can be exercised end to end offline.
#[derive(Debug, Clone, Default)]
pub struct OfflineClient;

#[async_trait]
impl LlmClient for OfflineClient {
    fn provider(&self) -> &str {
        "offline"
    }

    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = Instant::now();
        let prompt = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .ok_or_else(|| LlmError::InvalidRequest("no user message".to_string()))?;

        let earlier = request
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .count()
            .saturating_sub(1);
        let content = match earlier {
            0 => prompt,
            1 => format!("{} (building on 1 earlier result)", prompt),
            n => format!("{} (building on {} earlier results)", prompt, n),
        };

        let words = content.split_whitespace().count() as u32;
        let (content, finish_reason) = if words > request.max_tokens {
            let cut: Vec<&str> = content
                .split_whitespace()
                .take(request.max_tokens as usize)
                .collect();
            (cut.join(" "), "length")
        } else {
            (content, "stop")
        };

        Ok(LlmResponse {
            tokens_used: words.min(request.max_tokens),
            content,
            provider: self.provider().to_string(),
            model: request.model,
            finish_reason: finish_reason.to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
            metadata: Map::new(),
        })
    }
}

const SYSTEM_PROMPT: &str = "You are one step in a multi-step workflow. \
Complete the task using the results of earlier steps where relevant.";

/// Capability for `llm` steps.
pub struct LlmExecutor {
    client: Arc<dyn LlmClient>,
    settings: LlmSection,
}

impl LlmExecutor {
    pub fn new(client: Arc<dyn LlmClient>, settings: LlmSection) -> Self {
        Self { client, settings }
    }

    /// Executor backed by [`OfflineClient`].
    pub fn offline(settings: LlmSection) -> Self {
        Self::new(Arc::new(OfflineClient), settings)
    }

    fn prompt_for<'a>(step: &'a Step) -> Option<&'a str> {
        step.param_str("prompt")
            .or(Some(step.description.as_str()))
            .filter(|p| !p.trim().is_empty())
    }

    /// Build the request for a step from its prompt and its dependencies' outputs.
    pub fn build_request(&self, step: &Step, context: &Context) -> Result<LlmRequest, StepError> {
        let prompt = Self::prompt_for(step)
            .ok_or_else(|| StepError::Validation("llm step has no prompt".to_string()))?;

        let mut messages = vec![Message::system(SYSTEM_PROMPT)];
        for dep in &step.depends_on {
            if let Some(output) = context.get(dep) {
                messages.push(Message::user(format!(
                    "Result of {}: {}",
                    dep,
                    render_output(output)
                )));
            }
        }
        messages.push(Message::user(prompt));

        let max_tokens = step
            .params
            .get("max_tokens")
            .and_then(Value::as_u64)
            .map_or(self.settings.max_tokens, |v| v as u32);
        let temperature = step
            .params
            .get("temperature")
            .and_then(Value::as_f64)
            .map_or(self.settings.temperature, |v| v as f32);

        Ok(LlmRequest {
            messages,
            model: self.settings.model.clone(),
            max_tokens,
            temperature,
        })
    }
}

#[async_trait]
impl Capability for LlmExecutor {
    fn kind(&self) -> StepKind {
        StepKind::Llm
    }

    fn validate(&self, step: &Step) -> Result<(), String> {
        if Self::prompt_for(step).is_none() {
            return Err("llm step needs a 'prompt' parameter or a description".to_string());
        }
        Ok(())
    }

    async fn execute(
        &self,
        step: &Step,
        context: &Context,
        _timeout: Duration,
    ) -> Result<Value, StepError> {
        let request = self.build_request(step, context)?;
        debug!(
            step_id = %step.id,
            provider = self.client.provider(),
            messages = request.messages.len(),
            "Sending completion request"
        );
        let response = self.client.complete(request).await?;
        serde_json::to_value(&response)
            .map_err(|e| StepError::Executor(format!("failed to encode response: {}", e)))
    }
}
