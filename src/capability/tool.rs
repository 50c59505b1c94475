//! Tool executor: named tools behind the `tool` step kind.
//!
//! A tool step names its tool in the `tool` parameter. The executor checks the
//! tool's required parameters, calls it, and keeps running per-tool counters
//! plus a bounded log of recent calls.

use crate::capability::Capability;
use crate::errors::StepError;
use crate::flow::Context;
use crate::plan::{Step, StepKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Category of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    Web,
    File,
    Data,
    Calculation,
    Communication,
    System,
    Text,
}

impl ToolType {
    /// Phrases that suggest a task needs a tool of this category.
    fn action_patterns(&self) -> &'static [&'static str] {
        match self {
            ToolType::Web => &["fetch", "download", "scrape", "get url", "http", "api call"],
            ToolType::File => &["read file", "write file", "save to", "load from", "open file"],
            ToolType::Data => &["parse", "transform", "filter", "aggregate", "sort"],
            ToolType::Calculation => &["calculate", "compute", "average"],
            ToolType::Communication => &["send email", "notify", "alert"],
            ToolType::System => &["run command", "shell"],
            ToolType::Text => &["repeat back", "word count"],
        }
    }
}

impl std::fmt::Display for ToolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ToolType::Web => "web",
            ToolType::File => "file",
            ToolType::Data => "data",
            ToolType::Calculation => "calculation",
            ToolType::Communication => "communication",
            ToolType::System => "system",
            ToolType::Text => "text",
        };
        f.write_str(name)
    }
}

/// Static description of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub tool_type: ToolType,
    pub description: String,
    /// Keywords that route a task to this tool
    pub keywords: Vec<String>,
    pub required_params: Vec<String>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, tool_type: ToolType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tool_type,
            description: description.into(),
            keywords: Vec::new(),
            required_params: Vec::new(),
        }
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_required(mut self, params: &[&str]) -> Self {
        self.required_params = params.iter().map(|p| p.to_string()).collect();
        self
    }
}

/// Failure reported by a tool handler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    /// The parameters cannot be processed; retrying will not help
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Failed(String),
}

impl From<ToolError> for StepError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::InvalidInput(msg) => StepError::Validation(msg),
            ToolError::Failed(msg) => StepError::Executor(msg),
        }
    }
}

/// A named tool callable from a `tool` step.
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> &ToolSpec;

    async fn call(&self, params: &Map<String, Value>) -> Result<Value, ToolError>;
}

/// One entry in the tool usage log.
#[derive(Debug, Clone, Serialize)]
pub struct ToolUsage {
    pub tool: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// Success and failure counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ToolStats {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
}

impl ToolStats {
    fn record(&mut self, success: bool) {
        self.total += 1;
        if success {
            self.success += 1;
        } else {
            self.failure += 1;
        }
    }
}

/// Aggregated usage across all tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    #[serde(flatten)]
    pub overall: ToolStats,
    pub by_tool: BTreeMap<String, ToolStats>,
}

/// Number of recent calls kept in the usage log.
pub const USAGE_LOG_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct Usage {
    stats: UsageStats,
    recent: VecDeque<ToolUsage>,
}

impl Usage {
    fn record(&mut self, entry: ToolUsage) {
        self.stats.overall.record(entry.success);
        self.stats
            .by_tool
            .entry(entry.tool.clone())
            .or_default()
            .record(entry.success);
        if self.recent.len() == USAGE_LOG_CAPACITY {
            self.recent.pop_front();
        }
        self.recent.push_back(entry);
    }
}

/// Capability for `tool` steps.
pub struct ToolExecutor {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    usage: Mutex<Usage>,
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolExecutor {
    /// An executor with no tools.
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            usage: Mutex::new(Usage::default()),
        }
    }

    /// An executor with the demonstration tools `echo`, `word_count` and `calculator`.
    pub fn with_builtins() -> Self {
        Self::new()
            .register(Arc::new(super::tools::Echo::new()))
            .register(Arc::new(super::tools::WordCount::new()))
            .register(Arc::new(super::tools::Calculator::new()))
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.insert(tool.spec().name.clone(), tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Registered tool specs, optionally filtered by category.
    pub fn list_tools(&self, tool_type: Option<ToolType>) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|t| t.spec())
            .filter(|spec| tool_type.is_none_or(|ty| spec.tool_type == ty))
            .cloned()
            .collect()
    }

    /// Pick the tool a task description calls for, if any.
    ///
    /// Tool keywords are checked first, then the action phrases of each tool's
    /// category. Phrases must match whole words.
    pub fn select_tool(&self, task: &str) -> Option<&ToolSpec> {
        let task = task.to_lowercase();
        let specs = || self.tools.values().map(|t| t.spec());

        specs()
            .find(|spec| {
                spec.keywords
                    .iter()
                    .any(|k| contains_phrase(&task, &k.to_lowercase()))
            })
            .or_else(|| {
                specs().find(|spec| {
                    spec.tool_type
                        .action_patterns()
                        .iter()
                        .any(|p| contains_phrase(&task, p))
                })
            })
    }

    /// Call a tool directly, recording the outcome in the usage log.
    pub async fn execute_tool(
        &self,
        name: &str,
        params: &Map<String, Value>,
    ) -> Result<Value, StepError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| StepError::Validation(format!("Tool '{}' not found", name)))?;

        let missing: Vec<&str> = tool
            .spec()
            .required_params
            .iter()
            .filter(|p| !params.contains_key(p.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(StepError::Validation(format!(
                "Missing required parameters for '{}': {}",
                name,
                missing.join(", ")
            )));
        }

        let result = tool.call(params).await;
        self.log_usage(name, result.as_ref().err());
        result.map_err(StepError::from)
    }

    fn log_usage(&self, tool: &str, error: Option<&ToolError>) {
        if let Some(err) = error {
            warn!(tool, error = %err, "Tool call failed");
        } else {
            debug!(tool, "Tool call succeeded");
        }
        let entry = ToolUsage {
            tool: tool.to_string(),
            success: error.is_none(),
            error: error.map(ToString::to_string),
            at: Utc::now(),
        };
        self.usage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .record(entry);
    }

    /// The most recent tool calls, oldest first.
    pub fn usage_log(&self) -> Vec<ToolUsage> {
        self.usage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .recent
            .iter()
            .cloned()
            .collect()
    }

    /// Counts over every call since the executor was created.
    pub fn usage_stats(&self) -> UsageStats {
        self.usage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .stats
            .clone()
    }
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    haystack.match_indices(phrase).any(|(start, _)| {
        let end = start + phrase.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[async_trait]
impl Capability for ToolExecutor {
    fn kind(&self) -> StepKind {
        StepKind::Tool
    }

    fn validate(&self, step: &Step) -> Result<(), String> {
        let name = step
            .param_str("tool")
            .ok_or_else(|| "tool step is missing the 'tool' parameter".to_string())?;
        if !self.tools.contains_key(name) {
            let known: Vec<&str> = self.tools.keys().map(String::as_str).collect();
            return Err(format!(
                "unknown tool '{}' (available: {})",
                name,
                known.join(", ")
            ));
        }
        Ok(())
    }

    async fn execute(
        &self,
        step: &Step,
        _context: &Context,
        _timeout: Duration,
    ) -> Result<Value, StepError> {
        let name = step
            .param_str("tool")
            .ok_or_else(|| StepError::Validation("missing 'tool' parameter".to_string()))?;
        self.execute_tool(name, &step.params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_select_tool_by_keyword() {
        let executor = ToolExecutor::with_builtins();
        let spec = executor.select_tool("Calculate the sum of 10 and 20").unwrap();
        assert_eq!(spec.name, "calculator");
        let spec = executor.select_tool("Echo this back to me").unwrap();
        assert_eq!(spec.name, "echo");
    }

    #[test]
    fn test_select_tool_requires_whole_words() {
        let executor = ToolExecutor::with_builtins();
        assert!(executor.select_tool("Summarize findings: research").is_none());
        assert!(executor.select_tool("Gather information: echoes of history").is_none());
    }

    #[test]
    fn test_list_tools_filters_by_type() {
        let executor = ToolExecutor::with_builtins();
        assert_eq!(executor.list_tools(None).len(), 3);
        let calc = executor.list_tools(Some(ToolType::Calculation));
        assert_eq!(calc.len(), 1);
        assert_eq!(calc[0].name, "calculator");
    }

    #[test]
    fn test_validate_requires_known_tool() {
        let executor = ToolExecutor::with_builtins();
        let ok = Step::new("s", StepKind::Tool, "t").with_param("tool", "echo");
        assert!(executor.validate(&ok).is_ok());

        let missing = Step::new("s", StepKind::Tool, "t");
        assert!(executor.validate(&missing).unwrap_err().contains("'tool'"));

        let unknown = Step::new("s", StepKind::Tool, "t").with_param("tool", "teleport");
        assert!(executor.validate(&unknown).unwrap_err().contains("teleport"));
    }

    #[tokio::test]
    async fn test_missing_required_params_is_validation_error() {
        let executor = ToolExecutor::with_builtins();
        let err = executor
            .execute_tool("calculator", &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Validation(ref m) if m.contains("expression")));
        // Rejected before the handler ran
        assert_eq!(executor.usage_stats().overall.total, 0);
    }

    #[tokio::test]
    async fn test_usage_stats_track_success_and_failure() {
        let executor = ToolExecutor::with_builtins();
        executor
            .execute_tool("echo", &params(json!({"input": "hi"})))
            .await
            .unwrap();
        executor
            .execute_tool("calculator", &params(json!({"expression": "1 / 0"})))
            .await
            .unwrap_err();
        executor
            .execute_tool("calculator", &params(json!({"expression": "2 * 4"})))
            .await
            .unwrap();

        let stats = executor.usage_stats();
        assert_eq!(stats.overall.total, 3);
        assert_eq!(stats.overall.success, 2);
        assert_eq!(stats.overall.failure, 1);
        assert_eq!(stats.by_tool["calculator"].failure, 1);
        assert_eq!(stats.by_tool["echo"].success, 1);
        assert_eq!(executor.usage_log().len(), 3);
    }

    #[tokio::test]
    async fn test_usage_log_is_bounded_but_stats_keep_counting() {
        let executor = ToolExecutor::with_builtins();
        let calls = USAGE_LOG_CAPACITY + 10;
        for i in 0..calls {
            executor
                .execute_tool("echo", &params(json!({"input": format!("call {}", i)})))
                .await
                .unwrap();
        }

        let log = executor.usage_log();
        assert_eq!(log.len(), USAGE_LOG_CAPACITY);
        assert!(log.iter().all(|entry| entry.tool == "echo" && entry.success));
        assert_eq!(executor.usage_stats().overall.total, calls);
        assert_eq!(executor.usage_stats().by_tool["echo"].success, calls);
    }

    #[tokio::test]
    async fn test_execute_as_capability() {
        let executor = ToolExecutor::with_builtins();
        let step = Step::new("s", StepKind::Tool, "count")
            .with_param("tool", "word_count")
            .with_param("input", "one two three");
        let output = executor
            .execute(&step, &Context::new(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(output["words"], 3);
    }
}
