//! Step definitions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of a step, unique within a plan.
pub type StepId = String;

/// Kind tag used to resolve the executor capability for a step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepKind {
    Tool,
    Llm,
    Custom(String),
}

impl StepKind {
    pub fn custom(name: impl Into<String>) -> Self {
        StepKind::from(name.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            StepKind::Tool => "tool",
            StepKind::Llm => "llm",
            StepKind::Custom(name) => name,
        }
    }
}

impl From<String> for StepKind {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "tool" => StepKind::Tool,
            "llm" => StepKind::Llm,
            _ => StepKind::Custom(value),
        }
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub kind: StepKind,
    /// Human-readable summary of the work
    #[serde(default)]
    pub description: String,
    /// Executor-specific parameters
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Steps that must succeed before this one is ready
    #[serde(default)]
    pub depends_on: Vec<StepId>,
    /// Whether the run may continue without this step under `skip_optional`
    #[serde(default)]
    pub optional: bool,
}

impl Step {
    pub fn new(id: impl Into<StepId>, kind: StepKind, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            description: description.into(),
            params: Map::new(),
            depends_on: Vec::new(),
            optional: false,
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

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StepId>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Look up a string parameter.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}
