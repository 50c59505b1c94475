//! Unified configuration for agentflow.
//!
//! Settings are read from `.agentflow/agentflow.toml` and layered
//! file → environment → CLI. A missing file yields the defaults.
//!
//! # Configuration File Format
//!
//! ```toml
//! [run]
//! max_steps = 20
//! per_step_timeout_ms = 30000
//! failure_policy = "abort"        # or "skip_optional"
//! mode = "linear"                 # or "dag"
//!
//! [run.retry]
//! max_attempts = 3
//! backoff_base_ms = 200
//!
//! [ledger]
//! persist = true
//! dir = ".agentflow/ledger"
//!
//! [events]
//! capacity = 1024
//!
//! [logging]
//! level = "info"
//! format = "pretty"               # or "json"
//! file = ".agentflow/logs/agentflow.log"
//!
//! [llm]
//! model = "offline"
//! max_tokens = 512
//! temperature = 0.7
//!
//! [[planner.templates]]
//! name = "writing"
//! keywords = ["write", "blog"]
//! tasks = ["Outline", "Draft", "Edit", "Publish"]
//! ```

use crate::util::duration_ms;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the per-project state directory.
pub const FLOW_DIR: &str = ".agentflow";
/// Name of the configuration file inside [`FLOW_DIR`].
pub const CONFIG_FILE: &str = "agentflow.toml";

/// What to do when a step fails fatally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Skip every step that has not started and fail the run
    #[default]
    Abort,
    /// Tolerate failures of steps marked `optional`; abort on any other
    SkipOptional,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::Abort => write!(f, "abort"),
            FailurePolicy::SkipOptional => write!(f, "skip_optional"),
        }
    }
}

impl std::str::FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "skip_optional" | "skipoptional" => Ok(FailurePolicy::SkipOptional),
            _ => anyhow::bail!(
                "Invalid failure policy '{}'. Valid values: abort, skip-optional",
                s
            ),
        }
    }
}

/// How the next set of runnable steps is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowMode {
    /// Steps form a chain; exactly one step runs at a time in plan order
    #[default]
    Linear,
    /// Steps declare explicit dependencies; every ready step is eligible
    Dag,
}

impl std::fmt::Display for FlowMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowMode::Linear => write!(f, "linear"),
            FlowMode::Dag => write!(f, "dag"),
        }
    }
}

impl std::str::FromStr for FlowMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(FlowMode::Linear),
            "dag" => Ok(FlowMode::Dag),
            _ => anyhow::bail!("Invalid flow mode '{}'. Valid values: linear, dag", s),
        }
    }
}

/// Retry behaviour for retryable step failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per step, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `backoff_base_ms * 2^(n-1)` before the next one
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    200
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u64 << exponent;
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }

    /// Attempts actually made; a configured zero still runs the step once.
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Per-run options recognised by the planner and the flow executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Cap on the number of steps in a plan
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Wall-clock limit for a single step attempt
    #[serde(
        rename = "per_step_timeout_ms",
        with = "duration_ms",
        default = "default_per_step_timeout"
    )]
    pub per_step_timeout: Duration,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub mode: FlowMode,
}

fn default_max_steps() -> usize {
    20
}

fn default_per_step_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            per_step_timeout: default_per_step_timeout(),
            retry: RetryPolicy::default(),
            failure_policy: FailurePolicy::default(),
            mode: FlowMode::default(),
        }
    }
}

impl RunConfig {
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_step_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff_base_ms: u64) -> Self {
        self.retry = RetryPolicy {
            max_attempts,
            backoff_base_ms,
        };
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_mode(mut self, mode: FlowMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Execution ledger persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSection {
    /// Write every record to a JSONL file per session
    #[serde(default = "default_persist")]
    pub persist: bool,
    /// Directory for session ledgers (default: `.agentflow/ledger`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_persist() -> bool {
    true
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            persist: default_persist(),
            dir: None,
        }
    }
}

/// Observability hub settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsSection {
    /// Buffered events per subscriber before the oldest are dropped
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Optional file that receives JSON log lines in addition to stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

/// Language-model executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_model() -> String {
    "offline".to_string()
}

fn default_max_tokens() -> u32 {
    512
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// A user-defined decomposition template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub name: String,
    /// Goal keywords that select this template
    #[serde(default)]
    pub keywords: Vec<String>,
    pub tasks: Vec<String>,
}

/// Planner settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlannerSection {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<TemplateConfig>,
}

/// The complete agentflow.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowToml {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub ledger: LedgerSection,
    #[serde(default)]
    pub events: EventsSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub planner: PlannerSection,
}

impl FlowToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse agentflow.toml")
    }

    /// Load from `<flow_dir>/agentflow.toml`, or defaults if it does not exist.
    pub fn load_or_default(flow_dir: &Path) -> Result<Self> {
        let config_path = flow_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize agentflow.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `AGENTFLOW_*` overrides read through `lookup`.
    ///
    /// Taking the lookup as a function keeps this testable without touching the
    /// process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("AGENTFLOW_MAX_STEPS") {
            self.run.max_steps = v
                .parse()
                .with_context(|| format!("Invalid AGENTFLOW_MAX_STEPS '{}'", v))?;
        }
        if let Some(v) = lookup("AGENTFLOW_STEP_TIMEOUT_MS") {
            let ms: u64 = v
                .parse()
                .with_context(|| format!("Invalid AGENTFLOW_STEP_TIMEOUT_MS '{}'", v))?;
            self.run.per_step_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = lookup("AGENTFLOW_MAX_ATTEMPTS") {
            self.run.retry.max_attempts = v
                .parse()
                .with_context(|| format!("Invalid AGENTFLOW_MAX_ATTEMPTS '{}'", v))?;
        }
        if let Some(v) = lookup("AGENTFLOW_BACKOFF_MS") {
            self.run.retry.backoff_base_ms = v
                .parse()
                .with_context(|| format!("Invalid AGENTFLOW_BACKOFF_MS '{}'", v))?;
        }
        if let Some(v) = lookup("AGENTFLOW_FAILURE_POLICY") {
            self.run.failure_policy = v.parse()?;
        }
        if let Some(v) = lookup("AGENTFLOW_LOG") {
            self.logging.level = v;
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.run.max_steps == 0 {
            warnings.push("run.max_steps is 0: every plan will be rejected".to_string());
        }
        if self.run.per_step_timeout.is_zero() {
            warnings.push("run.per_step_timeout_ms is 0: every step will time out".to_string());
        }
        if self.run.retry.max_attempts == 0 {
            warnings.push(
                "run.retry.max_attempts is 0: steps will still run once".to_string(),
            );
        }
        if self.events.capacity == 0 {
            warnings.push("events.capacity is 0: a capacity of 1 will be used".to_string());
        }
        if !is_valid_log_level(&self.logging.level) {
            warnings.push(format!(
                "Invalid logging.level '{}': expected trace, debug, info, warn or error",
                self.logging.level
            ));
        }
        for template in &self.planner.templates {
            if template.tasks.is_empty() {
                warnings.push(format!(
                    "Planner template '{}' has no tasks and will never produce a plan",
                    template.name
                ));
            }
        }

        warnings
    }
}

fn is_valid_log_level(level: &str) -> bool {
    matches!(
        level.to_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error" | "off"
    )
}

/// Runtime configuration for agentflow.
///
/// Bridges the parsed [`FlowToml`] with the resolved paths the CLI and the
/// orchestrator need.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub flow_dir: PathBuf,
    pub config_file: PathBuf,
    pub ledger_dir: PathBuf,
    pub verbose: bool,
    pub toml: FlowToml,
}

impl Config {
    /// Resolve paths under `project_dir` and load the layered configuration.
    ///
    /// `config_file` overrides the default `.agentflow/agentflow.toml` location.
    pub fn load(project_dir: PathBuf, config_file: Option<PathBuf>, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let flow_dir = project_dir.join(FLOW_DIR);

        let (config_file, mut toml) = match config_file {
            Some(path) => {
                let toml = FlowToml::load(&path)?;
                (path, toml)
            }
            None => (
                flow_dir.join(CONFIG_FILE),
                FlowToml::load_or_default(&flow_dir)?,
            ),
        };
        toml.apply_env(|key| std::env::var(key).ok())?;

        let ledger_dir = match toml.ledger.dir {
            Some(ref dir) if dir.is_absolute() => dir.clone(),
            Some(ref dir) => project_dir.join(dir),
            None => flow_dir.join("ledger"),
        };

        Ok(Self {
            project_dir,
            flow_dir,
            config_file,
            ledger_dir,
            verbose,
            toml,
        })
    }

    /// Whether a configuration file exists on disk.
    pub fn has_file(&self) -> bool {
        self.config_file.exists()
    }

    pub fn run_config(&self) -> RunConfig {
        self.toml.run.clone()
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.flow_dir).context("Failed to create .agentflow directory")?;
        if self.toml.ledger.persist {
            std::fs::create_dir_all(&self.ledger_dir)
                .context("Failed to create ledger directory")?;
        }
        Ok(())
    }
}
