//! Decomposition templates.

use crate::config::TemplateConfig;

/// A named task list selected by goal keywords.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub name: String,
    pub keywords: Vec<String>,
    pub tasks: Vec<String>,
}

impl Template {
    pub fn new(name: &str, keywords: &[&str], tasks: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            tasks: tasks.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Whether any keyword occurs in the (lowercased) goal.
    pub fn matches(&self, goal_lower: &str) -> bool {
        self.keywords.iter().any(|k| goal_lower.contains(k.as_str()))
    }
}

impl From<&TemplateConfig> for Template {
    fn from(config: &TemplateConfig) -> Self {
        Self {
            name: config.name.clone(),
            keywords: config.keywords.iter().map(|k| k.to_lowercase()).collect(),
            tasks: config.tasks.clone(),
        }
    }
}

/// Keyword templates checked in order after any custom ones.
pub fn builtin() -> Vec<Template> {
    vec![
        Template::new(
            "research",
            &["research", "investigate", "study"],
            &["Gather information", "Review sources", "Summarize findings"],
        ),
        Template::new(
            "project",
            &["build", "create", "develop", "project"],
            &["Define requirements", "Plan approach", "Execute", "Review"],
        ),
        Template::new(
            "learning",
            &["learn", "understand", "master"],
            &["Identify topics", "Study materials", "Practice", "Test knowledge"],
        ),
    ]
}

/// Used when no keyword template matches.
pub fn fallback() -> Template {
    Template::new(
        "default",
        &[],
        &["Analyze goal", "Break into steps", "Prioritize", "Execute"],
    )
}
