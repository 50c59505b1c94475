//! Plans: validated dependency graphs of steps.
//!
//! ## Architecture
//!
//! 1. **Step** - One unit of work with a kind tag, parameters and dependencies
//! 2. **Graph** - Index map plus forward/reverse adjacency, validated with Kahn's algorithm
//! 3. **Scheduler** - Per-step state machine and ready-set computation by flow mode
//! 4. **Spec** - Plan files loaded from JSON or TOML
//!
//! ## Example
//!
//! ```
//! use agentflow::plan::{PlanBuilder, Step, StepKind};
//!
//! let plan = PlanBuilder::linear(vec![
//!     Step::new("step-1", StepKind::Llm, "Outline"),
//!     Step::new("step-2", StepKind::Llm, "Draft"),
//! ])
//! .build()
//! .unwrap();
//!
//! assert_eq!(plan.waves(), vec![vec!["step-1"], vec!["step-2"]]);
//! ```

pub mod graph;
pub mod scheduler;
pub mod spec;
pub mod step;

pub use graph::{Plan, PlanBuilder, StepIndex};
pub use scheduler::{StepScheduler, StepStatus};
pub use spec::PlanSpec;
pub use step::{Step, StepId, StepKind};
