//! agentflow: plan a goal into steps and drive them through tools and
//! language models, recording every attempt in an append-only ledger.

pub mod capability;
pub mod config;
pub mod errors;
pub mod flow;
pub mod ledger;
pub mod observability;
pub mod orchestrator;
pub mod plan;
pub mod planner;
pub mod telemetry;
pub mod util;
