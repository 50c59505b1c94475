//! Flow execution: sessions, the executor loop and run results.
//!
//! A [`Session`] carries the goal, its [`RunConfig`](crate::config::RunConfig),
//! the accumulated [`Context`] and a cancellation token. The [`FlowExecutor`]
//! takes ownership of a session for the duration of one run and hands the
//! context back inside the [`RunResult`].

pub mod executor;
pub mod session;
pub mod state;

pub use executor::FlowExecutor;
pub use session::{Context, Session, SessionId};
pub use state::{ExecutionTimer, FatalFailure, RunResult, RunStatus, StepOutcome};
