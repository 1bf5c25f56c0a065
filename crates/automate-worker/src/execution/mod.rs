//! Execution of a single workflow run.
//!
//! [`RunState`] holds the pure transition rules of a run; [`Execution`] drives
//! them against a step executor and the run state store.

mod run;
mod state;

pub use run::{Execution, RunOutcome};
pub use state::{Attempt, RetryPolicy, RunState, Transition};
