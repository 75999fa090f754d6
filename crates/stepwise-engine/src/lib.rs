//! Step-graph workflow engine.
//!
//! A [`Workflow`] is an ordered list of named steps. The [`RunEngine`] runs
//! them one at a time against a shared [`RunState`]; each step returns a
//! [`ControlSignal`](stepwise_core::ControlSignal) that picks the next step
//! (continue, repeat, restart, go back, jump, or stop).

pub mod context;
pub mod engine;
pub mod state;
pub mod step;
pub mod trace;
pub mod trace_log;
pub mod validator;
pub mod workflow;

pub use context::RunContext;
pub use engine::{RunEngine, RunOptions, RunOutput};
pub use state::RunState;
pub use step::{step_fn, sync_step_fn, StepDef, StepHandler, StepOutcome, StepResult};
pub use trace::RunTrace;
pub use trace_log::TraceLogger;
pub use validator::JsonSchemaValidator;
pub use workflow::{Workflow, WorkflowBuilder};
