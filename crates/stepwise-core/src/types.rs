use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of one workflow run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Textual tokens for the built-in signals.
pub const NEXT: &str = "__next";
pub const PREV: &str = "__prev";
pub const SELF: &str = "__self";
pub const START: &str = "__start";
pub const END: &str = "__end";

/// Names that can never be used as step names.
pub const RESERVED_STEP_NAMES: [&str; 5] = [NEXT, PREV, SELF, START, END];

/// What a step asks the engine to do after it finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "step", rename_all = "snake_case")]
pub enum ControlSignal {
    /// Continue with the step declared after the current one.
    #[default]
    Next,
    /// Run the current step again.
    Repeat,
    /// Restart from the start step.
    Start,
    /// Go back to the step declared before the current one.
    Prev,
    /// Stop the run.
    End,
    /// Jump to the named step.
    Goto(String),
}

impl ControlSignal {
    pub fn goto(step: impl Into<String>) -> Self {
        Self::Goto(step.into())
    }
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Next => f.write_str(NEXT),
            Self::Repeat => f.write_str(SELF),
            Self::Start => f.write_str(START),
            Self::Prev => f.write_str(PREV),
            Self::End => f.write_str(END),
            Self::Goto(step) => f.write_str(step),
        }
    }
}

impl FromStr for ControlSignal {
    type Err = std::convert::Infallible;

    /// Reserved tokens map to their signal; anything else is a jump target.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            NEXT => Self::Next,
            SELF => Self::Repeat,
            START => Self::Start,
            PREV => Self::Prev,
            END => Self::End,
            other => Self::Goto(other.to_string()),
        })
    }
}

impl From<&str> for ControlSignal {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(signal) => signal,
            Err(never) => match never {},
        }
    }
}

/// Workflow event broadcast to all subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A run began.
    RunStarted {
        run_id: RunId,
        workflow: String,
        start_step: String,
    },
    /// A step is about to run.
    StepStarted {
        run_id: RunId,
        step: String,
        iteration: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<serde_json::Value>,
    },
    /// A step finished and produced a signal.
    StepSucceeded {
        run_id: RunId,
        step: String,
        iteration: usize,
        signal: ControlSignal,
        elapsed_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<serde_json::Value>,
    },
    /// A step handler failed.
    StepFailed {
        run_id: RunId,
        step: String,
        iteration: usize,
        error: String,
    },
    /// Event published by a step handler.
    Custom {
        run_id: RunId,
        step: String,
        name: String,
        payload: serde_json::Value,
    },
    /// A run finished successfully.
    RunCompleted {
        run_id: RunId,
        steps_executed: usize,
        elapsed_ms: u64,
    },
    /// A run failed.
    RunFailed { run_id: RunId, error: String },
}

impl WorkflowEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::StepStarted { run_id, .. }
            | Self::StepSucceeded { run_id, .. }
            | Self::StepFailed { run_id, .. }
            | Self::Custom { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunFailed { run_id, .. } => run_id,
        }
    }

    /// Short snake_case name, e.g. `step_started`.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::StepStarted { .. } => "step_started",
            Self::StepSucceeded { .. } => "step_succeeded",
            Self::StepFailed { .. } => "step_failed",
            Self::Custom { .. } => "custom",
            Self::RunCompleted { .. } => "run_completed",
            Self::RunFailed { .. } => "run_failed",
        }
    }

    /// True for the final event of a run.
    pub fn is_run_end(&self) -> bool {
        matches!(self, Self::RunCompleted { .. } | Self::RunFailed { .. })
    }
}

/// One executed step, as recorded in a run trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: String,
    pub iteration: usize,
    pub signal: ControlSignal,
    pub timestamp: DateTime<Utc>,
    pub elapsed_ms: u64,
}
