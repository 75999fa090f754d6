use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use stepwise_core::error::BoxError;
use stepwise_core::types::ControlSignal;

use crate::context::RunContext;
use crate::state::RunState;

/// What a step handler returns on success.
pub type StepResult = std::result::Result<StepOutcome, BoxError>;

/// One unit of work in a workflow.
///
/// Handlers get exclusive access to the run state for the duration of the
/// call. Synchronous handlers can be adapted with [`sync_step_fn`].
pub trait StepHandler: Send + Sync + 'static {
    fn call<'a>(&'a self, state: &'a mut RunState, ctx: &'a RunContext)
        -> BoxFuture<'a, StepResult>;
}

/// Result of a successful step: an optional signal plus an optional partial
/// state update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    /// `None` means "continue with the next step".
    pub signal: Option<ControlSignal>,
    /// JSON object merged into the run state.
    pub output: Option<Value>,
}

impl StepOutcome {
    /// Continue with the next step.
    pub fn next() -> Self {
        Self::default()
    }

    pub fn signal(signal: ControlSignal) -> Self {
        Self {
            signal: Some(signal),
            output: None,
        }
    }

    pub fn repeat() -> Self {
        Self::signal(ControlSignal::Repeat)
    }

    pub fn restart() -> Self {
        Self::signal(ControlSignal::Start)
    }

    pub fn end() -> Self {
        Self::signal(ControlSignal::End)
    }

    pub fn goto(step: impl Into<String>) -> Self {
        Self::signal(ControlSignal::goto(step))
    }

    /// Attach a partial state update.
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    /// The signal the engine acts on; an absent signal means `Next`.
    pub fn resolved_signal(&self) -> ControlSignal {
        self.signal.clone().unwrap_or_default()
    }
}

impl From<ControlSignal> for StepOutcome {
    fn from(signal: ControlSignal) -> Self {
        Self::signal(signal)
    }
}

impl From<Option<ControlSignal>> for StepOutcome {
    fn from(signal: Option<ControlSignal>) -> Self {
        Self {
            signal,
            output: None,
        }
    }
}

impl From<()> for StepOutcome {
    fn from(_: ()) -> Self {
        Self::next()
    }
}

struct AsyncFnStep<F>(F);

impl<F> StepHandler for AsyncFnStep<F>
where
    F: for<'a> Fn(&'a mut RunState, &'a RunContext) -> BoxFuture<'a, StepResult>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(
        &'a self,
        state: &'a mut RunState,
        ctx: &'a RunContext,
    ) -> BoxFuture<'a, StepResult> {
        (self.0)(state, ctx)
    }
}

struct SyncFnStep<F>(F);

impl<F> StepHandler for SyncFnStep<F>
where
    F: Fn(&mut RunState, &RunContext) -> StepResult + Send + Sync + 'static,
{
    fn call<'a>(
        &'a self,
        state: &'a mut RunState,
        ctx: &'a RunContext,
    ) -> BoxFuture<'a, StepResult> {
        let result = (self.0)(state, ctx);
        Box::pin(async move { result })
    }
}

/// Wrap an async closure as a step handler.
///
/// ```ignore
/// step_fn(|state, _ctx| Box::pin(async move {
///     state.set_str("greeting", "hello");
///     Ok(StepOutcome::next())
/// }))
/// ```
pub fn step_fn<F>(f: F) -> impl StepHandler
where
    F: for<'a> Fn(&'a mut RunState, &'a RunContext) -> BoxFuture<'a, StepResult>
        + Send
        + Sync
        + 'static,
{
    AsyncFnStep(f)
}

/// Wrap a synchronous closure as a step handler.
pub fn sync_step_fn<F>(f: F) -> impl StepHandler
where
    F: Fn(&mut RunState, &RunContext) -> StepResult + Send + Sync + 'static,
{
    SyncFnStep(f)
}

/// A named step with its handler and optional schemas.
#[derive(Clone)]
pub struct StepDef {
    pub(crate) name: String,
    pub(crate) handler: Arc<dyn StepHandler>,
    pub(crate) input_schema: Option<Value>,
    pub(crate) output_schema: Option<Value>,
    pub(crate) description: Option<String>,
}

impl std::fmt::Debug for StepDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepDef")
            .field("name", &self.name)
            .field("input_schema", &self.input_schema.is_some())
            .field("output_schema", &self.output_schema.is_some())
            .field("description", &self.description)
            .finish()
    }
}

impl StepDef {
    pub fn new(name: impl Into<String>, handler: impl StepHandler) -> Self {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
            input_schema: None,
            output_schema: None,
            description: None,
        }
    }

    /// Schema the state must satisfy before the step runs.
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Schema the step's output must satisfy.
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn input_schema(&self) -> Option<&Value> {
        self.input_schema.as_ref()
    }

    pub fn output_schema(&self) -> Option<&Value> {
        self.output_schema.as_ref()
    }
}
