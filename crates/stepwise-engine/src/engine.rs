use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use stepwise_core::config::EngineConfig;
use stepwise_core::error::{Result, StepwiseError};
use stepwise_core::event::EventBus;
use stepwise_core::traits::{EventEmitter, SchemaValidator, ValidationFailure};
use stepwise_core::types::{ControlSignal, RunId, TraceEntry, WorkflowEvent};

use crate::context::RunContext;
use crate::state::RunState;
use crate::step::StepDef;
use crate::trace::RunTrace;
use crate::validator::{state_slice, JsonSchemaValidator};
use crate::workflow::Workflow;

/// Per-run overrides.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Begin at this step instead of the workflow's start step.
    pub start: Option<String>,
    /// Override `EngineConfig::max_iterations` for this run.
    pub max_iterations: Option<usize>,
    /// Token observed between steps and exposed to handlers.
    pub cancel: Option<CancellationToken>,
    /// Use a caller-chosen run id.
    pub run_id: Option<RunId>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start(mut self, step: impl Into<String>) -> Self {
        self.start = Some(step.into());
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub run_id: RunId,
    /// Final state after the last step.
    pub state: RunState,
    /// Steps executed, in order.
    pub trace: RunTrace,
}

/// Drives a [`Workflow`] from its start step until a terminal signal.
///
/// One handler runs at a time; the next step is chosen from the signal the
/// previous handler returned:
///
/// | signal | next step |
/// |---|---|
/// | `Next` / none | the following step, or finish after the last one |
/// | `Repeat` | the same step |
/// | `Start` | the workflow's start step |
/// | `Prev` | the preceding step |
/// | `Goto(name)` | `name` |
/// | `End` | finish |
#[derive(Clone)]
pub struct RunEngine {
    workflow: Workflow,
    validator: Arc<dyn SchemaValidator>,
    emitter: Arc<dyn EventEmitter>,
    config: EngineConfig,
}

impl RunEngine {
    /// Engine with the JSON Schema validator, a private event bus and the
    /// default config.
    pub fn new(workflow: Workflow) -> Self {
        Self {
            workflow,
            validator: Arc::new(JsonSchemaValidator::new()),
            emitter: Arc::new(EventBus::default()),
            config: EngineConfig::default(),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the workflow from its start step.
    pub async fn run(&self, input: Value) -> Result<RunOutput> {
        self.run_with(input, RunOptions::default()).await
    }

    /// Run the workflow with per-run overrides.
    pub async fn run_with(&self, input: Value, options: RunOptions) -> Result<RunOutput> {
        let run_id = options.run_id.unwrap_or_default();
        let state = self.initial_state(input)?;

        let start_step = match options.start {
            Some(name) if self.workflow.contains(&name) => name,
            Some(name) => return Err(StepwiseError::StepNotFound(name)),
            None => self.workflow.start_step().to_string(),
        };
        let max_iterations = options
            .max_iterations
            .unwrap_or(self.config.max_iterations);
        if max_iterations == 0 {
            return Err(StepwiseError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        let cancel = options.cancel.unwrap_or_default();

        info!(
            run_id = %run_id,
            workflow = %self.workflow.name(),
            start = %start_step,
            "Workflow run started"
        );
        self.emit(WorkflowEvent::RunStarted {
            run_id: run_id.clone(),
            workflow: self.workflow.name().to_string(),
            start_step: start_step.clone(),
        })
        .await;

        let started = Instant::now();
        match self
            .drive(&run_id, state, start_step, max_iterations, &cancel)
            .await
        {
            Ok((state, trace)) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(
                    run_id = %run_id,
                    steps = trace.len(),
                    elapsed_ms,
                    "Workflow run completed"
                );
                self.emit(WorkflowEvent::RunCompleted {
                    run_id: run_id.clone(),
                    steps_executed: trace.len(),
                    elapsed_ms,
                })
                .await;
                Ok(RunOutput {
                    run_id,
                    state,
                    trace,
                })
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Workflow run failed");
                self.emit(WorkflowEvent::RunFailed {
                    run_id,
                    error: e.to_string(),
                })
                .await;
                Err(e)
            }
        }
    }

    /// The step loop. Returns the final state and trace, or the first error.
    async fn drive(
        &self,
        run_id: &RunId,
        mut state: RunState,
        mut current: String,
        max_iterations: usize,
        cancel: &CancellationToken,
    ) -> Result<(RunState, RunTrace)> {
        let mut trace = RunTrace::new();
        let mut iteration = 0usize;

        loop {
            let step = self
                .workflow
                .step(&current)
                .ok_or_else(|| StepwiseError::StepNotFound(current.clone()))?;

            if cancel.is_cancelled() {
                debug!(run_id = %run_id, step = %current, "Run cancelled before step");
                return Err(StepwiseError::Cancelled);
            }
            if iteration >= max_iterations {
                return Err(StepwiseError::MaxIterationsExceeded {
                    limit: max_iterations,
                    step: current,
                });
            }

            if let Some(schema) = &step.input_schema {
                let slice = state_slice(state.data(), schema);
                let accepted = self
                    .validator
                    .validate(&slice, schema)
                    .map_err(|f| schema_error(Some(&current), f))?;
                state.merge_output(&current, accepted)?;
            }

            debug!(run_id = %run_id, step = %current, iteration, "Executing step");
            self.emit(WorkflowEvent::StepStarted {
                run_id: run_id.clone(),
                step: current.clone(),
                iteration,
                state: self.snapshot(&state),
            })
            .await;

            let ctx = RunContext::new(
                run_id.clone(),
                self.workflow.name().to_string(),
                current.clone(),
                iteration,
                cancel.clone(),
                self.emitter.clone(),
            );
            let step_start = Instant::now();
            let outcome = match step.handler.call(&mut state, &ctx).await {
                Ok(outcome) => outcome,
                Err(source) => {
                    error!(run_id = %run_id, step = %current, iteration, error = %source, "Step failed");
                    self.emit(WorkflowEvent::StepFailed {
                        run_id: run_id.clone(),
                        step: current.clone(),
                        iteration,
                        error: source.to_string(),
                    })
                    .await;
                    return Err(StepwiseError::StepFailed {
                        step: current,
                        iteration,
                        source,
                    });
                }
            };
            let elapsed_ms = step_start.elapsed().as_millis() as u64;

            let signal = outcome.resolved_signal();
            self.apply_output(&mut state, step, outcome.output)?;

            debug!(
                run_id = %run_id,
                step = %current,
                signal = %signal,
                elapsed_ms,
                "Step complete"
            );
            self.emit(WorkflowEvent::StepSucceeded {
                run_id: run_id.clone(),
                step: current.clone(),
                iteration,
                signal: signal.clone(),
                elapsed_ms,
                state: self.snapshot(&state),
            })
            .await;
            trace.push(TraceEntry {
                step: current.clone(),
                iteration,
                signal: signal.clone(),
                timestamp: Utc::now(),
                elapsed_ms,
            });

            let next = self.resolve(&current, &signal)?;
            iteration += 1;
            match next {
                Some(next) => current = next,
                None => break,
            }
        }

        if let Some(schema) = self.workflow.output_schema() {
            let accepted = self
                .validator
                .validate(&state.to_value(), schema)
                .map_err(|f| schema_error(None, f))?;
            state = RunState::from_value(accepted)?;
        }

        Ok((state, trace))
    }

    /// Validate and default the caller's input.
    fn initial_state(&self, input: Value) -> Result<RunState> {
        match self.workflow.schema() {
            Some(schema) => {
                let accepted = self
                    .validator
                    .validate(&input, schema)
                    .map_err(|f| schema_error(None, f))?;
                RunState::from_value(accepted)
            }
            None => RunState::from_value(input),
        }
    }

    /// Validate a step's output against its schema and merge it into the state.
    fn apply_output(&self, state: &mut RunState, step: &StepDef, output: Option<Value>) -> Result<()> {
        match (output, &step.output_schema) {
            (Some(output), Some(schema)) => {
                let accepted = self
                    .validator
                    .validate(&output, schema)
                    .map_err(|f| schema_error(Some(&step.name), f))?;
                state.merge_output(&step.name, accepted)
            }
            (Some(output), None) => state.merge_output(&step.name, output),
            // No output this call; the schema only applies to returned values.
            (None, _) => Ok(()),
        }
    }

    /// Map a signal to the next step name; `None` finishes the run.
    fn resolve(&self, current: &str, signal: &ControlSignal) -> Result<Option<String>> {
        let invalid = || StepwiseError::InvalidSignal {
            step: current.to_string(),
            signal: signal.to_string(),
        };
        match signal {
            ControlSignal::Next => Ok(self.workflow.next_step(current).map(str::to_string)),
            ControlSignal::Repeat => Ok(Some(current.to_string())),
            ControlSignal::Start => Ok(Some(self.workflow.start_step().to_string())),
            ControlSignal::Prev => self
                .workflow
                .prev_step(current)
                .map(|s| Some(s.to_string()))
                .ok_or_else(invalid),
            ControlSignal::End => Ok(None),
            ControlSignal::Goto(name) if self.workflow.contains(name) => Ok(Some(name.clone())),
            ControlSignal::Goto(_) => Err(invalid()),
        }
    }

    fn snapshot(&self, state: &RunState) -> Option<Value> {
        self.config.snapshot_state.then(|| state.to_value())
    }

    async fn emit(&self, event: WorkflowEvent) {
        let event_type = event.event_type();
        if let Err(e) = self.emitter.emit(event).await {
            warn!(event = event_type, error = %e, "Failed to emit workflow event");
        }
    }
}

fn schema_error(step: Option<&str>, failure: ValidationFailure) -> StepwiseError {
    StepwiseError::SchemaValidation {
        step: step.map(str::to_string),
        issues: failure.issues,
    }
}
