use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use stepwise_core::error::{Result, StepwiseError};
use stepwise_core::types::RESERVED_STEP_NAMES;

use crate::context::RunContext;
use crate::engine::{RunEngine, RunOutput};
use crate::state::RunState;
use crate::step::{step_fn, sync_step_fn, StepDef, StepHandler, StepResult};

/// An immutable, ordered set of named steps.
///
/// Cloning is cheap; clones share the same definition, so a workflow can be
/// handed to many concurrent runs.
#[derive(Clone)]
pub struct Workflow {
    inner: Arc<WorkflowInner>,
}

struct WorkflowInner {
    name: String,
    schema: Option<Value>,
    output_schema: Option<Value>,
    steps: Vec<StepDef>,
    index: HashMap<String, usize>,
    start: usize,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.inner.name)
            .field("steps", &self.step_names())
            .field("start", &self.start_step())
            .finish()
    }
}

impl Workflow {
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Schema for the initial run state.
    pub fn schema(&self) -> Option<&Value> {
        self.inner.schema.as_ref()
    }

    /// Schema the final run state must satisfy.
    pub fn output_schema(&self) -> Option<&Value> {
        self.inner.output_schema.as_ref()
    }

    /// Step names in declaration order.
    pub fn step_names(&self) -> Vec<&str> {
        self.inner.steps.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn steps(&self) -> &[StepDef] {
        &self.inner.steps
    }

    pub fn len(&self) -> usize {
        self.inner.steps.len()
    }

    /// Always false: a built workflow has at least one step.
    pub fn is_empty(&self) -> bool {
        self.inner.steps.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.index.contains_key(name)
    }

    pub fn step(&self, name: &str) -> Option<&StepDef> {
        self.inner.index.get(name).map(|&i| &self.inner.steps[i])
    }

    /// The step a run begins with (and `Start` returns to).
    pub fn start_step(&self) -> &str {
        &self.inner.steps[self.inner.start].name
    }

    /// Step declared after `name`, or `None` if `name` is the last step.
    pub fn next_step(&self, name: &str) -> Option<&str> {
        let i = *self.inner.index.get(name)?;
        self.inner.steps.get(i + 1).map(|s| s.name.as_str())
    }

    /// Step declared before `name`, or `None` if `name` is the first step.
    pub fn prev_step(&self, name: &str) -> Option<&str> {
        let i = *self.inner.index.get(name)?;
        i.checked_sub(1).map(|p| self.inner.steps[p].name.as_str())
    }

    /// Run with a default engine.
    pub async fn run(&self, input: Value) -> Result<RunOutput> {
        RunEngine::new(self.clone()).run(input).await
    }
}

/// Append-only builder for [`Workflow`].
///
/// ```ignore
/// let wf = Workflow::builder("pipeline")
///     .add_sync_step("a", |_, _| Ok(StepOutcome::next()))?
///     .add_sync_step("b", |_, _| Ok(StepOutcome::end()))?
///     .build()?;
/// ```
pub struct WorkflowBuilder {
    name: String,
    schema: Option<Value>,
    output_schema: Option<Value>,
    steps: Vec<StepDef>,
    index: HashMap<String, usize>,
    start: Option<String>,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            output_schema: None,
            steps: Vec::new(),
            index: HashMap::new(),
            start: None,
        }
    }

    /// Schema the initial state is validated (and defaulted) against.
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Schema the final state is validated against.
    pub fn output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Append a fully described step.
    pub fn add_step_def(mut self, step: StepDef) -> Result<Self> {
        if step.name.trim().is_empty() || RESERVED_STEP_NAMES.contains(&step.name.as_str()) {
            return Err(StepwiseError::InvalidStepName(step.name));
        }
        if self.index.contains_key(&step.name) {
            return Err(StepwiseError::DuplicateStep { name: step.name });
        }
        self.index.insert(step.name.clone(), self.steps.len());
        self.steps.push(step);
        Ok(self)
    }

    /// Append a step backed by any handler.
    pub fn add_handler(self, name: impl Into<String>, handler: impl StepHandler) -> Result<Self> {
        self.add_step_def(StepDef::new(name, handler))
    }

    /// Append an async step.
    pub fn add_step<F>(self, name: impl Into<String>, f: F) -> Result<Self>
    where
        F: for<'a> Fn(&'a mut RunState, &'a RunContext) -> BoxFuture<'a, StepResult>
            + Send
            + Sync
            + 'static,
    {
        self.add_handler(name, step_fn(f))
    }

    /// Append a synchronous step.
    pub fn add_sync_step<F>(self, name: impl Into<String>, f: F) -> Result<Self>
    where
        F: Fn(&mut RunState, &RunContext) -> StepResult + Send + Sync + 'static,
    {
        self.add_handler(name, sync_step_fn(f))
    }

    /// Begin runs at `name` instead of the first declared step.
    pub fn set_start(mut self, name: impl Into<String>) -> Self {
        self.start = Some(name.into());
        self
    }

    pub fn build(self) -> Result<Workflow> {
        if self.steps.is_empty() {
            return Err(StepwiseError::EmptyWorkflow);
        }
        let start = match self.start {
            Some(name) => *self
                .index
                .get(&name)
                .ok_or(StepwiseError::StepNotFound(name))?,
            None => 0,
        };
        Ok(Workflow {
            inner: Arc::new(WorkflowInner {
                name: self.name,
                schema: self.schema,
                output_schema: self.output_schema,
                steps: self.steps,
                index: self.index,
                start,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepOutcome;

    fn noop(_: &mut RunState, _: &RunContext) -> StepResult {
        Ok(StepOutcome::next())
    }

    fn abc() -> Workflow {
        Workflow::builder("abc")
            .add_sync_step("a", noop)
            .unwrap()
            .add_sync_step("b", noop)
            .unwrap()
            .add_sync_step("c", noop)
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_order_and_neighbours() {
        let wf = abc();
        assert_eq!(wf.name(), "abc");
        assert_eq!(wf.step_names(), vec!["a", "b", "c"]);
        assert_eq!(wf.len(), 3);
        assert_eq!(wf.start_step(), "a");
        assert_eq!(wf.next_step("a"), Some("b"));
        assert_eq!(wf.next_step("c"), None);
        assert_eq!(wf.prev_step("a"), None);
        assert_eq!(wf.prev_step("c"), Some("b"));
        assert_eq!(wf.next_step("zzz"), None);
        assert!(wf.contains("b"));
        assert!(!wf.contains("d"));
    }

    #[test]
    fn test_duplicate_step_rejected() {
        let err = Workflow::builder("dup")
            .add_sync_step("a", noop)
            .unwrap()
            .add_sync_step("a", noop)
            .err()
            .unwrap();
        assert!(matches!(err, StepwiseError::DuplicateStep { ref name } if name == "a"));
    }

    #[test]
    fn test_empty_workflow_rejected() {
        let err = Workflow::builder("empty").build().unwrap_err();
        assert!(matches!(err, StepwiseError::EmptyWorkflow));
    }

    #[test]
    fn test_reserved_and_blank_names_rejected() {
        for name in ["__next", "__end", "", "  "] {
            let err = Workflow::builder("w").add_sync_step(name, noop).err().unwrap();
            assert!(matches!(err, StepwiseError::InvalidStepName(_)), "{name:?}");
        }
    }

    #[test]
    fn test_set_start() {
        let wf = Workflow::builder("w")
            .add_sync_step("a", noop)
            .unwrap()
            .add_sync_step("b", noop)
            .unwrap()
            .set_start("b")
            .build()
            .unwrap();
        assert_eq!(wf.start_step(), "b");

        let err = Workflow::builder("w")
            .add_sync_step("a", noop)
            .unwrap()
            .set_start("missing")
            .build()
            .unwrap_err();
        assert!(matches!(err, StepwiseError::StepNotFound(ref n) if n == "missing"));
    }

    #[test]
    fn test_step_lookup_and_schemas() {
        let wf = Workflow::builder("w")
            .schema(serde_json::json!({"type": "object"}))
            .add_step_def(
                StepDef::new("a", sync_step_fn(noop))
                    .with_output_schema(serde_json::json!({"type": "object"})),
            )
            .unwrap()
            .build()
            .unwrap();
        assert!(wf.schema().is_some());
        assert!(wf.output_schema().is_none());
        assert!(wf.step("a").unwrap().output_schema().is_some());
        assert!(wf.step("b").is_none());
    }

    #[test]
    fn test_clones_share_definition() {
        let wf = abc();
        let clone = wf.clone();
        assert!(Arc::ptr_eq(&wf.inner, &clone.inner));
    }
}
