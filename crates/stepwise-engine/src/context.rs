use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use stepwise_core::error::{Result, StepwiseError};
use stepwise_core::traits::EventEmitter;
use stepwise_core::types::{RunId, WorkflowEvent};

/// Per-invocation context handed to a step handler.
#[derive(Clone)]
pub struct RunContext {
    run_id: RunId,
    workflow: String,
    step: String,
    iteration: usize,
    cancel: CancellationToken,
    emitter: Arc<dyn EventEmitter>,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("workflow", &self.workflow)
            .field("step", &self.step)
            .field("iteration", &self.iteration)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl RunContext {
    pub(crate) fn new(
        run_id: RunId,
        workflow: String,
        step: String,
        iteration: usize,
        cancel: CancellationToken,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            run_id,
            workflow,
            step,
            iteration,
            cancel,
            emitter,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    /// Name of the step being executed.
    pub fn step(&self) -> &str {
        &self.step
    }

    /// Zero-based count of steps executed before this one in the run.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Return `Cancelled` if the run has been cancelled.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(StepwiseError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Completes when the run is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Publish a custom event on behalf of the current step.
    ///
    /// Emission failures are logged and swallowed.
    pub async fn emit(&self, name: impl Into<String>, payload: serde_json::Value) {
        let event = WorkflowEvent::Custom {
            run_id: self.run_id.clone(),
            step: self.step.clone(),
            name: name.into(),
            payload,
        };
        if let Err(e) = self.emitter.emit(event).await {
            warn!(run_id = %self.run_id, step = %self.step, error = %e, "Failed to emit custom event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_core::event::EventBus;

    fn test_ctx(bus: Arc<EventBus>, cancel: CancellationToken) -> RunContext {
        RunContext::new(
            RunId::from_str("run-1"),
            "wf".into(),
            "fetch".into(),
            4,
            cancel,
            bus,
        )
    }

    #[tokio::test]
    async fn test_custom_event_carries_step() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let ctx = test_ctx(bus.clone(), CancellationToken::new());

        ctx.emit("progress", serde_json::json!({"pct": 50})).await;

        match rx.recv().await.unwrap() {
            WorkflowEvent::Custom { step, name, payload, .. } => {
                assert_eq!(step, "fetch");
                assert_eq!(name, "progress");
                assert_eq!(payload["pct"], 50);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_check_cancelled() {
        let cancel = CancellationToken::new();
        let ctx = test_ctx(Arc::new(EventBus::default()), cancel.clone());
        assert!(ctx.check_cancelled().is_ok());
        assert_eq!(ctx.iteration(), 4);

        cancel.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check_cancelled(), Err(StepwiseError::Cancelled)));
    }
}
