use futures::future::BoxFuture;

use crate::error::Result;
use crate::traits::EventEmitter;
use crate::types::WorkflowEvent;

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: WorkflowEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventEmitter for EventBus {
    fn emit(&self, event: WorkflowEvent) -> BoxFuture<'_, Result<()>> {
        self.publish(event);
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunId;

    #[tokio::test]
    async fn test_subscribers_receive_emitted_events() {
        let bus = EventBus::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(WorkflowEvent::RunFailed {
            run_id: RunId::from_str("r"),
            error: "x".into(),
        })
        .await
        .unwrap();

        assert_eq!(rx1.recv().await.unwrap().event_type(), "run_failed");
        assert_eq!(rx2.recv().await.unwrap().event_type(), "run_failed");
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_ok() {
        let bus = EventBus::default();
        let result = bus
            .emit(WorkflowEvent::RunCompleted {
                run_id: RunId::new(),
                steps_executed: 0,
                elapsed_ms: 0,
            })
            .await;
        assert!(result.is_ok());
    }
}
